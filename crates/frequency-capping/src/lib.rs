//! Permission rules: frequency caps and targeting gates that decide whether
//! a creative set may be shown right now.

pub mod decision;
pub mod engine;
pub mod permission_rules;

pub use decision::{allow_list, deny_reasons, Decision};
pub use engine::PermissionRuleEngine;
pub use permission_rules::{CappingWindow, PermissionRule};
