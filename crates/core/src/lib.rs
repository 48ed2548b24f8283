#![warn(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod event_log;
pub mod types;

pub use config::AppConfig;
pub use error::{AdsError, AdsResult};
pub use event_log::{EventFilter, EventLog, InMemoryEventLog};
pub use types::{AdEvent, AdEventType, AdType};
