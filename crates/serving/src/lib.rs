#![warn(clippy::unwrap_used)]

//! Serving facade. Answers "may an ad be shown, and which one" by running
//! the permission rules and then the epsilon-greedy selector.

pub mod engine;

pub use engine::{AdServingEngine, ServeOutcome};
