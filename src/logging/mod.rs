//! Logging infrastructure for StreakWars
//!
//! Structured tracing is configured in main; this module adds a JSONL
//! activity event log for offline analytics.

pub mod activity;

pub use activity::{ActivityEvent, ActivityLogger, EventType};
