//! Activity event logging
//!
//! Logs gameplay events in JSONL format for offline analytics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Activity event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A habit was completed
    HabitCompleted,
    /// A war was declared
    WarDeclared,
    /// A war was accepted
    WarAccepted,
    /// A war was declined
    WarDeclined,
    /// A pending war lapsed
    WarExpired,
    /// A war settled
    WarCompleted,
    /// A sabotage pool was spent
    SabotageActivated,
    /// A sabotage was cleared by escape tasks
    SabotageEscaped,
    /// Coins were spent in the shop
    CoinsSpent,
    /// Login or registration attempt
    AuthAttempt,
}

/// One analytics event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Event type
    pub event_type: EventType,
    /// Node that handled the request
    pub node_id: String,
    /// Acting user (if authenticated)
    pub user_id: Option<String>,
    /// Entity the event concerns (habit, war, ...)
    pub subject_id: Option<String>,
    /// Points moved, if any
    pub points: Option<i64>,
    /// Coins moved, if any
    pub coins: Option<i64>,
    /// Additional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ActivityEvent {
    /// Create a new event
    pub fn new(event_type: EventType, node_id: String) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            node_id,
            user_id: None,
            subject_id: None,
            points: None,
            coins: None,
            metadata: None,
        }
    }

    /// Set the acting user
    pub fn with_user(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Set the subject entity
    pub fn with_subject(mut self, subject_id: String) -> Self {
        self.subject_id = Some(subject_id);
        self
    }

    /// Set the points moved
    pub fn with_points(mut self, points: i64) -> Self {
        self.points = Some(points);
        self
    }

    /// Set the coins moved
    pub fn with_coins(mut self, coins: i64) -> Self {
        self.coins = Some(coins);
        self
    }

    /// Attach free-form metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Activity logger that writes events to a JSONL file.
///
/// When no file is configured, logging is a no-op; handlers always call it
/// unconditionally.
#[derive(Clone)]
pub struct ActivityLogger {
    inner: Arc<Mutex<ActivityLoggerInner>>,
    node_id: String,
}

struct ActivityLoggerInner {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl ActivityLogger {
    /// Create a new activity logger
    pub fn new(node_id: String) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ActivityLoggerInner {
                writer: None,
                path: None,
            })),
            node_id,
        }
    }

    /// Initialize file logging to the specified path
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let writer = BufWriter::new(file);

        let mut inner = self.inner.lock().await;
        inner.writer = Some(writer);
        inner.path = Some(path.clone());

        info!("Activity logging initialized to {}", path.display());
        Ok(())
    }

    /// Log an event
    pub async fn log(&self, event: ActivityEvent) {
        let jsonl = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize activity event: {}", e);
                return;
            }
        };

        let mut inner = self.inner.lock().await;

        if let Some(ref mut writer) = inner.writer {
            if let Err(e) = writeln!(writer, "{}", jsonl) {
                error!("Failed to write activity event: {}", e);
            }
            // Flush per event for durability
            if let Err(e) = writer.flush() {
                error!("Failed to flush activity log: {}", e);
            }
        }
    }

    /// Build an event pre-filled with this node's id
    pub fn event(&self, event_type: EventType) -> ActivityEvent {
        ActivityEvent::new(event_type, self.node_id.clone())
    }

    /// Get the node ID
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ActivityEvent::new(EventType::WarDeclared, "test-node".to_string())
            .with_user("user-123".to_string())
            .with_subject("war-456".to_string())
            .with_coins(25);

        let jsonl = event.to_jsonl().unwrap();
        assert!(jsonl.contains("war_declared"));
        assert!(jsonl.contains("user-123"));
        assert!(jsonl.contains("war-456"));
        assert!(jsonl.contains("25"));
    }

    #[test]
    fn test_completion_event() {
        let event = ActivityEvent::new(EventType::HabitCompleted, "test-node".to_string())
            .with_points(10)
            .with_metadata(serde_json::json!({ "day": "2026-02-10" }));

        let jsonl = event.to_jsonl().unwrap();
        assert!(jsonl.contains("habit_completed"));
        assert!(jsonl.contains("2026-02-10"));
    }

    #[tokio::test]
    async fn test_logging_without_file_is_noop() {
        let logger = ActivityLogger::new("test-node".to_string());
        // Must not panic or error with no file configured
        logger
            .log(logger.event(EventType::SabotageActivated))
            .await;
    }
}
