//! Habit and habit-completion document schemas
//!
//! A completion is one habit on one calendar day. The unique index on
//! (habit_id, day) is the enforcement point for "once per day" - concurrent
//! completions race to the index and the loser gets a duplicate-key error.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for habits
pub const HABIT_COLLECTION: &str = "habits";

/// Collection name for habit completions
pub const COMPLETION_COLLECTION: &str = "habit_completions";

/// Habit document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HabitDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Owning user
    pub user_id: ObjectId,

    /// Habit name ("Morning run")
    pub name: String,

    /// Optional longer description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Emoji shown in the habit list
    #[serde(default = "default_emoji")]
    pub emoji: String,

    /// Points awarded per completion
    #[serde(default = "default_points")]
    pub points_per_completion: i64,

    /// Habit this one was remixed from, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remixed_from: Option<ObjectId>,

    /// Challenge this habit contributes points to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<ObjectId>,

    /// Archived habits are hidden from the default list but keep history
    #[serde(default)]
    pub is_archived: bool,
}

fn default_emoji() -> String {
    "✅".to_string()
}

fn default_points() -> i64 {
    10
}

impl HabitDoc {
    pub fn new(user_id: ObjectId, name: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id,
            name,
            description: None,
            emoji: default_emoji(),
            points_per_completion: default_points(),
            remixed_from: None,
            challenge_id: None,
            is_archived: false,
        }
    }
}

impl IntoIndexes for HabitDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1 },
            Some(
                IndexOptions::builder()
                    .name("habit_user_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for HabitDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// One habit completed on one calendar day
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HabitCompletionDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Completed habit
    pub habit_id: ObjectId,

    /// Completing user (denormalized from the habit for streak queries)
    pub user_id: ObjectId,

    /// Calendar day in UTC, formatted YYYY-MM-DD
    pub day: String,

    /// Free-text completion proof; stored verbatim, never verified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_text: Option<String>,

    /// Points awarded at completion time (habit point values can change later)
    pub points_awarded: i64,
}

impl HabitCompletionDoc {
    pub fn new(habit_id: ObjectId, user_id: ObjectId, day: String, points_awarded: i64) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            habit_id,
            user_id,
            day,
            proof_text: None,
            points_awarded,
        }
    }
}

impl IntoIndexes for HabitCompletionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One completion per habit per day, enforced by the database
            (
                doc! { "habit_id": 1, "day": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("completion_habit_day_unique".to_string())
                        .build(),
                ),
            ),
            // Streak computation scans a user's completion days
            (
                doc! { "user_id": 1, "day": 1 },
                Some(
                    IndexOptions::builder()
                        .name("completion_user_day_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for HabitCompletionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
