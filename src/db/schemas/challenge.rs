//! Challenge and participant document schemas
//!
//! A challenge is a time-boxed competition. Participants accrue points
//! independently through completions of habits linked to the challenge.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for challenges
pub const CHALLENGE_COLLECTION: &str = "challenges";

/// Collection name for challenge participants
pub const PARTICIPANT_COLLECTION: &str = "challenge_participants";

/// Challenge document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChallengeDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Challenge name ("February cold showers")
    pub name: String,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Creating user
    pub created_by: ObjectId,

    /// When the challenge opens
    pub starts_at: DateTime,

    /// When the challenge closes; wars settle only after this
    pub ends_at: DateTime,

    /// Whether participants may declare wars inside this challenge
    #[serde(default = "default_true")]
    pub allow_wars: bool,

    /// Denormalized participant count for list views
    #[serde(default)]
    pub participant_count: i64,
}

fn default_true() -> bool {
    true
}

impl ChallengeDoc {
    pub fn new(name: String, created_by: ObjectId, starts_at: DateTime, ends_at: DateTime) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            name,
            description: None,
            created_by,
            starts_at,
            ends_at,
            allow_wars: true,
            participant_count: 0,
        }
    }

    /// Whether the challenge is currently running
    pub fn is_active(&self, now: DateTime) -> bool {
        self.starts_at <= now && now < self.ends_at
    }

    /// Whether the challenge has closed
    pub fn has_ended(&self, now: DateTime) -> bool {
        self.ends_at <= now
    }
}

impl IntoIndexes for ChallengeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "ends_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("challenge_ends_at_desc".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ChallengeDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// One user's membership and score within a challenge
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChallengeParticipantDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Parent challenge
    pub challenge_id: ObjectId,

    /// Participating user
    pub user_id: ObjectId,

    /// Points accrued within this challenge
    #[serde(default)]
    pub points: i64,
}

impl ChallengeParticipantDoc {
    pub fn new(challenge_id: ObjectId, user_id: ObjectId) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            challenge_id,
            user_id,
            points: 0,
        }
    }
}

impl IntoIndexes for ChallengeParticipantDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One membership row per user per challenge
            (
                doc! { "challenge_id": 1, "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("participant_unique".to_string())
                        .build(),
                ),
            ),
            // Leaderboard sorts participants by points
            (
                doc! { "challenge_id": 1, "points": -1 },
                Some(
                    IndexOptions::builder()
                        .name("participant_points_desc".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ChallengeParticipantDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
