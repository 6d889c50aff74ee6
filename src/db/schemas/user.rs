//! User document schema
//!
//! Profile, lifetime point totals, streak counters, and the coin balance.
//! The balance is maintained redundantly next to the rewards ledger; every
//! mutation appends a ledger row so the two can be reconciled.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::PermissionLevel;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// User identifier (email or username)
    pub identifier: String,

    /// Type of identifier (email, username)
    #[serde(default = "default_identifier_type")]
    pub identifier_type: String,

    /// Argon2 password hash
    pub password_hash: String,

    /// Public display name
    pub display_name: String,

    /// Avatar emoji shown next to the display name
    #[serde(default = "default_avatar")]
    pub avatar_emoji: String,

    /// Lifetime habit points; decremented when completions are deleted so it
    /// never drifts from the completion log
    #[serde(default)]
    pub total_points: i64,

    /// Consecutive completion days ending at the most recent one
    #[serde(default)]
    pub current_streak: i64,

    /// Best streak ever reached
    #[serde(default)]
    pub longest_streak: i64,

    /// Coin balance; never negative
    #[serde(default)]
    pub coin_balance: i64,

    /// Permission level for admin surfaces
    #[serde(default)]
    pub permission_level: PermissionLevel,

    /// Token version for invalidation (increment to invalidate all tokens)
    #[serde(default)]
    pub token_version: i32,

    /// Whether the user account is active
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_identifier_type() -> String {
    "email".to_string()
}

fn default_avatar() -> String {
    "🔥".to_string()
}

fn default_true() -> bool {
    true
}

impl UserDoc {
    /// Create a new user document
    pub fn new(
        identifier: String,
        identifier_type: String,
        password_hash: String,
        display_name: String,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            identifier,
            identifier_type,
            password_hash,
            display_name,
            avatar_emoji: default_avatar(),
            total_points: 0,
            current_streak: 0,
            longest_streak: 0,
            coin_balance: 0,
            permission_level: PermissionLevel::Authenticated,
            token_version: 1,
            is_active: true,
        }
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on identifier
            (
                doc! { "identifier": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("identifier_unique".to_string())
                        .build(),
                ),
            ),
            // Leaderboard sorts by lifetime points
            (
                doc! { "total_points": -1 },
                Some(
                    IndexOptions::builder()
                        .name("total_points_desc".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
