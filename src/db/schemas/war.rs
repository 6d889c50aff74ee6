//! War document schema
//!
//! A war is a wagered 1v1 competition between two participants of the same
//! challenge. Status transitions are validated by `crate::wars::rules`, never
//! ad hoc in handlers.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::wars::WarStatus;

/// Collection name for wars
pub const WAR_COLLECTION: &str = "wars";

/// War document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WarDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Challenge the war is fought within
    pub challenge_id: ObjectId,

    /// Declaring user; accrues and spends sabotage power
    pub challenger_id: ObjectId,

    /// Challenged user; logs escape tasks while sabotaged
    pub defender_id: ObjectId,

    /// Coins each side stakes; winner takes both
    pub wager_coins: i64,

    /// Current state of the war
    #[serde(default)]
    pub status: WarStatus,

    /// Deadline for the defender to accept
    pub expires_at: DateTime,

    /// When the defender accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime>,

    /// When the war settled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime>,

    /// Settled winner; absent for ties and unsettled wars
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<ObjectId>,

    /// Accrued, unspent sabotage power
    #[serde(default)]
    pub sabotage_power: i64,

    /// Whether the defender is currently sabotaged
    #[serde(default)]
    pub sabotage_active: bool,

    /// Intensity tier of the active sabotage (0 when inactive)
    #[serde(default)]
    pub sabotage_intensity: i64,

    /// Distinct escape tasks logged since the sabotage activated
    #[serde(default)]
    pub escape_tasks_done: i64,
}

impl WarDoc {
    pub fn new(
        challenge_id: ObjectId,
        challenger_id: ObjectId,
        defender_id: ObjectId,
        wager_coins: i64,
        expires_at: DateTime,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            challenge_id,
            challenger_id,
            defender_id,
            wager_coins,
            status: WarStatus::Pending,
            expires_at,
            accepted_at: None,
            completed_at: None,
            winner_id: None,
            sabotage_power: 0,
            sabotage_active: false,
            sabotage_intensity: 0,
            escape_tasks_done: 0,
        }
    }

    /// Whether the acceptance window has lapsed for a still-pending war
    pub fn acceptance_lapsed(&self, now: DateTime) -> bool {
        self.status == WarStatus::Pending && self.expires_at <= now
    }
}

impl IntoIndexes for WarDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Both parties list their own wars
            (
                doc! { "challenger_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("war_challenger_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "defender_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("war_defender_index".to_string())
                        .build(),
                ),
            ),
            // The expiry sweep scans pending wars past their deadline
            (
                doc! { "status": 1, "expires_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("war_status_expiry_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for WarDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Collection name for sabotage task completions
pub const SABOTAGE_COMPLETION_COLLECTION: &str = "sabotage_completions";

/// Append-only log of sabotage side-challenge and escape-task completions.
///
/// The unique index over (war_id, user_id, task_id) is what makes the escape
/// threshold mean three *distinct* tasks: re-logging a task is a conflict,
/// not a second count.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SabotageCompletionDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// War the task was completed for
    pub war_id: ObjectId,

    /// Completing user
    pub user_id: ObjectId,

    /// Catalog task identifier; escape tasks are prefixed "escape_"
    pub task_id: String,

    /// Sabotage power granted (0 for escape tasks)
    #[serde(default)]
    pub power_awarded: i64,

    /// Whether this was an escape task
    #[serde(default)]
    pub is_escape: bool,

    /// Free-text proof; stored verbatim, never verified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_text: Option<String>,
}

impl SabotageCompletionDoc {
    pub fn new(war_id: ObjectId, user_id: ObjectId, task_id: String, power_awarded: i64) -> Self {
        let is_escape = task_id.starts_with("escape_");
        Self {
            _id: None,
            metadata: Metadata::new(),
            war_id,
            user_id,
            task_id,
            power_awarded,
            is_escape,
            proof_text: None,
        }
    }
}

impl IntoIndexes for SabotageCompletionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "war_id": 1, "user_id": 1, "task_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("sabotage_task_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for SabotageCompletionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
