//! Rewards transaction ledger schema
//!
//! Append-only; the user's coin_balance is maintained redundantly and each
//! row records the balance after it applied, so drift is observable.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for rewards transactions
pub const REWARDS_COLLECTION: &str = "rewards_transactions";

/// Why a balance moved
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Coins earned from a habit completion
    #[default]
    Earn,
    /// Coins spent in the rewards shop
    Spend,
    /// Coins escrowed into a war wager
    Wager,
    /// Winner's payout after a settled war
    Payout,
    /// Escrow returned (declined, expired, or tied war)
    Refund,
}

/// One ledger entry
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RewardsTransactionDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// User whose balance moved
    pub user_id: ObjectId,

    /// Signed amount; negative for debits
    pub amount: i64,

    /// Movement category
    #[serde(default)]
    pub kind: TransactionKind,

    /// Human-readable description ("Wager for war vs. ada")
    pub description: String,

    /// Coin balance after this entry applied
    pub balance_after: i64,
}

impl RewardsTransactionDoc {
    pub fn new(
        user_id: ObjectId,
        amount: i64,
        kind: TransactionKind,
        description: String,
        balance_after: i64,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id,
            amount,
            kind,
            description,
            balance_after,
        }
    }
}

impl IntoIndexes for RewardsTransactionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1, "metadata.created_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("rewards_user_recent_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for RewardsTransactionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
