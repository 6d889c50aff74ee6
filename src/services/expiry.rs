//! Background sweep for lapsed pending wars
//!
//! Acceptance deadlines are also checked opportunistically by accept/list
//! handlers, but this task is the guarantee: a pending war past its deadline
//! is flipped to expired and the challenger's escrow refunded even if nobody
//! ever looks at it again.

use bson::{doc, DateTime};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::schemas::{TransactionKind, WarDoc, WAR_COLLECTION};
use crate::db::MongoClient;
use crate::logging::{ActivityLogger, EventType};
use crate::services::ledger;
use crate::types::Result;

/// Spawn the periodic expiry sweep
pub fn spawn_war_expiry_task(
    mongo: MongoClient,
    activity: ActivityLogger,
    sweep_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(sweep_secs));
        // First tick fires immediately; skip it so startup isn't noisy
        interval.tick().await;

        loop {
            interval.tick().await;
            match sweep_once(&mongo, &activity).await {
                Ok(0) => {}
                Ok(n) => info!("Expired {} lapsed pending war(s)", n),
                Err(e) => error!("War expiry sweep failed: {}", e),
            }
        }
    })
}

/// Expire every pending war past its deadline. Returns how many flipped.
pub async fn sweep_once(mongo: &MongoClient, activity: &ActivityLogger) -> Result<u64> {
    let wars = mongo.collection::<WarDoc>(WAR_COLLECTION).await?;
    let now = DateTime::now();

    let lapsed = wars
        .find_many(doc! {
            "status": "pending",
            "expires_at": { "$lte": now },
        })
        .await?;

    let mut expired = 0u64;

    for war in lapsed {
        let Some(war_id) = war._id else { continue };

        // Guard the transition with the status in the filter: if an accept
        // or decline lands first, this update matches nothing.
        let updated = wars
            .update_one(
                doc! { "_id": war_id, "status": "pending" },
                doc! {
                    "$set": {
                        "status": "expired",
                        "metadata.updated_at": now,
                    }
                },
            )
            .await?;

        if updated.modified_count == 0 {
            continue;
        }

        if let Err(e) = ledger::credit(
            mongo,
            war.challenger_id,
            war.wager_coins,
            TransactionKind::Refund,
            "War expired unanswered - wager refunded",
        )
        .await
        {
            warn!(war = %war_id, "Failed to refund expired war wager: {}", e);
        }

        activity
            .log(
                activity
                    .event(EventType::WarExpired)
                    .with_subject(war_id.to_hex())
                    .with_coins(war.wager_coins),
            )
            .await;

        expired += 1;
    }

    Ok(expired)
}
