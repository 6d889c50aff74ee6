//! Coin balance mutations
//!
//! The single write path for coin balances. Every mutation updates the
//! redundant balance on the user record and appends a ledger row recording
//! the balance after the move; no handler touches coin_balance directly.

use bson::{doc, oid::ObjectId, DateTime};
use tracing::warn;

use crate::db::schemas::{
    RewardsTransactionDoc, TransactionKind, UserDoc, REWARDS_COLLECTION, USER_COLLECTION,
};
use crate::db::MongoClient;
use crate::types::{AppError, Result};

/// Credit coins to a user. Returns the balance after the credit.
pub async fn credit(
    mongo: &MongoClient,
    user_id: ObjectId,
    amount: i64,
    kind: TransactionKind,
    description: &str,
) -> Result<i64> {
    if amount <= 0 {
        return Err(AppError::Validation("Credit amount must be positive".into()));
    }

    let users = mongo.collection::<UserDoc>(USER_COLLECTION).await?;

    let updated = users
        .update_one(
            doc! { "_id": user_id },
            doc! {
                "$inc": { "coin_balance": amount },
                "$set": { "metadata.updated_at": DateTime::now() },
            },
        )
        .await?;

    if updated.matched_count == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }

    append_ledger_row(mongo, user_id, amount, kind, description).await
}

/// Debit coins from a user. The filter requires a sufficient balance, so a
/// concurrent spend cannot push the balance negative - the loser simply
/// matches nothing and gets a conflict.
pub async fn debit(
    mongo: &MongoClient,
    user_id: ObjectId,
    amount: i64,
    kind: TransactionKind,
    description: &str,
) -> Result<i64> {
    if amount <= 0 {
        return Err(AppError::Validation("Debit amount must be positive".into()));
    }

    let users = mongo.collection::<UserDoc>(USER_COLLECTION).await?;

    let updated = users
        .update_one(
            doc! { "_id": user_id, "coin_balance": { "$gte": amount } },
            doc! {
                "$inc": { "coin_balance": -amount },
                "$set": { "metadata.updated_at": DateTime::now() },
            },
        )
        .await?;

    if updated.matched_count == 0 {
        // Distinguish a missing user from an insufficient balance
        let exists = users.find_one(doc! { "_id": user_id }).await?.is_some();
        return if exists {
            Err(AppError::Conflict("Insufficient coin balance".into()))
        } else {
            Err(AppError::NotFound("User not found".into()))
        };
    }

    append_ledger_row(mongo, user_id, -amount, kind, description).await
}

/// Sum of all ledger amounts for a user; the derived counterpart of the
/// redundant balance
pub async fn derived_balance(mongo: &MongoClient, user_id: ObjectId) -> Result<i64> {
    use futures_util::StreamExt;

    let ledger = mongo
        .collection::<RewardsTransactionDoc>(REWARDS_COLLECTION)
        .await?;

    let pipeline = vec![
        doc! { "$match": { "user_id": user_id } },
        doc! { "$group": { "_id": null, "total": { "$sum": "$amount" } } },
    ];

    let mut cursor = ledger
        .inner()
        .aggregate(pipeline)
        .await
        .map_err(|e| AppError::Database(format!("Aggregate failed: {}", e)))?;

    if let Some(result) = cursor.next().await {
        let d = result.map_err(|e| AppError::Database(format!("Aggregate read failed: {}", e)))?;
        return Ok(d.get_i64("total").or_else(|_| d.get_i32("total").map(i64::from)).unwrap_or(0));
    }

    Ok(0)
}

async fn append_ledger_row(
    mongo: &MongoClient,
    user_id: ObjectId,
    amount: i64,
    kind: TransactionKind,
    description: &str,
) -> Result<i64> {
    let users = mongo.collection::<UserDoc>(USER_COLLECTION).await?;
    let ledger = mongo
        .collection::<RewardsTransactionDoc>(REWARDS_COLLECTION)
        .await?;

    let balance_after = users
        .find_one(doc! { "_id": user_id })
        .await?
        .map(|u| u.coin_balance)
        .unwrap_or_else(|| {
            warn!(user = %user_id, "User vanished between balance update and ledger append");
            0
        });

    ledger
        .insert_one(RewardsTransactionDoc::new(
            user_id,
            amount,
            kind,
            description.to_string(),
            balance_after,
        ))
        .await?;

    Ok(balance_after)
}
