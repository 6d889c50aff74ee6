//! Rewards endpoints
//!
//! ## Endpoints
//!
//! - `GET /api/rewards/balance` - Redundant balance + ledger-derived sum
//! - `GET /api/rewards/transactions` - Ledger, newest first
//! - `POST /api/rewards/spend` - Spend coins; balances never go negative

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use mongodb::options::FindOptions;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::schemas::{
    RewardsTransactionDoc, TransactionKind, UserDoc, REWARDS_COLLECTION, USER_COLLECTION,
};
use crate::logging::EventType;
use crate::routes::util::{
    app_error_response, claims_user_id, error_response, json_response, parse_json_body,
    require_auth, require_mongo, FullBody,
};
use crate::server::AppState;
use crate::services::ledger;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendRequest {
    pub amount: i64,
    pub description: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub coin_balance: i64,
    /// Sum of all ledger amounts; should equal coin_balance
    pub derived_balance: i64,
    pub in_sync: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEntry {
    pub id: String,
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    pub balance_after: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Main handler for /api/rewards* routes
pub async fn handle_rewards_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/api/rewards").unwrap_or("");

    match (method, subpath) {
        (Method::GET, "/balance") => handle_balance(req, state).await,
        (Method::GET, "/transactions") => handle_transactions(req, state).await,
        (Method::POST, "/spend") => handle_spend(req, state).await,
        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}

/// GET /api/rewards/balance
async fn handle_balance(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let users = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let user = match users.find_one(doc! { "_id": user_id }).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "User not found", None),
        Err(e) => return app_error_response(&e),
    };

    let derived = match ledger::derived_balance(mongo, user_id).await {
        Ok(d) => d,
        Err(e) => return app_error_response(&e),
    };

    json_response(
        StatusCode::OK,
        &BalanceResponse {
            coin_balance: user.coin_balance,
            derived_balance: derived,
            in_sync: user.coin_balance == derived,
        },
    )
}

/// GET /api/rewards/transactions
async fn handle_transactions(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let transactions = match mongo
        .collection::<RewardsTransactionDoc>(REWARDS_COLLECTION)
        .await
    {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let options = FindOptions::builder()
        .sort(doc! { "metadata.created_at": -1 })
        .limit(100)
        .build();

    let docs = match transactions
        .find_many_with_options(doc! { "user_id": user_id }, Some(options))
        .await
    {
        Ok(d) => d,
        Err(e) => return app_error_response(&e),
    };

    let list: Vec<TransactionEntry> = docs
        .iter()
        .map(|t| TransactionEntry {
            id: t._id.map(|id| id.to_hex()).unwrap_or_default(),
            amount: t.amount,
            kind: t.kind,
            description: t.description.clone(),
            balance_after: t.balance_after,
            created_at: t
                .metadata
                .created_at
                .and_then(|dt| dt.try_to_rfc3339_string().ok()),
        })
        .collect();

    json_response(StatusCode::OK, &list)
}

/// POST /api/rewards/spend
async fn handle_spend(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let body: SpendRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    if body.amount < 1 {
        return error_response(StatusCode::BAD_REQUEST, "Amount must be at least 1", None);
    }
    if body.description.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Description is required", None);
    }

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let balance = match ledger::debit(
        mongo,
        user_id,
        body.amount,
        TransactionKind::Spend,
        body.description.trim(),
    )
    .await
    {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    state
        .activity
        .log(
            state
                .activity
                .event(EventType::CoinsSpent)
                .with_user(user_id.to_hex())
                .with_coins(-body.amount),
        )
        .await;

    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "success": true,
            "coinBalance": balance,
        }),
    )
}
