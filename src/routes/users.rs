//! User profile endpoints
//!
//! ## Endpoints
//!
//! - `GET /api/users/{id}` - Public profile
//! - `GET /api/users/{id}/stats` - Profile plus war record
//! - `PUT /api/users/me` - Update own display name / avatar
//! - `GET /api/leaderboard` - Top users by lifetime points

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use mongodb::options::FindOptions;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::schemas::{UserDoc, WarDoc, USER_COLLECTION, WAR_COLLECTION};
use crate::routes::util::{
    app_error_response, claims_user_id, error_response, json_response, parse_json_body,
    parse_object_id, require_auth, require_mongo, FullBody, SuccessResponse,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_emoji: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user_id: String,
    pub display_name: String,
    pub avatar_emoji: String,
    pub total_points: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(flatten)]
    pub profile: ProfileResponse,
    pub coin_balance: i64,
    pub wars_won: u64,
    pub wars_lost: u64,
    pub wars_active: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub user_id: String,
    pub display_name: String,
    pub avatar_emoji: String,
    pub total_points: i64,
    pub current_streak: i64,
    pub rank: u32,
}

/// Main handler for /api/users* and /api/leaderboard routes
pub async fn handle_users_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();

    if path == "/api/leaderboard" && method == Method::GET {
        return handle_leaderboard(req, state).await;
    }

    let subpath = path.strip_prefix("/api/users").unwrap_or("");

    match (method, subpath) {
        (Method::PUT, "/me") => handle_update_profile(req, state).await,

        (Method::GET, p) if p.ends_with("/stats") => {
            let id = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/stats"))
                .unwrap_or("");
            handle_stats(req, state, id).await
        }

        (Method::GET, p) if p.matches('/').count() == 1 => {
            let id = p.trim_start_matches('/');
            handle_profile(req, state, id).await
        }

        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}

/// GET /api/users/{id}
async fn handle_profile(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: &str,
) -> Response<FullBody> {
    if let Err(resp) = require_auth(&req, &state) {
        return resp;
    }
    let user_oid = match parse_object_id(user_id) {
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

    let user = match users.find_one(doc! { "_id": user_oid }).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "User not found", None),
        Err(e) => return app_error_response(&e),
    };

    json_response(StatusCode::OK, &profile_of(&user, user_oid.to_hex()))
}

/// GET /api/users/{id}/stats
async fn handle_stats(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: &str,
) -> Response<FullBody> {
    if let Err(resp) = require_auth(&req, &state) {
        return resp;
    }
    let user_oid = match parse_object_id(user_id) {
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

    let user = match users.find_one(doc! { "_id": user_oid }).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "User not found", None),
        Err(e) => return app_error_response(&e),
    };

    let wars = match mongo.collection::<WarDoc>(WAR_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let wars_won = match wars.count(doc! { "winner_id": user_oid }).await {
        Ok(n) => n,
        Err(e) => return app_error_response(&e),
    };
    let wars_lost = match wars
        .count(doc! {
            "status": "completed",
            "winner_id": { "$exists": true, "$ne": user_oid },
            "$or": [
                { "challenger_id": user_oid },
                { "defender_id": user_oid },
            ],
        })
        .await
    {
        Ok(n) => n,
        Err(e) => return app_error_response(&e),
    };
    let wars_active = match wars
        .count(doc! {
            "status": "accepted",
            "$or": [
                { "challenger_id": user_oid },
                { "defender_id": user_oid },
            ],
        })
        .await
    {
        Ok(n) => n,
        Err(e) => return app_error_response(&e),
    };

    json_response(
        StatusCode::OK,
        &StatsResponse {
            profile: profile_of(&user, user_oid.to_hex()),
            coin_balance: user.coin_balance,
            wars_won,
            wars_lost,
            wars_active,
        },
    )
}

/// PUT /api/users/me
async fn handle_update_profile(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_oid = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let body: UpdateProfileRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let users = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let mut set = doc! { "metadata.updated_at": bson::DateTime::now() };
    if let Some(name) = body.display_name {
        if name.trim().is_empty() {
            return error_response(StatusCode::BAD_REQUEST, "Display name is required", None);
        }
        set.insert("display_name", name.trim());
    }
    if let Some(avatar) = body.avatar_emoji {
        set.insert("avatar_emoji", avatar);
    }

    let updated = match users
        .update_one(doc! { "_id": user_oid }, doc! { "$set": set })
        .await
    {
        Ok(r) => r,
        Err(e) => return app_error_response(&e),
    };

    if updated.matched_count == 0 {
        return error_response(StatusCode::NOT_FOUND, "User not found", None);
    }

    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "Profile updated".to_string(),
        },
    )
}

/// GET /api/leaderboard
async fn handle_leaderboard(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    if let Err(resp) = require_auth(&req, &state) {
        return resp;
    }

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let users = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let options = FindOptions::builder()
        .sort(doc! { "total_points": -1 })
        .limit(50)
        .build();

    let docs = match users
        .find_many_with_options(doc! { "is_active": true }, Some(options))
        .await
    {
        Ok(d) => d,
        Err(e) => return app_error_response(&e),
    };

    let rows: Vec<LeaderboardRow> = docs
        .iter()
        .enumerate()
        .map(|(i, u)| LeaderboardRow {
            user_id: u._id.map(|id| id.to_hex()).unwrap_or_default(),
            display_name: u.display_name.clone(),
            avatar_emoji: u.avatar_emoji.clone(),
            total_points: u.total_points,
            current_streak: u.current_streak,
            rank: (i + 1) as u32,
        })
        .collect();

    json_response(StatusCode::OK, &rows)
}

fn profile_of(user: &UserDoc, user_id: String) -> ProfileResponse {
    ProfileResponse {
        user_id,
        display_name: user.display_name.clone(),
        avatar_emoji: user.avatar_emoji.clone(),
        total_points: user.total_points,
        current_streak: user.current_streak,
        longest_streak: user.longest_streak,
    }
}
