//! Friendship endpoints
//!
//! ## Endpoints
//!
//! - `POST /api/friends/request` - Send a friend request
//! - `POST /api/friends/{id}/accept` - Accept a pending request
//! - `POST /api/friends/{id}/decline` - Decline a pending request
//! - `GET /api/friends` - Accepted friends, resolved to profiles
//! - `GET /api/friends/pending` - Requests awaiting this user

use bson::{doc, oid::ObjectId, DateTime};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::schemas::{
    FriendshipDoc, FriendshipStatus, UserDoc, FRIENDSHIP_COLLECTION, USER_COLLECTION,
};
use crate::db::MongoClient;
use crate::routes::util::{
    app_error_response, claims_user_id, error_response, json_response, parse_json_body,
    parse_object_id, require_auth, require_mongo, FullBody,
};
use crate::server::AppState;
use crate::types::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestBody {
    pub addressee_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendEntry {
    pub friendship_id: String,
    pub user_id: String,
    pub display_name: String,
    pub avatar_emoji: String,
    pub current_streak: i64,
}

/// Main handler for /api/friends* routes
pub async fn handle_friends_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/api/friends").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "/request") => handle_send_request(req, state).await,
        (Method::GET, "") | (Method::GET, "/") => handle_list(req, state).await,
        (Method::GET, "/pending") => handle_pending(req, state).await,

        (Method::POST, p) if p.ends_with("/accept") => {
            let id = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/accept"))
                .unwrap_or("");
            handle_respond(req, state, id, FriendshipStatus::Accepted).await
        }
        (Method::POST, p) if p.ends_with("/decline") => {
            let id = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/decline"))
                .unwrap_or("");
            handle_respond(req, state, id, FriendshipStatus::Declined).await
        }

        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}

/// POST /api/friends/request
async fn handle_send_request(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let requester_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let body: FriendRequestBody = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    let addressee_id = match parse_object_id(&body.addressee_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if addressee_id == requester_id {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Cannot befriend yourself",
            Some("SELF_FRIEND"),
        );
    }

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let users = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };
    match users.find_one(doc! { "_id": addressee_id }).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "User not found", None),
        Err(e) => return app_error_response(&e),
    }

    let friendships = match mongo.collection::<FriendshipDoc>(FRIENDSHIP_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    // A row in either direction blocks a new request
    match existing_pair(mongo, requester_id, addressee_id).await {
        Ok(Some(existing)) => {
            let message = match existing.status {
                FriendshipStatus::Accepted => "Already friends",
                FriendshipStatus::Pending => "Request already pending",
                FriendshipStatus::Declined => "Request was declined",
            };
            return error_response(StatusCode::CONFLICT, message, Some("DUPLICATE_REQUEST"));
        }
        Ok(None) => {}
        Err(e) => return app_error_response(&e),
    }

    let friendship_id = match friendships
        .insert_one(FriendshipDoc::new(requester_id, addressee_id))
        .await
    {
        Ok(id) => id,
        Err(e) => return app_error_response(&e),
    };

    json_response(
        StatusCode::CREATED,
        &serde_json::json!({
            "success": true,
            "friendshipId": friendship_id.to_hex(),
            "status": "pending",
        }),
    )
}

/// POST /api/friends/{id}/accept | /decline
async fn handle_respond(
    req: Request<Incoming>,
    state: Arc<AppState>,
    friendship_id: &str,
    decision: FriendshipStatus,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let friendship_oid = match parse_object_id(friendship_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let friendships = match mongo.collection::<FriendshipDoc>(FRIENDSHIP_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let friendship = match friendships.find_one(doc! { "_id": friendship_oid }).await {
        Ok(Some(f)) => f,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Request not found", None),
        Err(e) => return app_error_response(&e),
    };

    if friendship.addressee_id != user_id {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only the addressee can respond",
            Some("NOT_ADDRESSEE"),
        );
    }

    if friendship.status != FriendshipStatus::Pending {
        return error_response(
            StatusCode::CONFLICT,
            "Request is no longer pending",
            Some("NOT_PENDING"),
        );
    }

    let status_str = match decision {
        FriendshipStatus::Accepted => "accepted",
        FriendshipStatus::Declined => "declined",
        FriendshipStatus::Pending => unreachable!("decision is never pending"),
    };

    let updated = match friendships
        .update_one(
            doc! { "_id": friendship_oid, "status": "pending" },
            doc! {
                "$set": {
                    "status": status_str,
                    "metadata.updated_at": DateTime::now(),
                }
            },
        )
        .await
    {
        Ok(r) => r,
        Err(e) => return app_error_response(&e),
    };

    if updated.modified_count == 0 {
        return error_response(
            StatusCode::CONFLICT,
            "Request is no longer pending",
            Some("NOT_PENDING"),
        );
    }

    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "success": true,
            "friendshipId": friendship_oid.to_hex(),
            "status": status_str,
        }),
    )
}

/// GET /api/friends
async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
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

    let friendships = match mongo.collection::<FriendshipDoc>(FRIENDSHIP_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let rows = match friendships
        .find_many(doc! {
            "status": "accepted",
            "$or": [
                { "requester_id": user_id },
                { "addressee_id": user_id },
            ],
        })
        .await
    {
        Ok(r) => r,
        Err(e) => return app_error_response(&e),
    };

    match resolve_friends(mongo, &rows, user_id).await {
        Ok(friends) => json_response(StatusCode::OK, &friends),
        Err(e) => app_error_response(&e),
    }
}

/// GET /api/friends/pending
async fn handle_pending(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
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

    let friendships = match mongo.collection::<FriendshipDoc>(FRIENDSHIP_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let rows = match friendships
        .find_many(doc! { "addressee_id": user_id, "status": "pending" })
        .await
    {
        Ok(r) => r,
        Err(e) => return app_error_response(&e),
    };

    match resolve_friends(mongo, &rows, user_id).await {
        Ok(friends) => json_response(StatusCode::OK, &friends),
        Err(e) => app_error_response(&e),
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn existing_pair(
    mongo: &MongoClient,
    a: ObjectId,
    b: ObjectId,
) -> Result<Option<FriendshipDoc>, AppError> {
    let friendships = mongo
        .collection::<FriendshipDoc>(FRIENDSHIP_COLLECTION)
        .await?;
    friendships
        .find_one(doc! {
            "$or": [
                { "requester_id": a, "addressee_id": b },
                { "requester_id": b, "addressee_id": a },
            ]
        })
        .await
}

/// Resolve friendship rows to the *other* user's profile
async fn resolve_friends(
    mongo: &MongoClient,
    rows: &[FriendshipDoc],
    me: ObjectId,
) -> Result<Vec<FriendEntry>, AppError> {
    let users = mongo.collection::<UserDoc>(USER_COLLECTION).await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let other = if row.requester_id == me {
            row.addressee_id
        } else {
            row.requester_id
        };

        let Some(user) = users.find_one(doc! { "_id": other }).await? else {
            continue;
        };

        entries.push(FriendEntry {
            friendship_id: row._id.map(|id| id.to_hex()).unwrap_or_default(),
            user_id: other.to_hex(),
            display_name: user.display_name,
            avatar_emoji: user.avatar_emoji,
            current_streak: user.current_streak,
        });
    }

    Ok(entries)
}
