//! Challenge endpoints
//!
//! ## Endpoints
//!
//! - `POST /api/challenges` - Create a time-boxed challenge
//! - `GET /api/challenges` - List challenges (`?active=true` filters)
//! - `POST /api/challenges/{id}/join` - Join a challenge
//! - `GET /api/challenges/{id}/leaderboard` - Participants by points

use bson::{doc, DateTime};
use chrono::{DateTime as ChronoDateTime, Utc};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use mongodb::options::FindOptions;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::schemas::{
    ChallengeDoc, ChallengeParticipantDoc, UserDoc, CHALLENGE_COLLECTION, PARTICIPANT_COLLECTION,
    USER_COLLECTION,
};
use crate::routes::util::{
    app_error_response, claims_user_id, error_response, json_response, parse_json_body,
    parse_object_id, query_param, require_auth, require_mongo, FullBody,
};
use crate::server::AppState;
use crate::types::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChallengeRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// RFC 3339; defaults to now
    #[serde(default)]
    pub starts_at: Option<String>,
    /// RFC 3339
    pub ends_at: String,
    #[serde(default)]
    pub allow_wars: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: String,
    pub starts_at: String,
    pub ends_at: String,
    pub allow_wars: bool,
    pub participant_count: i64,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub display_name: String,
    pub avatar_emoji: String,
    pub points: i64,
    pub rank: u32,
}

/// Main handler for /api/challenges* routes
pub async fn handle_challenges_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/api/challenges").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "") | (Method::POST, "/") => handle_create(req, state).await,
        (Method::GET, "") | (Method::GET, "/") => handle_list(req, state).await,

        (Method::POST, p) if p.ends_with("/join") => {
            let id = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/join"))
                .unwrap_or("");
            handle_join(req, state, id).await
        }

        (Method::GET, p) if p.ends_with("/leaderboard") => {
            let id = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/leaderboard"))
                .unwrap_or("");
            handle_leaderboard(req, state, id).await
        }

        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}

/// POST /api/challenges
async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let body: CreateChallengeRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    if body.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Challenge name is required", None);
    }

    let starts_at = match body.starts_at {
        Some(ref raw) => match parse_rfc3339(raw) {
            Ok(dt) => dt,
            Err(e) => return app_error_response(&e),
        },
        None => DateTime::now(),
    };

    let ends_at = match parse_rfc3339(&body.ends_at) {
        Ok(dt) => dt,
        Err(e) => return app_error_response(&e),
    };

    if ends_at <= starts_at {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Challenge must end after it starts",
            None,
        );
    }

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let mut challenge = ChallengeDoc::new(body.name.trim().to_string(), user_id, starts_at, ends_at);
    challenge.description = body.description;
    if let Some(allow_wars) = body.allow_wars {
        challenge.allow_wars = allow_wars;
    }

    let challenges = match mongo.collection::<ChallengeDoc>(CHALLENGE_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let response = challenge_to_response(&challenge, DateTime::now());
    let challenge_id = match challenges.insert_one(challenge).await {
        Ok(id) => id,
        Err(e) => return app_error_response(&e),
    };

    json_response(
        StatusCode::CREATED,
        &ChallengeResponse {
            id: challenge_id.to_hex(),
            ..response
        },
    )
}

/// GET /api/challenges
async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    if let Err(resp) = require_auth(&req, &state) {
        return resp;
    }

    let active_only = query_param(req.uri().query(), "active")
        .map(|v| v == "true")
        .unwrap_or(false);

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let challenges = match mongo.collection::<ChallengeDoc>(CHALLENGE_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let now = DateTime::now();
    let filter = if active_only {
        doc! {
            "starts_at": { "$lte": now },
            "ends_at": { "$gt": now },
        }
    } else {
        doc! {}
    };

    let options = FindOptions::builder().sort(doc! { "ends_at": -1 }).build();

    let docs = match challenges.find_many_with_options(filter, Some(options)).await {
        Ok(d) => d,
        Err(e) => return app_error_response(&e),
    };

    let list: Vec<ChallengeResponse> = docs
        .iter()
        .map(|c| ChallengeResponse {
            id: c._id.map(|id| id.to_hex()).unwrap_or_default(),
            ..challenge_to_response(c, now)
        })
        .collect();

    json_response(StatusCode::OK, &list)
}

/// POST /api/challenges/{id}/join
async fn handle_join(
    req: Request<Incoming>,
    state: Arc<AppState>,
    challenge_id: &str,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let challenge_oid = match parse_object_id(challenge_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let challenges = match mongo.collection::<ChallengeDoc>(CHALLENGE_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let challenge = match challenges.find_one(doc! { "_id": challenge_oid }).await {
        Ok(Some(c)) => c,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Challenge not found", None),
        Err(e) => return app_error_response(&e),
    };

    if challenge.has_ended(DateTime::now()) {
        return error_response(
            StatusCode::CONFLICT,
            "Challenge has already ended",
            Some("CHALLENGE_ENDED"),
        );
    }

    let participants = match mongo
        .collection::<ChallengeParticipantDoc>(PARTICIPANT_COLLECTION)
        .await
    {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    // The unique (challenge_id, user_id) index turns a double join into a
    // conflict
    match participants
        .insert_one(ChallengeParticipantDoc::new(challenge_oid, user_id))
        .await
    {
        Ok(_) => {}
        Err(AppError::Conflict(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "Already participating in this challenge",
                Some("ALREADY_JOINED"),
            )
        }
        Err(e) => return app_error_response(&e),
    }

    if let Err(e) = challenges
        .update_one(
            doc! { "_id": challenge_oid },
            doc! {
                "$inc": { "participant_count": 1 },
                "$set": { "metadata.updated_at": DateTime::now() },
            },
        )
        .await
    {
        return app_error_response(&e);
    }

    json_response(
        StatusCode::CREATED,
        &serde_json::json!({
            "success": true,
            "challengeId": challenge_oid.to_hex(),
        }),
    )
}

/// GET /api/challenges/{id}/leaderboard
async fn handle_leaderboard(
    req: Request<Incoming>,
    state: Arc<AppState>,
    challenge_id: &str,
) -> Response<FullBody> {
    if let Err(resp) = require_auth(&req, &state) {
        return resp;
    }
    let challenge_oid = match parse_object_id(challenge_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let participants = match mongo
        .collection::<ChallengeParticipantDoc>(PARTICIPANT_COLLECTION)
        .await
    {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let options = FindOptions::builder()
        .sort(doc! { "points": -1 })
        .limit(100)
        .build();

    let rows = match participants
        .find_many_with_options(doc! { "challenge_id": challenge_oid }, Some(options))
        .await
    {
        Ok(r) => r,
        Err(e) => return app_error_response(&e),
    };

    let users = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let mut entries = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let user = match users.find_one(doc! { "_id": row.user_id }).await {
            Ok(Some(u)) => u,
            Ok(None) => continue,
            Err(e) => return app_error_response(&e),
        };

        entries.push(LeaderboardEntry {
            user_id: row.user_id.to_hex(),
            display_name: user.display_name,
            avatar_emoji: user.avatar_emoji,
            points: row.points,
            rank: (i + 1) as u32,
        });
    }

    json_response(StatusCode::OK, &entries)
}

// =============================================================================
// Helpers
// =============================================================================

fn challenge_to_response(c: &ChallengeDoc, now: DateTime) -> ChallengeResponse {
    ChallengeResponse {
        id: String::new(),
        name: c.name.clone(),
        description: c.description.clone(),
        created_by: c.created_by.to_hex(),
        starts_at: c.starts_at.try_to_rfc3339_string().unwrap_or_default(),
        ends_at: c.ends_at.try_to_rfc3339_string().unwrap_or_default(),
        allow_wars: c.allow_wars,
        participant_count: c.participant_count,
        is_active: c.is_active(now),
    }
}

fn parse_rfc3339(raw: &str) -> Result<DateTime, AppError> {
    let parsed: ChronoDateTime<Utc> = raw
        .parse()
        .map_err(|_| AppError::Validation(format!("Invalid RFC 3339 timestamp: {raw}")))?;
    Ok(DateTime::from_chrono(parsed))
}
