//! Habit endpoints
//!
//! ## Endpoints
//!
//! - `POST /api/habits` - Create a habit
//! - `GET /api/habits` - List own habits
//! - `GET /api/habits/suggest?topic=` - Habit suggestions (Exa-backed)
//! - `PUT /api/habits/{id}` - Update a habit
//! - `DELETE /api/habits/{id}` - Delete a habit and its completions
//! - `POST /api/habits/{id}/complete` - Complete a habit for today
//! - `POST /api/habits/{id}/remix` - Copy another user's habit

use bson::{doc, oid::ObjectId, DateTime};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::{
    ChallengeDoc, ChallengeParticipantDoc, HabitCompletionDoc, HabitDoc, TransactionKind,
    UserDoc, CHALLENGE_COLLECTION, COMPLETION_COLLECTION, HABIT_COLLECTION,
    PARTICIPANT_COLLECTION, USER_COLLECTION,
};
use crate::db::MongoClient;
use crate::logging::EventType;
use crate::routes::util::{
    app_error_response, claims_user_id, error_response, json_response, parse_json_body,
    parse_object_id, query_param, require_auth, require_mongo, FullBody, SuccessResponse,
};
use crate::server::AppState;
use crate::services::ledger;
use crate::streaks;
use crate::types::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHabitRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub points_per_completion: Option<i64>,
    #[serde(default)]
    pub challenge_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHabitRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub points_per_completion: Option<i64>,
    #[serde(default)]
    pub is_archived: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteHabitRequest {
    #[serde(default)]
    pub proof_text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitResponse {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub emoji: String,
    pub points_per_completion: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remixed_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<String>,
    pub is_archived: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub habit_id: String,
    pub day: String,
    pub points_awarded: i64,
    pub total_points: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub coin_balance: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsResponse {
    pub topic: String,
    pub suggestions: Vec<String>,
    pub from_search: bool,
}

/// Main handler for /api/habits* routes
pub async fn handle_habits_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/api/habits").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "") | (Method::POST, "/") => handle_create(req, state).await,
        (Method::GET, "") | (Method::GET, "/") => handle_list(req, state).await,
        (Method::GET, "/suggest") => handle_suggest(req, state).await,

        (Method::POST, p) if p.ends_with("/complete") => {
            let id = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/complete"))
                .unwrap_or("");
            handle_complete(req, state, id).await
        }

        (Method::POST, p) if p.ends_with("/remix") => {
            let id = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/remix"))
                .unwrap_or("");
            handle_remix(req, state, id).await
        }

        (Method::PUT, p) if p.matches('/').count() == 1 => {
            let id = p.trim_start_matches('/');
            handle_update(req, state, id).await
        }

        (Method::DELETE, p) if p.matches('/').count() == 1 => {
            let id = p.trim_start_matches('/');
            handle_delete(req, state, id).await
        }

        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}

/// POST /api/habits
async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let body: CreateHabitRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    if body.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Habit name is required", None);
    }

    if let Some(points) = body.points_per_completion {
        if points < 1 {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Points per completion must be at least 1",
                None,
            );
        }
    }

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let mut habit = HabitDoc::new(user_id, body.name.trim().to_string());
    habit.description = body.description;
    if let Some(emoji) = body.emoji {
        habit.emoji = emoji;
    }
    if let Some(points) = body.points_per_completion {
        habit.points_per_completion = points;
    }

    // A challenge-linked habit requires membership in that challenge
    if let Some(ref raw) = body.challenge_id {
        let challenge_id = match parse_object_id(raw) {
            Ok(id) => id,
            Err(resp) => return resp,
        };
        match participant_row(mongo, challenge_id, user_id).await {
            Ok(Some(_)) => habit.challenge_id = Some(challenge_id),
            Ok(None) => {
                return error_response(
                    StatusCode::CONFLICT,
                    "Join the challenge before linking habits to it",
                    Some("NOT_A_PARTICIPANT"),
                )
            }
            Err(e) => return app_error_response(&e),
        }
    }

    let habits = match mongo.collection::<HabitDoc>(HABIT_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let response = habit_to_response_parts(&habit);
    let habit_id = match habits.insert_one(habit).await {
        Ok(id) => id,
        Err(e) => return app_error_response(&e),
    };

    json_response(
        StatusCode::CREATED,
        &HabitResponse {
            id: habit_id.to_hex(),
            ..response
        },
    )
}

/// GET /api/habits
async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let include_archived = query_param(req.uri().query(), "archived")
        .map(|v| v == "true")
        .unwrap_or(false);

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let habits = match mongo.collection::<HabitDoc>(HABIT_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let mut filter = doc! { "user_id": user_id };
    if !include_archived {
        filter.insert("is_archived", doc! { "$ne": true });
    }

    let docs = match habits.find_many(filter).await {
        Ok(d) => d,
        Err(e) => return app_error_response(&e),
    };

    let list: Vec<HabitResponse> = docs
        .iter()
        .map(|h| HabitResponse {
            id: h._id.map(|id| id.to_hex()).unwrap_or_default(),
            ..habit_to_response_parts(h)
        })
        .collect();

    json_response(StatusCode::OK, &list)
}

/// GET /api/habits/suggest?topic=
async fn handle_suggest(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    if let Err(resp) = require_auth(&req, &state) {
        return resp;
    }

    let topic =
        query_param(req.uri().query(), "topic").unwrap_or_else(|| "daily wellness".to_string());

    let (suggestions, from_search) = state.search.suggest_habits(&topic).await;

    json_response(
        StatusCode::OK,
        &SuggestionsResponse {
            topic,
            suggestions,
            from_search,
        },
    )
}

/// PUT /api/habits/{id}
async fn handle_update(
    req: Request<Incoming>,
    state: Arc<AppState>,
    habit_id: &str,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let habit_oid = match parse_object_id(habit_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let body: UpdateHabitRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    if let Some(points) = body.points_per_completion {
        if points < 1 {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Points per completion must be at least 1",
                None,
            );
        }
    }

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let habits = match mongo.collection::<HabitDoc>(HABIT_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let mut set = doc! { "metadata.updated_at": DateTime::now() };
    if let Some(name) = body.name {
        if name.trim().is_empty() {
            return error_response(StatusCode::BAD_REQUEST, "Habit name is required", None);
        }
        set.insert("name", name.trim());
    }
    if let Some(description) = body.description {
        set.insert("description", description);
    }
    if let Some(emoji) = body.emoji {
        set.insert("emoji", emoji);
    }
    if let Some(points) = body.points_per_completion {
        set.insert("points_per_completion", points);
    }
    if let Some(archived) = body.is_archived {
        set.insert("is_archived", archived);
    }

    // Ownership lives in the filter: another user's habit matches nothing
    let updated = match habits
        .update_one(
            doc! { "_id": habit_oid, "user_id": user_id },
            doc! { "$set": set },
        )
        .await
    {
        Ok(r) => r,
        Err(e) => return app_error_response(&e),
    };

    if updated.matched_count == 0 {
        return error_response(StatusCode::NOT_FOUND, "Habit not found", None);
    }

    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "Habit updated".to_string(),
        },
    )
}

/// DELETE /api/habits/{id}
///
/// Hard-deletes the habit and its completions, and walks the owner's
/// total_points back by what those completions awarded.
async fn handle_delete(
    req: Request<Incoming>,
    state: Arc<AppState>,
    habit_id: &str,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let habit_oid = match parse_object_id(habit_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let habits = match mongo.collection::<HabitDoc>(HABIT_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };
    let completions = match mongo
        .collection::<HabitCompletionDoc>(COMPLETION_COLLECTION)
        .await
    {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let habit = match habits
        .find_one(doc! { "_id": habit_oid, "user_id": user_id })
        .await
    {
        Ok(Some(h)) => h,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Habit not found", None),
        Err(e) => return app_error_response(&e),
    };

    let habit_completions = match completions.find_many(doc! { "habit_id": habit_oid }).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };
    let points_to_remove: i64 = habit_completions.iter().map(|c| c.points_awarded).sum();

    if let Err(e) = completions.delete_many(doc! { "habit_id": habit_oid }).await {
        return app_error_response(&e);
    }
    if let Err(e) = habits.delete_many(doc! { "_id": habit_oid }).await {
        return app_error_response(&e);
    }

    if points_to_remove > 0 {
        let users = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
            Ok(c) => c,
            Err(e) => return app_error_response(&e),
        };
        if let Err(e) = users
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$inc": { "total_points": -points_to_remove },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await
        {
            return app_error_response(&e);
        }
    }

    info!(
        "Deleted habit {} ({} completions, {} points removed)",
        habit.name,
        habit_completions.len(),
        points_to_remove
    );

    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: format!(
                "Habit deleted along with {} completion(s)",
                habit_completions.len()
            ),
        },
    )
}

/// POST /api/habits/{id}/complete
async fn handle_complete(
    req: Request<Incoming>,
    state: Arc<AppState>,
    habit_id: &str,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let habit_oid = match parse_object_id(habit_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let body: CompleteHabitRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let habits = match mongo.collection::<HabitDoc>(HABIT_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let habit = match habits
        .find_one(doc! { "_id": habit_oid, "user_id": user_id })
        .await
    {
        Ok(Some(h)) => h,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Habit not found", None),
        Err(e) => return app_error_response(&e),
    };

    if habit.is_archived {
        return error_response(
            StatusCode::CONFLICT,
            "Archived habits cannot be completed",
            Some("HABIT_ARCHIVED"),
        );
    }

    let completions = match mongo
        .collection::<HabitCompletionDoc>(COMPLETION_COLLECTION)
        .await
    {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let day = streaks::today_key();
    let points = habit.points_per_completion;

    let mut completion = HabitCompletionDoc::new(habit_oid, user_id, day.clone(), points);
    completion.proof_text = body.proof_text;

    // The unique (habit_id, day) index is the double-completion guard;
    // a concurrent duplicate loses here, not at a pre-check
    match completions.insert_one(completion).await {
        Ok(_) => {}
        Err(AppError::Conflict(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "Habit already completed today",
                Some("ALREADY_COMPLETED"),
            )
        }
        Err(e) => return app_error_response(&e),
    }

    let users = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    // Points and streaks
    let (current_streak, longest_streak) = match recompute_streaks(mongo, user_id).await {
        Ok(s) => s,
        Err(e) => return app_error_response(&e),
    };

    if let Err(e) = users
        .update_one(
            doc! { "_id": user_id },
            doc! {
                "$inc": { "total_points": points },
                "$set": {
                    "current_streak": current_streak,
                    "metadata.updated_at": DateTime::now(),
                },
                "$max": { "longest_streak": longest_streak },
            },
        )
        .await
    {
        return app_error_response(&e);
    }

    // Coins mirror points 1:1 on completion
    let coin_balance = match ledger::credit(
        mongo,
        user_id,
        points,
        TransactionKind::Earn,
        &format!("Completed habit: {}", habit.name),
    )
    .await
    {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    // Credit the linked challenge while it is running
    if let Some(challenge_id) = habit.challenge_id {
        if let Err(e) = credit_challenge_points(mongo, challenge_id, user_id, points).await {
            return app_error_response(&e);
        }
    }

    let user = match users.find_one(doc! { "_id": user_id }).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "User not found", None),
        Err(e) => return app_error_response(&e),
    };

    state
        .activity
        .log(
            state
                .activity
                .event(EventType::HabitCompleted)
                .with_user(user_id.to_hex())
                .with_subject(habit_oid.to_hex())
                .with_points(points)
                .with_metadata(serde_json::json!({ "day": day })),
        )
        .await;

    json_response(
        StatusCode::CREATED,
        &CompletionResponse {
            habit_id: habit_oid.to_hex(),
            day,
            points_awarded: points,
            total_points: user.total_points,
            current_streak: user.current_streak,
            longest_streak: user.longest_streak,
            coin_balance,
        },
    )
}

/// POST /api/habits/{id}/remix
async fn handle_remix(
    req: Request<Incoming>,
    state: Arc<AppState>,
    habit_id: &str,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let source_oid = match parse_object_id(habit_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let habits = match mongo.collection::<HabitDoc>(HABIT_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let source = match habits.find_one(doc! { "_id": source_oid }).await {
        Ok(Some(h)) => h,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Habit not found", None),
        Err(e) => return app_error_response(&e),
    };

    if source.user_id == user_id {
        return error_response(
            StatusCode::CONFLICT,
            "Cannot remix your own habit",
            Some("OWN_HABIT"),
        );
    }

    let mut remix = HabitDoc::new(user_id, source.name.clone());
    remix.description = source.description.clone();
    remix.emoji = source.emoji.clone();
    remix.points_per_completion = source.points_per_completion;
    remix.remixed_from = Some(source_oid);

    let response = habit_to_response_parts(&remix);
    let remix_id = match habits.insert_one(remix).await {
        Ok(id) => id,
        Err(e) => return app_error_response(&e),
    };

    json_response(
        StatusCode::CREATED,
        &HabitResponse {
            id: remix_id.to_hex(),
            ..response
        },
    )
}

// =============================================================================
// Helpers
// =============================================================================

fn habit_to_response_parts(h: &HabitDoc) -> HabitResponse {
    HabitResponse {
        id: String::new(),
        name: h.name.clone(),
        description: h.description.clone(),
        emoji: h.emoji.clone(),
        points_per_completion: h.points_per_completion,
        remixed_from: h.remixed_from.map(|id| id.to_hex()),
        challenge_id: h.challenge_id.map(|id| id.to_hex()),
        is_archived: h.is_archived,
    }
}

async fn participant_row(
    mongo: &MongoClient,
    challenge_id: ObjectId,
    user_id: ObjectId,
) -> Result<Option<ChallengeParticipantDoc>, AppError> {
    let participants = mongo
        .collection::<ChallengeParticipantDoc>(PARTICIPANT_COLLECTION)
        .await?;
    participants
        .find_one(doc! { "challenge_id": challenge_id, "user_id": user_id })
        .await
}

/// Recompute the user's streaks from their full completion-day set
async fn recompute_streaks(
    mongo: &MongoClient,
    user_id: ObjectId,
) -> Result<(i64, i64), AppError> {
    let completions = mongo
        .collection::<HabitCompletionDoc>(COMPLETION_COLLECTION)
        .await?;

    let docs = completions.find_many(doc! { "user_id": user_id }).await?;

    let days: BTreeSet<chrono::NaiveDate> = docs
        .iter()
        .filter_map(|c| streaks::parse_day_key(&c.day))
        .collect();

    Ok(streaks::compute_streaks(
        &days,
        chrono::Utc::now().date_naive(),
    ))
}

/// Bump a participant's points while the challenge is running. Skips
/// silently when the challenge is outside its window or the user left.
async fn credit_challenge_points(
    mongo: &MongoClient,
    challenge_id: ObjectId,
    user_id: ObjectId,
    points: i64,
) -> Result<(), AppError> {
    let challenges = mongo.collection::<ChallengeDoc>(CHALLENGE_COLLECTION).await?;

    let challenge = match challenges.find_one(doc! { "_id": challenge_id }).await? {
        Some(c) => c,
        None => return Ok(()),
    };

    if !challenge.is_active(DateTime::now()) {
        return Ok(());
    }

    let participants = mongo
        .collection::<ChallengeParticipantDoc>(PARTICIPANT_COLLECTION)
        .await?;

    participants
        .update_one(
            doc! { "challenge_id": challenge_id, "user_id": user_id },
            doc! {
                "$inc": { "points": points },
                "$set": { "metadata.updated_at": DateTime::now() },
            },
        )
        .await?;

    Ok(())
}
