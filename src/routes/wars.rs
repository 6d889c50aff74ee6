//! War endpoints
//!
//! ## Endpoints
//!
//! - `POST /api/wars` - Declare a war
//! - `GET /api/wars` - List own wars
//! - `POST /api/wars/{id}/accept` - Accept a pending war
//! - `POST /api/wars/{id}/decline` - Decline a pending war
//! - `POST /api/wars/{id}/complete` - Settle an accepted war
//! - `GET /api/wars/{id}/sabotage/challenges` - Side-challenge catalog
//! - `POST /api/wars/{id}/sabotage/complete` - Log a side-challenge
//! - `POST /api/wars/{id}/sabotage/activate` - Spend the sabotage pool
//! - `POST /api/wars/{id}/sabotage/escape` - Log an escape task
//!
//! Every state transition is validated through `crate::wars::rules` and
//! guarded by a status filter on the update, so a racing request matches
//! nothing instead of double-applying.

use bson::{doc, oid::ObjectId, DateTime};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::schemas::{
    ChallengeDoc, ChallengeParticipantDoc, SabotageCompletionDoc, TransactionKind, UserDoc,
    WarDoc, CHALLENGE_COLLECTION, PARTICIPANT_COLLECTION, SABOTAGE_COMPLETION_COLLECTION,
    USER_COLLECTION, WAR_COLLECTION,
};
use crate::db::MongoClient;
use crate::logging::EventType;
use crate::routes::util::{
    app_error_response, claims_user_id, error_response, json_response, parse_json_body,
    parse_object_id, require_auth, require_mongo, FullBody,
};
use crate::server::AppState;
use crate::services::{ledger, FlavorStyle};
use crate::types::AppError;
use crate::wars::{self, rules, sabotage, Settlement, WarStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclareWarRequest {
    pub challenge_id: String,
    pub defender_id: String,
    pub wager_coins: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SabotageTaskRequest {
    pub task_id: String,
    #[serde(default)]
    pub proof_text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarResponse {
    pub id: String,
    pub challenge_id: String,
    pub challenger_id: String,
    pub defender_id: String,
    pub wager_coins: i64,
    pub status: WarStatus,
    pub expires_at: String,
    pub sabotage_power: i64,
    pub sabotage_active: bool,
    pub sabotage_intensity: i64,
    pub escape_tasks_done: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
    /// Flavor line attached to declare/complete responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor_line: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SabotageCatalogResponse {
    pub power_tasks: Vec<CatalogTask>,
    pub escape_tasks: Vec<CatalogTask>,
    pub activation_threshold: i64,
    pub escape_tasks_required: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTask {
    pub id: &'static str,
    pub title: &'static str,
    pub power: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SabotagePoolResponse {
    pub war_id: String,
    pub sabotage_power: i64,
    pub sabotage_active: bool,
    pub escape_tasks_done: i64,
}

/// Main handler for /api/wars* routes
pub async fn handle_wars_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/api/wars").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "") | (Method::POST, "/") => handle_declare(req, state).await,
        (Method::GET, "") | (Method::GET, "/") => handle_list(req, state).await,

        (Method::POST, p) if p.ends_with("/accept") => {
            let id = strip_id(p, "/accept");
            handle_accept(req, state, id).await
        }
        (Method::POST, p) if p.ends_with("/decline") => {
            let id = strip_id(p, "/decline");
            handle_decline(req, state, id).await
        }
        // Sabotage arms go first: "/sabotage/complete" would otherwise be
        // swallowed by the settle arm's "/complete" suffix match
        (Method::GET, p) if p.ends_with("/sabotage/challenges") => {
            let id = strip_id(p, "/sabotage/challenges");
            handle_sabotage_catalog(req, state, id).await
        }
        (Method::POST, p) if p.ends_with("/sabotage/complete") => {
            let id = strip_id(p, "/sabotage/complete");
            handle_sabotage_complete(req, state, id).await
        }
        (Method::POST, p) if p.ends_with("/sabotage/activate") => {
            let id = strip_id(p, "/sabotage/activate");
            handle_sabotage_activate(req, state, id).await
        }
        (Method::POST, p) if p.ends_with("/sabotage/escape") => {
            let id = strip_id(p, "/sabotage/escape");
            handle_sabotage_escape(req, state, id).await
        }
        (Method::POST, p) if p.ends_with("/complete") => {
            let id = strip_id(p, "/complete");
            handle_complete(req, state, id).await
        }

        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}

fn strip_id<'a>(subpath: &'a str, suffix: &str) -> &'a str {
    subpath
        .strip_prefix('/')
        .and_then(|s| s.strip_suffix(suffix))
        .unwrap_or("")
}

/// POST /api/wars
async fn handle_declare(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let challenger_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let body: DeclareWarRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    let challenge_oid = match parse_object_id(&body.challenge_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let defender_oid = match parse_object_id(&body.defender_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if defender_oid == challenger_id {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Cannot declare war on yourself",
            Some("SELF_WAR"),
        );
    }

    if body.wager_coins < 1 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Wager must be at least 1 coin",
            None,
        );
    }

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

    if !challenge.allow_wars {
        return error_response(
            StatusCode::CONFLICT,
            "This challenge does not allow wars",
            Some("WARS_DISABLED"),
        );
    }

    if challenge.has_ended(DateTime::now()) {
        return error_response(
            StatusCode::CONFLICT,
            "Challenge has already ended",
            Some("CHALLENGE_ENDED"),
        );
    }

    // Both sides must be participants
    for (who, user) in [("You", challenger_id), ("Your opponent", defender_oid)] {
        match is_participant(mongo, challenge_oid, user).await {
            Ok(true) => {}
            Ok(false) => {
                return error_response(
                    StatusCode::CONFLICT,
                    &format!("{who} must join the challenge before warring in it"),
                    Some("NOT_A_PARTICIPANT"),
                )
            }
            Err(e) => return app_error_response(&e),
        }
    }

    // Escrow the challenger's wager up front
    if let Err(e) = ledger::debit(
        mongo,
        challenger_id,
        body.wager_coins,
        TransactionKind::Wager,
        "Wager escrowed for declared war",
    )
    .await
    {
        return app_error_response(&e);
    }

    let expires_at = rules::acceptance_deadline(DateTime::now(), state.args.war_accept_window_hours);
    let war = WarDoc::new(
        challenge_oid,
        challenger_id,
        defender_oid,
        body.wager_coins,
        expires_at,
    );

    let wars_collection = match mongo.collection::<WarDoc>(WAR_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let war_id = match wars_collection.insert_one(war.clone()).await {
        Ok(id) => id,
        Err(e) => {
            // The wager is already escrowed; release it rather than strand it
            if let Err(refund_err) = ledger::credit(
                mongo,
                challenger_id,
                body.wager_coins,
                TransactionKind::Refund,
                "War declaration failed - wager returned",
            )
            .await
            {
                warn!("Failed to refund wager after declare error: {}", refund_err);
            }
            return app_error_response(&e);
        }
    };

    // Taunt the defender, and email them if their identifier is an address
    let (defender_name, defender_email) = match lookup_user(mongo, defender_oid).await {
        Ok(u) => u,
        Err(e) => return app_error_response(&e),
    };
    let (flavor_line, _) = state
        .flavor
        .generate(FlavorStyle::Taunt, &defender_name, Some("a war was just declared"))
        .await;

    if let Some(email) = defender_email {
        match lookup_user(mongo, challenger_id).await {
            Ok((challenger_name, _)) => {
                let mailer = Arc::clone(&state.mailer);
                let wager = body.wager_coins;
                let window = state.args.war_accept_window_hours;
                tokio::spawn(async move {
                    if let Err(e) = mailer
                        .send_war_invitation(&email, &challenger_name, wager, window)
                        .await
                    {
                        warn!("War invitation email failed: {}", e);
                    }
                });
            }
            // The war exists either way; the invitation is best-effort
            Err(e) => warn!("Skipping war invitation email: {}", e),
        }
    }

    info!(
        "War declared: {} vs {} in challenge {} ({} coins)",
        challenger_id, defender_oid, challenge_oid, body.wager_coins
    );

    state
        .activity
        .log(
            state
                .activity
                .event(EventType::WarDeclared)
                .with_user(challenger_id.to_hex())
                .with_subject(war_id.to_hex())
                .with_coins(body.wager_coins),
        )
        .await;

    json_response(
        StatusCode::CREATED,
        &war_to_response(&war, Some(war_id), Some(flavor_line)),
    )
}

/// GET /api/wars
///
/// Lists the caller's wars. Pending wars past their deadline are expired
/// (and refunded) on the way out, so clients never see a stale "pending".
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

    let wars_collection = match mongo.collection::<WarDoc>(WAR_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let docs = match wars_collection
        .find_many(doc! {
            "$or": [
                { "challenger_id": user_id },
                { "defender_id": user_id },
            ]
        })
        .await
    {
        Ok(d) => d,
        Err(e) => return app_error_response(&e),
    };

    let now = DateTime::now();
    let mut list = Vec::with_capacity(docs.len());
    for mut war in docs {
        if war.acceptance_lapsed(now) {
            match expire_war(mongo, &state, &war).await {
                Ok(true) => war.status = WarStatus::Expired,
                Ok(false) => {}
                Err(e) => return app_error_response(&e),
            }
        }
        let id = war._id;
        list.push(war_to_response(&war, id, None));
    }

    json_response(StatusCode::OK, &list)
}

/// POST /api/wars/{id}/accept
async fn handle_accept(
    req: Request<Incoming>,
    state: Arc<AppState>,
    war_id: &str,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let war_oid = match parse_object_id(war_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let wars_collection = match mongo.collection::<WarDoc>(WAR_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let war = match wars_collection.find_one(doc! { "_id": war_oid }).await {
        Ok(Some(w)) => w,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "War not found", None),
        Err(e) => return app_error_response(&e),
    };

    if war.defender_id != user_id {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only the challenged user can accept",
            Some("NOT_DEFENDER"),
        );
    }

    // A lapsed pending war expires right here rather than being accepted late
    if war.acceptance_lapsed(DateTime::now()) {
        if let Err(e) = expire_war(mongo, &state, &war).await {
            return app_error_response(&e);
        }
        return error_response(
            StatusCode::CONFLICT,
            "The acceptance window has passed",
            Some("WAR_EXPIRED"),
        );
    }

    if !war.status.can_transition(WarStatus::Accepted) {
        return error_response(
            StatusCode::CONFLICT,
            &format!("Cannot accept a {} war", war.status),
            Some("ILLEGAL_TRANSITION"),
        );
    }

    // Escrow the defender's wager before flipping the status
    if let Err(e) = ledger::debit(
        mongo,
        user_id,
        war.wager_coins,
        TransactionKind::Wager,
        "Wager escrowed for accepted war",
    )
    .await
    {
        return app_error_response(&e);
    }

    let updated = match wars_collection
        .update_one(
            doc! { "_id": war_oid, "status": "pending" },
            doc! {
                "$set": {
                    "status": "accepted",
                    "accepted_at": DateTime::now(),
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
        // Raced with a decline/expiry; give the escrow back
        if let Err(e) = ledger::credit(
            mongo,
            user_id,
            war.wager_coins,
            TransactionKind::Refund,
            "War was no longer pending - wager returned",
        )
        .await
        {
            warn!("Failed to refund wager after lost accept race: {}", e);
        }
        return error_response(
            StatusCode::CONFLICT,
            "War is no longer pending",
            Some("ILLEGAL_TRANSITION"),
        );
    }

    state
        .activity
        .log(
            state
                .activity
                .event(EventType::WarAccepted)
                .with_user(user_id.to_hex())
                .with_subject(war_oid.to_hex())
                .with_coins(war.wager_coins),
        )
        .await;

    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "success": true,
            "warId": war_oid.to_hex(),
            "status": "accepted",
        }),
    )
}

/// POST /api/wars/{id}/decline
async fn handle_decline(
    req: Request<Incoming>,
    state: Arc<AppState>,
    war_id: &str,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let war_oid = match parse_object_id(war_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let wars_collection = match mongo.collection::<WarDoc>(WAR_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let war = match wars_collection.find_one(doc! { "_id": war_oid }).await {
        Ok(Some(w)) => w,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "War not found", None),
        Err(e) => return app_error_response(&e),
    };

    if war.defender_id != user_id {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only the challenged user can decline",
            Some("NOT_DEFENDER"),
        );
    }

    if !war.status.can_transition(WarStatus::Declined) {
        return error_response(
            StatusCode::CONFLICT,
            &format!("Cannot decline a {} war", war.status),
            Some("ILLEGAL_TRANSITION"),
        );
    }

    let updated = match wars_collection
        .update_one(
            doc! { "_id": war_oid, "status": "pending" },
            doc! {
                "$set": {
                    "status": "declined",
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
            "War is no longer pending",
            Some("ILLEGAL_TRANSITION"),
        );
    }

    // Give the challenger their escrow back
    if let Err(e) = ledger::credit(
        mongo,
        war.challenger_id,
        war.wager_coins,
        TransactionKind::Refund,
        "War declined - wager refunded",
    )
    .await
    {
        return app_error_response(&e);
    }

    state
        .activity
        .log(
            state
                .activity
                .event(EventType::WarDeclined)
                .with_user(user_id.to_hex())
                .with_subject(war_oid.to_hex()),
        )
        .await;

    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "success": true,
            "warId": war_oid.to_hex(),
            "status": "declined",
        }),
    )
}

/// POST /api/wars/{id}/complete
///
/// Settles an accepted war after its challenge has ended. Winner is the
/// side with more challenge points; a tie refunds both escrows.
async fn handle_complete(
    req: Request<Incoming>,
    state: Arc<AppState>,
    war_id: &str,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let war_oid = match parse_object_id(war_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let wars_collection = match mongo.collection::<WarDoc>(WAR_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let war = match wars_collection.find_one(doc! { "_id": war_oid }).await {
        Ok(Some(w)) => w,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "War not found", None),
        Err(e) => return app_error_response(&e),
    };

    if war.challenger_id != user_id && war.defender_id != user_id {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only a war participant can settle it",
            Some("NOT_A_PARTY"),
        );
    }

    if !war.status.can_transition(WarStatus::Completed) {
        return error_response(
            StatusCode::CONFLICT,
            &format!("Cannot complete a {} war", war.status),
            Some("ILLEGAL_TRANSITION"),
        );
    }

    let challenges = match mongo.collection::<ChallengeDoc>(CHALLENGE_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };
    let challenge = match challenges.find_one(doc! { "_id": war.challenge_id }).await {
        Ok(Some(c)) => c,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Challenge not found", None),
        Err(e) => return app_error_response(&e),
    };

    if !challenge.has_ended(DateTime::now()) {
        return error_response(
            StatusCode::CONFLICT,
            "The challenge is still running",
            Some("CHALLENGE_RUNNING"),
        );
    }

    let challenger_points =
        match participant_points(mongo, war.challenge_id, war.challenger_id).await {
            Ok(p) => p,
            Err(e) => return app_error_response(&e),
        };
    let defender_points = match participant_points(mongo, war.challenge_id, war.defender_id).await
    {
        Ok(p) => p,
        Err(e) => return app_error_response(&e),
    };

    let settlement = Settlement::decide(challenger_points, defender_points);
    let (challenger_payout, defender_payout) = settlement.payouts(war.wager_coins);
    let winner_id = match settlement {
        Settlement::ChallengerWins => Some(war.challenger_id),
        Settlement::DefenderWins => Some(war.defender_id),
        Settlement::Tie => None,
    };

    let mut set = doc! {
        "status": "completed",
        "completed_at": DateTime::now(),
        "sabotage_active": false,
        "metadata.updated_at": DateTime::now(),
    };
    if let Some(winner) = winner_id {
        set.insert("winner_id", winner);
    }

    let updated = match wars_collection
        .update_one(doc! { "_id": war_oid, "status": "accepted" }, doc! { "$set": set })
        .await
    {
        Ok(r) => r,
        Err(e) => return app_error_response(&e),
    };

    if updated.modified_count == 0 {
        return error_response(
            StatusCode::CONFLICT,
            "War is no longer accepted",
            Some("ILLEGAL_TRANSITION"),
        );
    }

    // Release escrow exactly once, per the guarded transition above
    for (party, payout) in [
        (war.challenger_id, challenger_payout),
        (war.defender_id, defender_payout),
    ] {
        if payout == 0 {
            continue;
        }
        let (kind, description) = if settlement == Settlement::Tie {
            (TransactionKind::Refund, "War tied - wager refunded")
        } else {
            (TransactionKind::Payout, "War won - wager payout")
        };
        if let Err(e) = ledger::credit(mongo, party, payout, kind, description).await {
            return app_error_response(&e);
        }
    }

    // A humiliation line for the loser, when there is one
    let flavor_line = match winner_id {
        Some(winner) => {
            let loser = if winner == war.challenger_id {
                war.defender_id
            } else {
                war.challenger_id
            };
            match lookup_user(mongo, loser).await {
                Ok((loser_name, _)) => {
                    let (line, _) = state
                        .flavor
                        .generate(FlavorStyle::Humiliation, &loser_name, None)
                        .await;
                    Some(line)
                }
                Err(_) => None,
            }
        }
        None => None,
    };

    state
        .activity
        .log(
            state
                .activity
                .event(EventType::WarCompleted)
                .with_user(user_id.to_hex())
                .with_subject(war_oid.to_hex())
                .with_coins(war.wager_coins * 2)
                .with_metadata(serde_json::json!({
                    "challengerPoints": challenger_points,
                    "defenderPoints": defender_points,
                })),
        )
        .await;

    let mut settled = war.clone();
    settled.status = WarStatus::Completed;
    settled.winner_id = winner_id;
    json_response(
        StatusCode::OK,
        &war_to_response(&settled, Some(war_oid), flavor_line),
    )
}

/// GET /api/wars/{id}/sabotage/challenges
async fn handle_sabotage_catalog(
    req: Request<Incoming>,
    state: Arc<AppState>,
    war_id: &str,
) -> Response<FullBody> {
    if let Err(resp) = require_auth(&req, &state) {
        return resp;
    }
    if let Err(resp) = parse_object_id(war_id) {
        return resp;
    }

    let to_catalog = |tasks: &'static [sabotage::SabotageTask]| {
        tasks
            .iter()
            .map(|t| CatalogTask {
                id: t.id,
                title: t.title,
                power: t.power,
            })
            .collect::<Vec<_>>()
    };

    json_response(
        StatusCode::OK,
        &SabotageCatalogResponse {
            power_tasks: to_catalog(wars::power_catalog()),
            escape_tasks: to_catalog(wars::escape_catalog()),
            activation_threshold: wars::ACTIVATION_THRESHOLD,
            escape_tasks_required: wars::ESCAPE_TASKS_REQUIRED,
        },
    )
}

/// POST /api/wars/{id}/sabotage/complete
///
/// Challenger logs a side-challenge; its power lands in the war's pool.
async fn handle_sabotage_complete(
    req: Request<Incoming>,
    state: Arc<AppState>,
    war_id: &str,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let war_oid = match parse_object_id(war_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let body: SabotageTaskRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    let task = match wars::find_task(&body.task_id) {
        Some(t) if !wars::is_escape_task(t.id) => t,
        Some(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Escape tasks are logged through the escape endpoint",
                Some("WRONG_ENDPOINT"),
            )
        }
        None => {
            return error_response(
                StatusCode::NOT_FOUND,
                "Unknown sabotage task",
                Some("UNKNOWN_TASK"),
            )
        }
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let wars_collection = match mongo.collection::<WarDoc>(WAR_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let war = match wars_collection.find_one(doc! { "_id": war_oid }).await {
        Ok(Some(w)) => w,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "War not found", None),
        Err(e) => return app_error_response(&e),
    };

    if war.challenger_id != user_id {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only the challenger accrues sabotage power",
            Some("NOT_CHALLENGER"),
        );
    }

    if war.status != WarStatus::Accepted {
        return error_response(
            StatusCode::CONFLICT,
            "Sabotage power can only be accrued in an accepted war",
            Some("WAR_NOT_LIVE"),
        );
    }

    let completions = match mongo
        .collection::<SabotageCompletionDoc>(SABOTAGE_COMPLETION_COLLECTION)
        .await
    {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let mut completion = SabotageCompletionDoc::new(war_oid, user_id, task.id.to_string(), task.power);
    completion.proof_text = body.proof_text;

    match completions.insert_one(completion).await {
        Ok(_) => {}
        Err(AppError::Conflict(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "Task already logged for this war",
                Some("TASK_ALREADY_LOGGED"),
            )
        }
        Err(e) => return app_error_response(&e),
    }

    if let Err(e) = wars_collection
        .update_one(
            doc! { "_id": war_oid },
            doc! {
                "$inc": { "sabotage_power": task.power },
                "$set": { "metadata.updated_at": DateTime::now() },
            },
        )
        .await
    {
        return app_error_response(&e);
    }

    json_response(
        StatusCode::CREATED,
        &SabotagePoolResponse {
            war_id: war_oid.to_hex(),
            sabotage_power: war.sabotage_power + task.power,
            sabotage_active: war.sabotage_active,
            escape_tasks_done: war.escape_tasks_done,
        },
    )
}

/// POST /api/wars/{id}/sabotage/activate
///
/// Spends the pool: fails under 20 power, zeroes the pool on success, docks
/// the defender half the spent power.
async fn handle_sabotage_activate(
    req: Request<Incoming>,
    state: Arc<AppState>,
    war_id: &str,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let war_oid = match parse_object_id(war_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let wars_collection = match mongo.collection::<WarDoc>(WAR_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let war = match wars_collection.find_one(doc! { "_id": war_oid }).await {
        Ok(Some(w)) => w,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "War not found", None),
        Err(e) => return app_error_response(&e),
    };

    if war.challenger_id != user_id {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only the challenger can activate sabotage",
            Some("NOT_CHALLENGER"),
        );
    }

    if war.status != WarStatus::Accepted {
        return error_response(
            StatusCode::CONFLICT,
            "Sabotage can only be activated in an accepted war",
            Some("WAR_NOT_LIVE"),
        );
    }

    if war.sabotage_active {
        return error_response(
            StatusCode::CONFLICT,
            "A sabotage is already active",
            Some("SABOTAGE_ACTIVE"),
        );
    }

    let activation = match wars::activate(war.sabotage_power) {
        Some(a) => a,
        None => {
            return error_response(
                StatusCode::CONFLICT,
                &format!(
                    "Sabotage needs {} power; you have {}",
                    wars::ACTIVATION_THRESHOLD,
                    war.sabotage_power
                ),
                Some("INSUFFICIENT_POWER"),
            )
        }
    };

    // Pinning the pool value in the filter makes the spend atomic: a racing
    // accrual or double activation changes the pool and this matches nothing
    let updated = match wars_collection
        .update_one(
            doc! {
                "_id": war_oid,
                "status": "accepted",
                "sabotage_active": false,
                "sabotage_power": war.sabotage_power,
            },
            doc! {
                "$set": {
                    "sabotage_power": 0_i64,
                    "sabotage_active": true,
                    "sabotage_intensity": activation.intensity,
                    "escape_tasks_done": 0_i64,
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
            "Sabotage state changed - try again",
            Some("RETRY"),
        );
    }

    // Dock the defender, clamped at zero
    let users = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };
    let defender = match users.find_one(doc! { "_id": war.defender_id }).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Defender not found", None),
        Err(e) => return app_error_response(&e),
    };
    let penalty_applied = activation.penalty_points.min(defender.total_points.max(0));
    if penalty_applied > 0 {
        if let Err(e) = users
            .update_one(
                doc! { "_id": war.defender_id },
                doc! {
                    "$inc": { "total_points": -penalty_applied },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await
        {
            return app_error_response(&e);
        }
    }

    info!(
        "Sabotage activated on war {}: {} power spent, {} point penalty (intensity {})",
        war_oid, war.sabotage_power, penalty_applied, activation.intensity
    );

    state
        .activity
        .log(
            state
                .activity
                .event(EventType::SabotageActivated)
                .with_user(user_id.to_hex())
                .with_subject(war_oid.to_hex())
                .with_points(-penalty_applied)
                .with_metadata(serde_json::json!({
                    "powerSpent": war.sabotage_power,
                    "intensity": activation.intensity,
                })),
        )
        .await;

    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "success": true,
            "warId": war_oid.to_hex(),
            "powerSpent": war.sabotage_power,
            "penaltyPoints": penalty_applied,
            "intensity": activation.intensity,
        }),
    )
}

/// POST /api/wars/{id}/sabotage/escape
///
/// Defender logs an escape task; the third distinct one clears the sabotage.
async fn handle_sabotage_escape(
    req: Request<Incoming>,
    state: Arc<AppState>,
    war_id: &str,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let war_oid = match parse_object_id(war_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let body: SabotageTaskRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    if wars::find_task(&body.task_id).is_none() || !wars::is_escape_task(&body.task_id) {
        return error_response(
            StatusCode::NOT_FOUND,
            "Unknown escape task",
            Some("UNKNOWN_TASK"),
        );
    }

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let wars_collection = match mongo.collection::<WarDoc>(WAR_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let war = match wars_collection.find_one(doc! { "_id": war_oid }).await {
        Ok(Some(w)) => w,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "War not found", None),
        Err(e) => return app_error_response(&e),
    };

    if war.defender_id != user_id {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only the sabotaged defender logs escape tasks",
            Some("NOT_DEFENDER"),
        );
    }

    if war.status != WarStatus::Accepted || !war.sabotage_active {
        return error_response(
            StatusCode::CONFLICT,
            "No active sabotage to escape",
            Some("NO_SABOTAGE"),
        );
    }

    let completions = match mongo
        .collection::<SabotageCompletionDoc>(SABOTAGE_COMPLETION_COLLECTION)
        .await
    {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let mut completion = SabotageCompletionDoc::new(war_oid, user_id, body.task_id.clone(), 0);
    completion.proof_text = body.proof_text;

    // Distinctness is the unique index: the same escape task never counts
    // twice toward the threshold
    match completions.insert_one(completion).await {
        Ok(_) => {}
        Err(AppError::Conflict(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "Escape task already logged - complete a different one",
                Some("TASK_ALREADY_LOGGED"),
            )
        }
        Err(e) => return app_error_response(&e),
    }

    let updated = match wars_collection
        .update_one(
            doc! { "_id": war_oid, "sabotage_active": true },
            doc! {
                "$inc": { "escape_tasks_done": 1_i64 },
                "$set": { "metadata.updated_at": DateTime::now() },
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
            "No active sabotage to escape",
            Some("NO_SABOTAGE"),
        );
    }

    let escaped = wars::escape_clears(war.escape_tasks_done);
    if escaped {
        if let Err(e) = wars_collection
            .update_one(
                doc! { "_id": war_oid, "sabotage_active": true },
                doc! {
                    "$set": {
                        "sabotage_active": false,
                        "sabotage_intensity": 0_i64,
                        "escape_tasks_done": 0_i64,
                        "metadata.updated_at": DateTime::now(),
                    }
                },
            )
            .await
        {
            return app_error_response(&e);
        }

        info!("Defender escaped sabotage on war {}", war_oid);
        state
            .activity
            .log(
                state
                    .activity
                    .event(EventType::SabotageEscaped)
                    .with_user(user_id.to_hex())
                    .with_subject(war_oid.to_hex()),
            )
            .await;
    }

    json_response(
        StatusCode::CREATED,
        &serde_json::json!({
            "success": true,
            "warId": war_oid.to_hex(),
            "escaped": escaped,
            "escapeTasksDone": if escaped { 0 } else { war.escape_tasks_done + 1 },
            "escapeTasksRequired": wars::ESCAPE_TASKS_REQUIRED,
        }),
    )
}

// =============================================================================
// Helpers
// =============================================================================

fn war_to_response(war: &WarDoc, id: Option<ObjectId>, flavor_line: Option<String>) -> WarResponse {
    WarResponse {
        id: id.map(|i| i.to_hex()).unwrap_or_default(),
        challenge_id: war.challenge_id.to_hex(),
        challenger_id: war.challenger_id.to_hex(),
        defender_id: war.defender_id.to_hex(),
        wager_coins: war.wager_coins,
        status: war.status,
        expires_at: war.expires_at.try_to_rfc3339_string().unwrap_or_default(),
        sabotage_power: war.sabotage_power,
        sabotage_active: war.sabotage_active,
        sabotage_intensity: war.sabotage_intensity,
        escape_tasks_done: war.escape_tasks_done,
        winner_id: war.winner_id.map(|w| w.to_hex()),
        flavor_line,
    }
}

async fn is_participant(
    mongo: &MongoClient,
    challenge_id: ObjectId,
    user_id: ObjectId,
) -> Result<bool, AppError> {
    let participants = mongo
        .collection::<ChallengeParticipantDoc>(PARTICIPANT_COLLECTION)
        .await?;
    Ok(participants
        .find_one(doc! { "challenge_id": challenge_id, "user_id": user_id })
        .await?
        .is_some())
}

async fn participant_points(
    mongo: &MongoClient,
    challenge_id: ObjectId,
    user_id: ObjectId,
) -> Result<i64, AppError> {
    let participants = mongo
        .collection::<ChallengeParticipantDoc>(PARTICIPANT_COLLECTION)
        .await?;
    Ok(participants
        .find_one(doc! { "challenge_id": challenge_id, "user_id": user_id })
        .await?
        .map(|p| p.points)
        .unwrap_or(0))
}

/// Display name and, when the identifier is an email, the address
async fn lookup_user(
    mongo: &MongoClient,
    user_id: ObjectId,
) -> Result<(String, Option<String>), AppError> {
    let users = mongo.collection::<UserDoc>(USER_COLLECTION).await?;
    let user = users
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let email = if user.identifier_type == "email" {
        Some(user.identifier.clone())
    } else {
        None
    };

    Ok((user.display_name, email))
}

/// Flip a lapsed pending war to expired and refund the challenger.
/// Returns true when this call performed the flip.
async fn expire_war(
    mongo: &MongoClient,
    state: &AppState,
    war: &WarDoc,
) -> Result<bool, AppError> {
    let Some(war_id) = war._id else {
        return Ok(false);
    };

    let wars_collection = mongo.collection::<WarDoc>(WAR_COLLECTION).await?;
    let updated = wars_collection
        .update_one(
            doc! { "_id": war_id, "status": "pending" },
            doc! {
                "$set": {
                    "status": "expired",
                    "metadata.updated_at": DateTime::now(),
                }
            },
        )
        .await?;

    if updated.modified_count == 0 {
        return Ok(false);
    }

    ledger::credit(
        mongo,
        war.challenger_id,
        war.wager_coins,
        TransactionKind::Refund,
        "War expired unanswered - wager refunded",
    )
    .await?;

    state
        .activity
        .log(
            state
                .activity
                .event(EventType::WarExpired)
                .with_subject(war_id.to_hex())
                .with_coins(war.wager_coins),
        )
        .await;

    Ok(true)
}
