//! HTTP routes for authentication
//!
//! - POST /auth/register - Create an account and get a JWT
//! - POST /auth/login    - Authenticate and get a JWT
//! - POST /auth/refresh  - Re-issue a token when the version still matches
//! - GET  /auth/me       - Current user info from token

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password};
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::logging::EventType;
use crate::routes::util::{
    app_error_response, claims_user_id, error_response, get_jwt_validator, json_response,
    parse_json_body, require_auth, require_mongo, ErrorResponse, FullBody,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub identifier: String,
    pub password: String,
    #[serde(default = "default_identifier_type")]
    pub identifier_type: String,
    /// Display name; defaults to the local part of an email identifier
    #[serde(default)]
    pub display_name: String,
}

fn default_identifier_type() -> String {
    "email".to_string()
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    pub identifier: String,
    pub display_name: String,
    pub expires_at: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub identifier: String,
    pub display_name: String,
    pub avatar_emoji: String,
    pub total_points: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub coin_balance: i64,
    pub permission_level: String,
}

/// Dispatch /auth/* requests. Returns None for paths outside /auth.
pub async fn handle_auth_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<FullBody>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str()) {
        (Method::POST, "/auth/register") => handle_register(req, state).await,
        (Method::POST, "/auth/login") => handle_login(req, state).await,
        (Method::POST, "/auth/refresh") => handle_refresh(req, state).await,
        (Method::GET, "/auth/me") => handle_me(req, state).await,
        _ => return None,
    };

    Some(response)
}

/// POST /auth/register
async fn handle_register(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let body: RegisterRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    if body.identifier.is_empty() || body.password.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: identifier, password",
            None,
        );
    }

    if body.password.len() < 8 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters",
            Some("WEAK_PASSWORD"),
        );
    }

    let display_name = if body.display_name.is_empty() {
        body.identifier
            .split('@')
            .next()
            .unwrap_or("User")
            .to_string()
    } else {
        body.display_name.clone()
    };

    let jwt = match get_jwt_validator(&state) {
        Ok(j) => j,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let collection = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    // Reject duplicate identifiers up front; the unique index still backs
    // this against concurrent registration
    match collection
        .find_one(doc! { "identifier": &body.identifier })
        .await
    {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "Identifier already registered",
                Some("DUPLICATE_IDENTIFIER"),
            )
        }
        Ok(None) => {}
        Err(e) => return app_error_response(&e),
    }

    let password_hash = match hash_password(&body.password) {
        Ok(h) => h,
        Err(e) => return app_error_response(&e),
    };

    let user = UserDoc::new(
        body.identifier.clone(),
        body.identifier_type.clone(),
        password_hash,
        display_name.clone(),
    );
    let permission_level = user.permission_level;

    let user_id = match collection.insert_one(user).await {
        Ok(id) => id,
        Err(e) => return app_error_response(&e),
    };

    info!("Registered user {} ({})", body.identifier, user_id);
    state
        .activity
        .log(
            state
                .activity
                .event(EventType::AuthAttempt)
                .with_user(user_id.to_hex())
                .with_metadata(serde_json::json!({ "kind": "register", "success": true })),
        )
        .await;

    let (token, expires_at) =
        match jwt.issue_token(&user_id.to_hex(), &body.identifier, permission_level, 1) {
            Ok(t) => t,
            Err(e) => return app_error_response(&e),
        };

    json_response(
        StatusCode::CREATED,
        &AuthResponse {
            token,
            user_id: user_id.to_hex(),
            identifier: body.identifier,
            display_name,
            expires_at,
        },
    )
}

/// POST /auth/login
async fn handle_login(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let body: LoginRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    let jwt = match get_jwt_validator(&state) {
        Ok(j) => j,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let collection = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let user = match collection
        .find_one(doc! { "identifier": &body.identifier })
        .await
    {
        Ok(Some(u)) => u,
        Ok(None) => {
            // Same message as a bad password; do not leak which part failed
            return invalid_credentials();
        }
        Err(e) => return app_error_response(&e),
    };

    let password_ok = match verify_password(&body.password, &user.password_hash) {
        Ok(ok) => ok,
        Err(e) => return app_error_response(&e),
    };

    if !password_ok {
        warn!("Failed login attempt for {}", body.identifier);
        state
            .activity
            .log(
                state
                    .activity
                    .event(EventType::AuthAttempt)
                    .with_metadata(serde_json::json!({ "kind": "login", "success": false })),
            )
            .await;
        return invalid_credentials();
    }

    if !user.is_active {
        return error_response(
            StatusCode::FORBIDDEN,
            "Account is deactivated",
            Some("ACCOUNT_INACTIVE"),
        );
    }

    let user_id = match user._id {
        Some(id) => id,
        None => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "User record missing ID",
                Some("DB_ERROR"),
            )
        }
    };

    let (token, expires_at) = match jwt.issue_token(
        &user_id.to_hex(),
        &user.identifier,
        user.permission_level,
        user.token_version,
    ) {
        Ok(t) => t,
        Err(e) => return app_error_response(&e),
    };

    state
        .activity
        .log(
            state
                .activity
                .event(EventType::AuthAttempt)
                .with_user(user_id.to_hex())
                .with_metadata(serde_json::json!({ "kind": "login", "success": true })),
        )
        .await;

    json_response(
        StatusCode::OK,
        &AuthResponse {
            token,
            user_id: user_id.to_hex(),
            identifier: user.identifier,
            display_name: user.display_name,
            expires_at,
        },
    )
}

/// POST /auth/refresh
///
/// Re-issues a token only when the stored token_version still matches the
/// claims; bumping the version on the user record invalidates refresh.
async fn handle_refresh(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let user_oid = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let jwt = match get_jwt_validator(&state) {
        Ok(j) => j,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let collection = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let user = match collection.find_one(doc! { "_id": user_oid }).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "User not found", None),
        Err(e) => return app_error_response(&e),
    };

    if !user.is_active {
        return error_response(
            StatusCode::FORBIDDEN,
            "Account is deactivated",
            Some("ACCOUNT_INACTIVE"),
        );
    }

    if user.token_version != claims.token_version {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "Token has been invalidated",
            Some("TOKEN_REVOKED"),
        );
    }

    let (token, expires_at) = match jwt.issue_token(
        &claims.sub,
        &user.identifier,
        user.permission_level,
        user.token_version,
    ) {
        Ok(t) => t,
        Err(e) => return app_error_response(&e),
    };

    json_response(
        StatusCode::OK,
        &AuthResponse {
            token,
            user_id: claims.sub,
            identifier: user.identifier,
            display_name: user.display_name,
            expires_at,
        },
    )
}

/// GET /auth/me
async fn handle_me(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let user_oid = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let collection = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let user = match collection.find_one(doc! { "_id": user_oid }).await {
        Ok(Some(u)) => u,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "User not found", None),
        Err(e) => return app_error_response(&e),
    };

    json_response(
        StatusCode::OK,
        &MeResponse {
            user_id: claims.sub,
            identifier: user.identifier,
            display_name: user.display_name,
            avatar_emoji: user.avatar_emoji,
            total_points: user.total_points,
            current_streak: user.current_streak,
            longest_streak: user.longest_streak,
            coin_balance: user.coin_balance,
            permission_level: user.permission_level.to_string(),
        },
    )
}

fn invalid_credentials() -> Response<FullBody> {
    json_response(
        StatusCode::UNAUTHORIZED,
        &ErrorResponse {
            error: "Invalid identifier or password".to_string(),
            code: Some("INVALID_CREDENTIALS".to_string()),
        },
    )
}
