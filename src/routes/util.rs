//! Shared helpers for route handlers: JSON responses, body parsing, and
//! JWT extraction

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::auth::{extract_token_from_header, Claims, JwtValidator};
use crate::db::MongoClient;
use crate::server::AppState;
use crate::types::AppError;

pub type FullBody = Full<Bytes>;

/// Error payload shape shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Success payload for operations with nothing else to return
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

pub fn error_response(status: StatusCode, error: &str, code: Option<&str>) -> Response<FullBody> {
    json_response(
        status,
        &ErrorResponse {
            error: error.to_string(),
            code: code.map(|c| c.to_string()),
        },
    )
}

/// Map an `AppError` to its response
pub fn app_error_response(err: &AppError) -> Response<FullBody> {
    error_response(err.status_code(), &err.to_string(), Some(err.code()))
}

/// Read and deserialize a JSON request body (capped at 10 KiB)
pub async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<Incoming>,
) -> Result<T, AppError> {
    let body = req
        .collect()
        .await
        .map_err(|e| AppError::Http(format!("Failed to read body: {}", e)))?;

    let bytes = body.to_bytes();
    if bytes.len() > 10240 {
        return Err(AppError::Http("Request body too large".into()));
    }

    serde_json::from_slice(&bytes).map_err(|e| AppError::Http(format!("Invalid JSON: {}", e)))
}

pub fn get_auth_header(req: &Request<Incoming>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

#[allow(clippy::result_large_err)]
pub fn get_jwt_validator(state: &AppState) -> Result<JwtValidator, Response<FullBody>> {
    if state.args.dev_mode {
        match &state.args.jwt_secret {
            Some(secret) => {
                JwtValidator::new(secret.clone(), state.args.jwt_expiry_seconds).map_err(|e| {
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &format!("JWT config error: {e}"),
                        Some("JWT_CONFIG_ERROR"),
                    )
                })
            }
            None => Ok(JwtValidator::new_dev()),
        }
    } else {
        match &state.args.jwt_secret {
            Some(secret) => {
                JwtValidator::new(secret.clone(), state.args.jwt_expiry_seconds).map_err(|e| {
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &format!("JWT config error: {e}"),
                        Some("JWT_CONFIG_ERROR"),
                    )
                })
            }
            None => Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "JWT secret not configured",
                Some("JWT_CONFIG_ERROR"),
            )),
        }
    }
}

/// Validate the bearer token and return its claims
#[allow(clippy::result_large_err)]
pub fn require_auth(
    req: &Request<Incoming>,
    state: &AppState,
) -> Result<Claims, Response<FullBody>> {
    let auth_header = get_auth_header(req);
    let token = match extract_token_from_header(auth_header) {
        Some(t) => t,
        None => {
            return Err(error_response(
                StatusCode::UNAUTHORIZED,
                "No token provided",
                Some("NO_TOKEN"),
            ))
        }
    };

    let jwt = get_jwt_validator(state)?;
    let result = jwt.verify_token(token);

    match result.claims {
        Some(claims) if result.valid => Ok(claims),
        _ => Err(error_response(
            StatusCode::UNAUTHORIZED,
            result.error.as_deref().unwrap_or("Invalid token"),
            Some("INVALID_TOKEN"),
        )),
    }
}

/// The calling user's ObjectId from verified claims
#[allow(clippy::result_large_err)]
pub fn claims_user_id(claims: &Claims) -> Result<ObjectId, Response<FullBody>> {
    ObjectId::parse_str(&claims.sub).map_err(|_| {
        error_response(
            StatusCode::UNAUTHORIZED,
            "Malformed subject in token",
            Some("INVALID_TOKEN"),
        )
    })
}

/// MongoDB handle or a 503
#[allow(clippy::result_large_err)]
pub fn require_mongo(state: &AppState) -> Result<&MongoClient, Response<FullBody>> {
    state.mongo.as_ref().ok_or_else(|| {
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Database not available",
            Some("DB_UNAVAILABLE"),
        )
    })
}

/// Parse a path segment as an ObjectId or return a 400
#[allow(clippy::result_large_err)]
pub fn parse_object_id(raw: &str) -> Result<ObjectId, Response<FullBody>> {
    ObjectId::parse_str(raw)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid ID", Some("INVALID_ID")))
}

/// Pull one value out of a raw query string
pub fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    let q = query?;
    for pair in q.split('&') {
        if let Some((k, value)) = pair.split_once('=') {
            if k == key {
                return urlencoding::decode(value).ok().map(|v| v.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param() {
        let q = Some("topic=morning%20routine&active=true");
        assert_eq!(
            query_param(q, "topic"),
            Some("morning routine".to_string())
        );
        assert_eq!(query_param(q, "active"), Some("true".to_string()));
        assert_eq!(query_param(q, "missing"), None);
        assert_eq!(query_param(None, "topic"), None);
    }

    #[test]
    fn test_parse_object_id() {
        assert!(parse_object_id("5f1d7f3e2e8b4c0012345678").is_ok());
        assert!(parse_object_id("nope").is_err());
    }
}
