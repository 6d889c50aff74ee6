//! Flavor text endpoints
//!
//! ## Endpoints
//!
//! - `POST /api/flavor/taunt` - Generate a line (taunt/humiliation/joke/poem)
//! - `POST /api/flavor/speech` - Synthesize a line to base64 audio

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::routes::util::{
    app_error_response, error_response, json_response, parse_json_body, require_auth, FullBody,
};
use crate::server::AppState;
use crate::services::FlavorStyle;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TauntRequest {
    /// taunt | humiliation | joke | poem
    #[serde(default = "default_style")]
    pub style: String,
    /// Display name the line addresses
    pub target: String,
    #[serde(default)]
    pub context: Option<String>,
}

fn default_style() -> String {
    "taunt".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TauntResponse {
    pub style: String,
    pub line: String,
    /// False when the canned fallback was served
    pub generated: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechResponse {
    pub text: String,
    /// Base64-encoded MP3
    pub audio_base64: String,
}

/// Main handler for /api/flavor* routes
pub async fn handle_flavor_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/api/flavor").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "/taunt") => handle_taunt(req, state).await,
        (Method::POST, "/speech") => handle_speech(req, state).await,
        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}

/// POST /api/flavor/taunt
async fn handle_taunt(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    if let Err(resp) = require_auth(&req, &state) {
        return resp;
    }

    let body: TauntRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    let style = match FlavorStyle::parse(&body.style) {
        Some(s) => s,
        None => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Style must be one of: taunt, humiliation, joke, poem",
                Some("UNKNOWN_STYLE"),
            )
        }
    };

    if body.target.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Target name is required", None);
    }

    let (line, generated) = state
        .flavor
        .generate(style, body.target.trim(), body.context.as_deref())
        .await;

    json_response(
        StatusCode::OK,
        &TauntResponse {
            style: body.style,
            line,
            generated,
        },
    )
}

/// POST /api/flavor/speech
async fn handle_speech(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    if let Err(resp) = require_auth(&req, &state) {
        return resp;
    }

    let body: SpeechRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    if body.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Text is required", None);
    }
    if body.text.len() > 500 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Text must be 500 characters or fewer",
            None,
        );
    }

    match state.speech.synthesize(body.text.trim()).await {
        Ok(audio_base64) => json_response(
            StatusCode::OK,
            &SpeechResponse {
                text: body.text,
                audio_base64,
            },
        ),
        Err(e) => app_error_response(&e),
    }
}
