//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling; routing is a match
//! over (method, path) with feature modules handling their own subtrees.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Args;
use crate::db::MongoClient;
use crate::logging::ActivityLogger;
use crate::routes;
use crate::services::{FlavorService, MailerService, SearchService, SpeechService};
use crate::types::AppError;

type FullBody = Full<Bytes>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub mongo: Option<MongoClient>,
    /// Groq-backed flavor text generation
    pub flavor: FlavorService,
    /// ElevenLabs text-to-speech
    pub speech: SpeechService,
    /// Exa habit suggestion search
    pub search: SearchService,
    /// Resend war invitation email
    pub mailer: Arc<MailerService>,
    /// JSONL activity event log
    pub activity: ActivityLogger,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create application state from configuration
    pub fn new(args: Args, mongo: Option<MongoClient>) -> Self {
        let flavor = FlavorService::new(
            args.groq_api_key.clone(),
            args.groq_model.clone(),
            args.request_timeout_ms,
        );
        let speech = SpeechService::new(
            args.elevenlabs_api_key.clone(),
            args.elevenlabs_voice_id.clone(),
            args.request_timeout_ms,
        );
        let search = SearchService::new(args.exa_api_key.clone(), args.request_timeout_ms);
        let mailer = Arc::new(MailerService::new(
            args.resend_api_key.clone(),
            args.email_from.clone(),
            args.request_timeout_ms,
        ));
        let activity = ActivityLogger::new(args.node_id.to_string());

        Self {
            args,
            mongo,
            flavor,
            speech,
            search,
            mailer,
            activity,
            started_at: Instant::now(),
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), AppError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "StreakWars listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - MongoDB optional, insecure JWT fallback");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<FullBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("{} {}", method, path);

    // Auth routes consume the request
    if path.starts_with("/auth") {
        if let Some(response) = routes::handle_auth_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(not_found_response(&path));
    }

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Readiness probe
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state))
        }

        // Version info for deployment verification
        (Method::GET, "/version") => routes::version_info(),

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        // Feature subtrees
        (_, p) if p.starts_with("/api/habits") => {
            routes::handle_habits_request(req, Arc::clone(&state), p).await
        }
        (_, p) if p.starts_with("/api/challenges") => {
            routes::handle_challenges_request(req, Arc::clone(&state), p).await
        }
        (_, p) if p.starts_with("/api/wars") => {
            routes::handle_wars_request(req, Arc::clone(&state), p).await
        }
        (_, p) if p.starts_with("/api/friends") => {
            routes::handle_friends_request(req, Arc::clone(&state), p).await
        }
        (_, p) if p.starts_with("/api/groups") => {
            routes::handle_groups_request(req, Arc::clone(&state), p).await
        }
        (_, p) if p.starts_with("/api/rewards") => {
            routes::handle_rewards_request(req, Arc::clone(&state), p).await
        }
        (_, p) if p.starts_with("/api/users") || p == "/api/leaderboard" => {
            routes::handle_users_request(req, Arc::clone(&state), p).await
        }
        (_, p) if p.starts_with("/api/flavor") => {
            routes::handle_flavor_request(req, Arc::clone(&state), p).await
        }

        // Not found
        _ => not_found_response(&path),
    };

    Ok(response)
}

/// CORS preflight response
fn preflight_response() -> Response<FullBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<FullBody> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
