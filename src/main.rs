//! StreakWars - social habit tracking service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streakwars::{
    config::Args,
    db::MongoClient,
    server,
    services::spawn_war_expiry_task,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("streakwars={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  StreakWars - habit wars service");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.mongodb_uri);
    info!("War acceptance window: {}h", args.war_accept_window_hours);
    info!(
        "Integrations: groq={}, exa={}, elevenlabs={}, resend={}",
        args.groq_api_key.is_some(),
        args.exa_api_key.is_some(),
        args.elevenlabs_api_key.is_some(),
        args.resend_api_key.is_some(),
    );
    info!("======================================");

    // Connect to MongoDB (optional in dev mode)
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, continuing without): {}", e);
                None
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    // Create application state
    let state = Arc::new(server::AppState::new(args.clone(), mongo));

    // Initialize the activity log file if configured
    if let Some(ref path) = args.activity_log_path {
        if let Err(e) = state.activity.init_file(path.clone()).await {
            warn!("Activity log initialization failed: {}", e);
        }
    }

    // Start the war expiry sweep (needs MongoDB)
    let _expiry_handle = match state.mongo {
        Some(ref mongo) => {
            let handle = spawn_war_expiry_task(
                mongo.clone(),
                state.activity.clone(),
                args.war_expiry_sweep_secs,
            );
            info!(
                "War expiry sweep started (every {}s)",
                args.war_expiry_sweep_secs
            );
            Some(handle)
        }
        None => {
            warn!("War expiry sweep not started (no MongoDB)");
            None
        }
    };

    // Run the server
    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
