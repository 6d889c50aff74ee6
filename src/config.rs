//! Configuration for StreakWars
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use uuid::Uuid;

/// StreakWars - social habit tracking service
///
/// Habits, monthly challenges, friendships, and wagered 1v1 habit wars
/// with a sabotage/escape mechanic.
#[derive(Parser, Debug, Clone)]
#[command(name = "streakwars")]
#[command(about = "Social habit tracking service with wagered habit wars")]
pub struct Args {
    /// Unique node identifier for this service instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "streakwars")]
    pub mongodb_db: String,

    /// Enable development mode (MongoDB optional, insecure JWT fallback)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Hours a declared war stays open for acceptance
    #[arg(long, env = "WAR_ACCEPT_WINDOW_HOURS", default_value = "24")]
    pub war_accept_window_hours: i64,

    /// Interval in seconds between sweeps for expired pending wars
    #[arg(long, env = "WAR_EXPIRY_SWEEP_SECS", default_value = "60")]
    pub war_expiry_sweep_secs: u64,

    /// Groq API key for flavor text generation (taunts, humiliation lines)
    #[arg(long, env = "GROQ_API_KEY")]
    pub groq_api_key: Option<String>,

    /// Groq chat model
    #[arg(long, env = "GROQ_MODEL", default_value = "llama-3.3-70b-versatile")]
    pub groq_model: String,

    /// Exa API key for habit suggestion search
    #[arg(long, env = "EXA_API_KEY")]
    pub exa_api_key: Option<String>,

    /// ElevenLabs API key for taunt text-to-speech
    #[arg(long, env = "ELEVENLABS_API_KEY")]
    pub elevenlabs_api_key: Option<String>,

    /// ElevenLabs voice ID
    #[arg(long, env = "ELEVENLABS_VOICE_ID", default_value = "21m00Tcm4TlvDq8ikWAM")]
    pub elevenlabs_voice_id: String,

    /// Resend API key for war invitation emails
    #[arg(long, env = "RESEND_API_KEY")]
    pub resend_api_key: Option<String>,

    /// From address for outbound email
    #[arg(long, env = "EMAIL_FROM", default_value = "StreakWars <wars@streakwars.app>")]
    pub email_from: String,

    /// Path for the JSONL activity event log (disabled when unset)
    #[arg(long, env = "ACTIVITY_LOG_PATH")]
    pub activity_log_path: Option<PathBuf>,

    /// Request timeout in milliseconds for outbound HTTP calls
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> String {
        if self.dev_mode {
            self.jwt_secret
                .clone()
                .unwrap_or_else(|| "dev-only-insecure-secret".to_string())
        } else {
            self.jwt_secret
                .clone()
                .expect("JWT_SECRET is required in production mode")
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.war_accept_window_hours < 1 {
            return Err("WAR_ACCEPT_WINDOW_HOURS must be at least 1".to_string());
        }

        if self.war_expiry_sweep_secs == 0 {
            return Err("WAR_EXPIRY_SWEEP_SECS must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["streakwars", "--dev-mode", "true"])
    }

    #[test]
    fn test_dev_mode_defaults() {
        let args = base_args();
        assert!(args.dev_mode);
        assert_eq!(args.war_accept_window_hours, 24);
        assert_eq!(args.jwt_secret(), "dev-only-insecure-secret");
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_production_requires_jwt_secret() {
        let args = Args::parse_from(["streakwars"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["streakwars", "--jwt-secret", "s3cret"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_acceptance_window() {
        let args = Args::parse_from([
            "streakwars",
            "--dev-mode",
            "true",
            "--war-accept-window-hours",
            "0",
        ]);
        assert!(args.validate().is_err());
    }
}
