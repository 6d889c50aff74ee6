//! War invitation email via Resend
//!
//! Fire-and-forget: declaring a war spawns the send and the handler moves
//! on. Failures are logged, never surfaced to the declaring user.

use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use crate::types::{AppError, Result};

const RESEND_EMAIL_URL: &str = "https://api.resend.com/emails";

/// Resend transactional email client
pub struct MailerService {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
}

impl MailerService {
    pub fn new(api_key: Option<String>, from: String, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            from,
        }
    }

    /// Send a war invitation to the defender
    pub async fn send_war_invitation(
        &self,
        to: &str,
        challenger_name: &str,
        wager_coins: i64,
        window_hours: i64,
    ) -> Result<()> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Upstream("RESEND_API_KEY not configured".into()))?;

        let subject = format!("{challenger_name} has declared war on you!");
        let html = format!(
            "<p><strong>{challenger_name}</strong> challenged you to a habit war \
             with a wager of <strong>{wager_coins} coins</strong>.</p>\
             <p>You have {window_hours} hours to accept before the challenge expires.</p>"
        );

        let body = json!({
            "from": self.from,
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let response = self
            .client
            .post(RESEND_EMAIL_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Resend request failed: {e}")))?;

        if !response.status().is_success() {
            warn!("Resend returned {}", response.status());
            return Err(AppError::Upstream(format!(
                "Resend returned {}",
                response.status()
            )));
        }

        info!(to = %to, "War invitation email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_key_is_upstream_error() {
        let mailer = MailerService::new(None, "StreakWars <wars@example.com>".into(), 1000);
        let err = mailer
            .send_war_invitation("ada@example.com", "grace", 25, 24)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }
}
