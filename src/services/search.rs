//! Habit suggestions via Exa search
//!
//! Searches for habit ideas around a topic and boils the hits down to short
//! suggestion strings. Falls back to a static list on any failure.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

const EXA_SEARCH_URL: &str = "https://api.exa.ai/search";

/// Suggestions served when search is unavailable
const FALLBACK_SUGGESTIONS: &[&str] = &[
    "Drink a glass of water right after waking up",
    "Take a 10 minute walk after lunch",
    "Read 5 pages before bed",
    "Write down three things you are grateful for",
    "Stretch for 5 minutes in the morning",
];

#[derive(Debug, Deserialize)]
struct ExaResponse {
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
struct ExaResult {
    title: Option<String>,
}

/// Exa-backed habit suggestion search
pub struct SearchService {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl SearchService {
    pub fn new(api_key: Option<String>, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();

        Self { client, api_key }
    }

    /// Suggest habits around a topic. Never fails; `from_search` is false
    /// when the static fallback was served.
    pub async fn suggest_habits(&self, topic: &str) -> (Vec<String>, bool) {
        match self.search(topic).await {
            Ok(suggestions) if !suggestions.is_empty() => (suggestions, true),
            Ok(_) => (fallback(), false),
            Err(e) => {
                warn!("Habit suggestion search failed: {}", e);
                (fallback(), false)
            }
        }
    }

    async fn search(&self, topic: &str) -> Result<Vec<String>, String> {
        let api_key = self.api_key.as_deref().ok_or("EXA_API_KEY not configured")?;

        let body = json!({
            "query": format!("small daily habits for {topic}"),
            "numResults": 5,
        });

        let response = self
            .client
            .post(EXA_SEARCH_URL)
            .header("x-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("Exa returned {}", response.status()));
        }

        let parsed: ExaResponse = response
            .json()
            .await
            .map_err(|e| format!("Bad response body: {e}"))?;

        Ok(parsed
            .results
            .into_iter()
            .filter_map(|r| r.title)
            .filter(|t| !t.is_empty())
            .collect())
    }
}

fn fallback() -> Vec<String> {
    FALLBACK_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_suggest_without_key_falls_back() {
        let service = SearchService::new(None, 1000);
        let (suggestions, from_search) = service.suggest_habits("fitness").await;
        assert!(!from_search);
        assert_eq!(suggestions.len(), FALLBACK_SUGGESTIONS.len());
    }
}
