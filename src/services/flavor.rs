//! Flavor text generation via Groq chat completions
//!
//! Taunts, humiliation lines, jokes, and poems for war banter. Every call
//! degrades to a canned line on any failure - missing key, HTTP error,
//! malformed response - so gameplay never blocks on the LLM.

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// How long a generated line is reused for the same (style, target) pair
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Style of line to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlavorStyle {
    Taunt,
    Humiliation,
    Joke,
    Poem,
}

impl FlavorStyle {
    /// Parse from the request's style string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "taunt" => Some(FlavorStyle::Taunt),
            "humiliation" => Some(FlavorStyle::Humiliation),
            "joke" => Some(FlavorStyle::Joke),
            "poem" => Some(FlavorStyle::Poem),
            _ => None,
        }
    }

    fn system_prompt(self) -> &'static str {
        match self {
            FlavorStyle::Taunt => {
                "You write short, playful trash-talk for a habit-tracking game. \
                 One sentence, PG-rated, no hashtags."
            }
            FlavorStyle::Humiliation => {
                "You write a mock-dramatic one-liner announcing that someone lost \
                 a habit war. Theatrical, harmless, one sentence."
            }
            FlavorStyle::Joke => {
                "You write a one-line joke about struggling to keep a habit. \
                 Light and friendly."
            }
            FlavorStyle::Poem => {
                "You write a two-line rhyming couplet celebrating a habit streak."
            }
        }
    }

    /// Canned line used when generation is unavailable
    pub fn fallback(self, target: &str) -> String {
        match self {
            FlavorStyle::Taunt => {
                format!("{target}, your streak is about as sturdy as a wet paper straw.")
            }
            FlavorStyle::Humiliation => format!(
                "Let the record show: {target} has been defeated, and the group chat will remember."
            ),
            FlavorStyle::Joke => {
                "I have a gym habit: I habitually think about going.".to_string()
            }
            FlavorStyle::Poem => {
                "Day after day the checkmarks grow,\nthe laziest rival bows down low.".to_string()
            }
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            FlavorStyle::Taunt => "taunt",
            FlavorStyle::Humiliation => "humiliation",
            FlavorStyle::Joke => "joke",
            FlavorStyle::Poem => "poem",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

struct CachedLine {
    text: String,
    cached_at: Instant,
}

/// Groq-backed flavor text generator with an in-memory TTL cache
pub struct FlavorService {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    cache: DashMap<String, CachedLine>,
}

impl FlavorService {
    pub fn new(api_key: Option<String>, model: String, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            model,
            cache: DashMap::new(),
        }
    }

    /// Generate a line. Never fails; `generated` is false when the fallback
    /// was used.
    pub async fn generate(
        &self,
        style: FlavorStyle,
        target: &str,
        context: Option<&str>,
    ) -> (String, bool) {
        let cache_key = format!("{}:{}", style.as_str(), target);

        if let Some(hit) = self.cache.get(&cache_key) {
            if hit.cached_at.elapsed() < CACHE_TTL {
                debug!(style = style.as_str(), "Flavor cache hit");
                return (hit.text.clone(), true);
            }
        }

        match self.call_groq(style, target, context).await {
            Ok(text) => {
                self.cache.insert(
                    cache_key,
                    CachedLine {
                        text: text.clone(),
                        cached_at: Instant::now(),
                    },
                );
                (text, true)
            }
            Err(e) => {
                warn!(style = style.as_str(), "Flavor generation failed: {}", e);
                (style.fallback(target), false)
            }
        }
    }

    async fn call_groq(
        &self,
        style: FlavorStyle,
        target: &str,
        context: Option<&str>,
    ) -> Result<String, String> {
        let api_key = self.api_key.as_deref().ok_or("GROQ_API_KEY not configured")?;

        let mut user_prompt = format!("Write one for a player named {target}.");
        if let Some(ctx) = context {
            user_prompt.push_str(&format!(" Context: {ctx}"));
        }

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": style.system_prompt() },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": 0.9,
            "max_tokens": 120,
        });

        let response = self
            .client
            .post(GROQ_CHAT_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("Groq returned {}", response.status()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("Bad response body: {e}"))?;

        let text = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or("Empty completion")?;

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_parsing() {
        assert_eq!(FlavorStyle::parse("taunt"), Some(FlavorStyle::Taunt));
        assert_eq!(FlavorStyle::parse("POEM"), Some(FlavorStyle::Poem));
        assert_eq!(FlavorStyle::parse("sonnet"), None);
    }

    #[test]
    fn test_fallbacks_mention_target_where_personal() {
        assert!(FlavorStyle::Taunt.fallback("ada").contains("ada"));
        assert!(FlavorStyle::Humiliation.fallback("ada").contains("ada"));
        // Jokes and poems are impersonal
        assert!(!FlavorStyle::Joke.fallback("ada").is_empty());
        assert!(!FlavorStyle::Poem.fallback("ada").is_empty());
    }

    #[tokio::test]
    async fn test_generate_without_key_falls_back() {
        let service = FlavorService::new(None, "llama-3.3-70b-versatile".into(), 1000);
        let (line, generated) = service.generate(FlavorStyle::Taunt, "ada", None).await;
        assert!(!generated);
        assert_eq!(line, FlavorStyle::Taunt.fallback("ada"));
    }
}
