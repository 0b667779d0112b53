//! Anthropic Messages API oracle.

use super::{Oracle, OracleError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_ANTHROPIC_API: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Connection settings for [`AnthropicOracle`].
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_url: DEFAULT_ANTHROPIC_API.to_string(),
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicError,
}

/// Oracle backed by Anthropic's Messages API.
pub struct AnthropicOracle {
    client: Client,
    config: OracleConfig,
}

impl AnthropicOracle {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config
            .api_key
            .as_deref()
            .is_some_and(|k| !k.is_empty())
    }
}

fn error_for_status(status: u16, body: &str) -> OracleError {
    let (kind, message) = match serde_json::from_str::<AnthropicErrorResponse>(body) {
        Ok(parsed) => (parsed.error.error_type, parsed.error.message),
        Err(_) => (String::new(), body.to_string()),
    };
    match (status, kind.as_str()) {
        (401 | 403, _) | (_, "authentication_error" | "permission_error") => {
            OracleError::Auth { status, message }
        }
        (429, _) | (_, "rate_limit_error") => OracleError::RateLimited(message),
        (500..=599, _) | (_, "overloaded_error" | "api_error") => {
            OracleError::Unavailable(format!("{status}: {message}"))
        }
        _ => OracleError::InvocationFailed { status, message },
    }
}

#[async_trait]
impl Oracle for AnthropicOracle {
    #[instrument(skip(self, prompt), fields(model = %self.config.model, prompt_len = prompt.len()))]
    async fn infer(&self, prompt: &str) -> Result<String, OracleError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| OracleError::MissingCredential("ANTHROPIC_API_KEY not set".to_string()))?;

        let request = AnthropicRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: 0.0,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    OracleError::Unavailable(e.to_string())
                } else {
                    OracleError::Http(e)
                }
            })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(error_for_status(status.as_u16(), &body));
        }

        let parsed: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| OracleError::Envelope(e.to_string()))?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("\n");

        debug!(reply_len = text.len(), "oracle replied");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn oracle_for(server: &MockServer, key: Option<&str>) -> AnthropicOracle {
        AnthropicOracle::new(OracleConfig {
            api_key: key.map(str::to_string),
            api_url: server.uri(),
            ..OracleConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn missing_key_fails_without_calling_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let oracle = oracle_for(&server, None);
        assert!(!oracle.is_configured());
        let err = oracle.infer("hello").await.unwrap_err();
        assert!(matches!(err, OracleError::MissingCredential(_)));
    }

    #[tokio::test]
    async fn joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-api-key", "k"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    { "type": "text", "text": "{\"type\": \"bug\"," },
                    { "type": "text", "text": "\"priority\": \"P1\"}" }
                ]
            })))
            .mount(&server)
            .await;

        let reply = oracle_for(&server, Some("k")).infer("classify").await.unwrap();
        assert_eq!(reply, "{\"type\": \"bug\",\n\"priority\": \"P1\"}");
    }

    #[tokio::test]
    async fn rate_limit_and_auth_statuses_are_distinguished() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "type": "error",
                "error": { "type": "rate_limit_error", "message": "slow down" }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "type": "error",
                "error": { "type": "authentication_error", "message": "invalid x-api-key" }
            })))
            .mount(&server)
            .await;

        let oracle = oracle_for(&server, Some("k"));
        assert!(matches!(oracle.infer("a").await, Err(OracleError::RateLimited(_))));
        assert!(matches!(
            oracle.infer("b").await,
            Err(OracleError::Auth { status: 401, .. })
        ));
    }
}
