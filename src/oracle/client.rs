//! HTTP client for hosted LLM reasoning services
//!
//! Supports:
//! - Anthropic Messages API
//! - OpenAI-compatible chat completions (OpenAI, Ollama, LM Studio, local models)

use super::ReasoningOracle;
use crate::config::OracleConfig;
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Anthropic Messages API
    Anthropic,
    /// OpenAI-compatible API
    OpenAiCompatible,
}

impl LlmProvider {
    /// Base URL used when none is configured
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "https://api.anthropic.com",
            LlmProvider::OpenAiCompatible => "https://api.openai.com/v1",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            "openai" | "ollama" | "lmstudio" | "local" => Ok(LlmProvider::OpenAiCompatible),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Anthropic => write!(f, "anthropic"),
            LlmProvider::OpenAiCompatible => write!(f, "openai"),
        }
    }
}

/// Reasoning oracle backed by a hosted LLM
pub struct LlmOracle {
    config: OracleConfig,
    base_url: String,
    http_client: HttpClient,
}

impl LlmOracle {
    /// Create a new client; the request timeout comes from the config
    pub fn new(config: OracleConfig) -> Result<Self> {
        let http_client = HttpClient::builder().timeout(config.timeout).build()?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.provider.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            config,
            base_url,
            http_client,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    async fn invoke_anthropic(&self, prompt: &str, system_instruction: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url);

        let body = AnthropicRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: system_instruction,
            messages: vec![WireMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut request = self
            .http_client
            .post(&url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await.map_err(unavailable)?;
        let response = check_status(response).await?;

        let reply: AnthropicResponse = response.json().await.map_err(|e| {
            AgentError::MalformedResponse(format!("unexpected Anthropic response body: {}", e))
        })?;

        reply
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| {
                AgentError::MalformedResponse("Anthropic reply has no text content".to_string())
            })
    }

    async fn invoke_openai(&self, prompt: &str, system_instruction: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = OpenAiRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: system_instruction,
                },
                WireMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: false,
        };

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(unavailable)?;
        let response = check_status(response).await?;

        let reply: OpenAiResponse = response.json().await.map_err(|e| {
            AgentError::MalformedResponse(format!("unexpected chat completion body: {}", e))
        })?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AgentError::MalformedResponse("chat completion has no content".to_string())
            })
    }
}

#[async_trait]
impl ReasoningOracle for LlmOracle {
    async fn invoke(&self, prompt: &str, system_instruction: &str) -> Result<String> {
        tracing::debug!(
            provider = %self.config.provider,
            model = %self.config.model,
            prompt_len = prompt.len(),
            "Invoking reasoning oracle"
        );

        match self.config.provider {
            LlmProvider::Anthropic => self.invoke_anthropic(prompt, system_instruction).await,
            LlmProvider::OpenAiCompatible => self.invoke_openai(prompt, system_instruction).await,
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

fn unavailable(err: reqwest::Error) -> AgentError {
    if err.is_timeout() {
        AgentError::OracleUnavailable(format!("request timed out: {}", err))
    } else {
        AgentError::OracleUnavailable(format!("request failed: {}", err))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AgentError::OracleUnavailable(
            "authentication failed, check the API key".to_string(),
        )),
        StatusCode::TOO_MANY_REQUESTS => Err(AgentError::OracleUnavailable(
            "rate limit exceeded".to_string(),
        )),
        status => {
            let error_body: Option<serde_json::Value> = response.json().await.ok();
            let error_msg = error_body
                .as_ref()
                .and_then(|v| v.get("error").and_then(|e| e.get("message")))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_string();
            Err(AgentError::OracleUnavailable(format!(
                "API request failed ({}): {}",
                status, error_msg
            )))
        }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn spawn_stub(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(provider: LlmProvider, base_url: String) -> OracleConfig {
        OracleConfig {
            provider,
            base_url: Some(base_url),
            model: "test-model".to_string(),
            api_key: Some("secret".to_string()),
            max_tokens: 64,
            timeout: Duration::from_secs(5),
        }
    }

    async fn anthropic_messages(
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (HttpStatus, Json<Value>) {
        if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("secret") {
            return (
                HttpStatus::UNAUTHORIZED,
                Json(json!({"error": {"message": "bad key"}})),
            );
        }
        let echoed = format!(
            "{}|{}|{}",
            body["model"].as_str().unwrap_or_default(),
            body["system"].as_str().unwrap_or_default(),
            body["messages"][0]["content"].as_str().unwrap_or_default()
        );
        (
            HttpStatus::OK,
            Json(json!({"content": [{"type": "text", "text": echoed}]})),
        )
    }

    #[tokio::test]
    async fn test_anthropic_round_trip() {
        let base = spawn_stub(Router::new().route("/v1/messages", post(anthropic_messages))).await;
        let oracle = LlmOracle::new(config(LlmProvider::Anthropic, base)).unwrap();

        let reply = oracle.invoke("the prompt", "the system").await.unwrap();
        assert_eq!(reply, "test-model|the system|the prompt");
        assert_eq!(oracle.model(), "test-model");
    }

    #[tokio::test]
    async fn test_authentication_failure_is_unavailable() {
        let base = spawn_stub(Router::new().route("/v1/messages", post(anthropic_messages))).await;
        let mut cfg = config(LlmProvider::Anthropic, base);
        cfg.api_key = Some("wrong".to_string());
        let oracle = LlmOracle::new(cfg).unwrap();

        let err = oracle.invoke("p", "s").await.unwrap_err();
        assert!(matches!(err, AgentError::OracleUnavailable(ref msg) if msg.contains("authentication")));
    }

    #[tokio::test]
    async fn test_openai_round_trip() {
        async fn completions(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Json(json!({
                "choices": [{"message": {"content": format!("{}|{}", auth, body["messages"][0]["role"].as_str().unwrap_or_default())}}]
            }))
        }

        let base = spawn_stub(Router::new().route("/chat/completions", post(completions))).await;
        let oracle = LlmOracle::new(config(LlmProvider::OpenAiCompatible, base)).unwrap();

        let reply = oracle.invoke("p", "s").await.unwrap();
        assert_eq!(reply, "Bearer secret|system");
    }

    #[tokio::test]
    async fn test_rate_limit_and_server_errors() {
        async fn limited() -> HttpStatus {
            HttpStatus::TOO_MANY_REQUESTS
        }
        async fn broken() -> (HttpStatus, Json<Value>) {
            (
                HttpStatus::INTERNAL_SERVER_ERROR,
                Json(json!({"error": {"message": "overloaded"}})),
            )
        }

        let base = spawn_stub(
            Router::new()
                .route("/v1/messages", post(limited))
                .route("/chat/completions", post(broken)),
        )
        .await;

        let anthropic = LlmOracle::new(config(LlmProvider::Anthropic, base.clone())).unwrap();
        let err = anthropic.invoke("p", "s").await.unwrap_err();
        assert!(err.to_string().contains("rate limit"));

        let openai = LlmOracle::new(config(LlmProvider::OpenAiCompatible, base)).unwrap();
        let err = openai.invoke("p", "s").await.unwrap_err();
        assert!(err.to_string().contains("overloaded"));
        assert_eq!(err.kind(), "oracle_unavailable");
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let oracle = LlmOracle::new(config(
            LlmProvider::Anthropic,
            "http://127.0.0.1:1".to_string(),
        ))
        .unwrap();

        let err = oracle.invoke("p", "s").await.unwrap_err();
        assert!(matches!(err, AgentError::OracleUnavailable(_)));
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("Anthropic".parse::<LlmProvider>(), Ok(LlmProvider::Anthropic));
        assert_eq!("ollama".parse::<LlmProvider>(), Ok(LlmProvider::OpenAiCompatible));
        assert!("gemini".parse::<LlmProvider>().is_err());
        assert_eq!(LlmProvider::Anthropic.to_string(), "anthropic");
    }
}
