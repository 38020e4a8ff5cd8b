//! Chat completions client
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint and asks for
//! a JSON object answer.

use std::time::Duration;

use bimdash_common::config::AiConfig;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::AiError;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl LlmClient {
    pub fn new(config: &AiConfig, api_key: Option<String>) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AiError::RequestFailed(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one system + user exchange and parse the reply as JSON.
    ///
    /// A single round trip: rate limiting and outages are returned to the
    /// caller as they are.
    pub async fn complete_json(&self, system: &str, prompt: &str) -> Result<Value, AiError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self.send_request(&request).await.map_err(|e| {
            warn!(model = %self.model, "AI request failed: {}", e);
            e
        })?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(e.to_string()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AiError::InvalidResponse("no choices in response".to_string()))?;

        debug!(model = %self.model, chars = content.len(), "AI response received");
        parse_json_content(&content)
    }

    async fn send_request(&self, request: &ChatRequest<'_>) -> Result<Response, AiError> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(AiError::RateLimited),
            StatusCode::SERVICE_UNAVAILABLE => Err(AiError::Unavailable),
            status if status.is_success() => Ok(response),
            status => Err(AiError::RequestFailed(format!("endpoint returned {}", status))),
        }
    }
}

/// Parse a model reply, tolerating a Markdown code fence around the JSON
fn parse_json_content(content: &str) -> Result<Value, AiError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced.trim()).map_err(|e| AiError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Chat endpoint that always answers with `status`, counting requests
    async fn serve_status(status: axum::http::StatusCode) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    status
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), hits)
    }

    fn client_for(base_url: String) -> LlmClient {
        let config = AiConfig {
            base_url,
            timeout_secs: 5,
            ..AiConfig::default()
        };
        LlmClient::new(&config, None).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limit_is_returned_after_one_request() {
        let (base_url, hits) = serve_status(axum::http::StatusCode::TOO_MANY_REQUESTS).await;

        let result = client_for(base_url).complete_json("system", "prompt").await;

        assert!(matches!(result, Err(AiError::RateLimited)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unavailable_endpoint() {
        let (base_url, hits) = serve_status(axum::http::StatusCode::SERVICE_UNAVAILABLE).await;

        let result = client_for(base_url).complete_json("system", "prompt").await;

        assert!(matches!(result, Err(AiError::Unavailable)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_plain_and_fenced_json() {
        assert_eq!(
            parse_json_content(r#"{"columnTypes": ["string"]}"#).unwrap(),
            json!({"columnTypes": ["string"]})
        );
        assert_eq!(
            parse_json_content("```json\n{\"a\": 1}\n```").unwrap(),
            json!({"a": 1})
        );
        assert!(matches!(
            parse_json_content("Sure! Here you go."),
            Err(AiError::InvalidResponse(_))
        ));
    }
}
