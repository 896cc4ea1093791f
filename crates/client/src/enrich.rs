//! OpenAI-compatible chat completions client used for summarization.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use kcache_core::{AppConfig, Enricher, Error};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// [`Enricher`] backed by `POST {base_url}/chat/completions`.
pub struct ChatEnricher {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl ChatEnricher {
    pub fn new(
        base_url: &str, api_key: Option<String>, model: impl Into<String>, timeout: Duration,
    ) -> Result<Self, Error> {
        let http = Client::builder()
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Enrich(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        Ok(Self { http, endpoint, api_key, model: model.into() })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Self::new(&config.llm_base_url, config.llm_api_key.clone(), &config.llm_model, config.llm_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Enricher for ChatEnricher {
    async fn invoke(&self, system_prompt: &str, user_content: &str) -> Result<String, Error> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                Message { role: "system", content: system_prompt },
                Message { role: "user", content: user_content },
            ],
            temperature: 0.0,
        };

        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| Error::Enrich(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), model = %self.model, "chat completion rejected");
            return Err(Error::Enrich(format!("status {}", status.as_u16())));
        }

        let body: ChatResponse =
            response.json().await.map_err(|e| Error::Enrich(format!("invalid response: {e}")))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Enrich("no completion choices".to_string()))?;

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn enricher(server: &mockito::Server, api_key: Option<&str>) -> ChatEnricher {
        ChatEnricher::new(&format!("{}/v1/", server.url()), api_key.map(String::from), "tiny", Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn test_invoke_sends_prompt_and_returns_trimmed_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::Json(json!({
                "model": "tiny",
                "messages": [
                    {"role": "system", "content": "Summarize."},
                    {"role": "user", "content": "Hello"}
                ],
                "temperature": 0.0
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"choices": [{"message": {"role": "assistant", "content": "  A greeting.\n"}}]}).to_string())
            .create_async()
            .await;

        let summary = enricher(&server, Some("secret")).invoke("Summarize.", "Hello").await.unwrap();
        assert_eq!(summary, "A greeting.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invoke_without_api_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(json!({"choices": [{"message": {"content": "ok"}}]}).to_string())
            .create_async()
            .await;

        assert_eq!(enricher(&server, Some("  ")).invoke("s", "u").await.unwrap(), "ok");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invoke_error_status() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/v1/chat/completions").with_status(429).create_async().await;

        let result = enricher(&server, None).invoke("s", "u").await;
        assert!(matches!(result, Err(Error::Enrich(msg)) if msg.contains("429")));
    }

    #[tokio::test]
    async fn test_invoke_no_choices() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(json!({"choices": []}).to_string())
            .create_async()
            .await;

        assert!(matches!(enricher(&server, None).invoke("s", "u").await, Err(Error::Enrich(_))));
    }

    #[test]
    fn test_endpoint_from_config() {
        let config = AppConfig { llm_base_url: "http://localhost:11434/v1".into(), ..Default::default() };
        let enricher = ChatEnricher::from_config(&config).unwrap();
        assert_eq!(enricher.endpoint(), "http://localhost:11434/v1/chat/completions");
    }
}
