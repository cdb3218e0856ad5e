//! Text completions over the OpenAI-compatible `/completions` HTTP API.

use crate::TextGenerator;
use async_trait::async_trait;
use replybot_core::{CoreError, GenerationConfig, LlmError};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

const PROVIDER: &str = "openai";

/// Body of one completion request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub n: u32,
    pub stream: bool,
    pub logprobs: Option<u32>,
    pub stop: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    error: Option<ProviderErrorBody>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Pulls the first choice's text out of a response body.
pub fn decode_completion(body: &[u8]) -> Result<String, LlmError> {
    let response: CompletionResponse =
        serde_json::from_slice(body).map_err(|_| LlmError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
        })?;

    if let Some(error) = response.error {
        return Err(provider_error(200, error));
    }

    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.text)
        .map(|text| text.trim().to_string())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(LlmError::EmptyCompletion {
            provider: PROVIDER.to_string(),
        });
    }
    Ok(text)
}

fn provider_error(status_code: u16, error: ProviderErrorBody) -> LlmError {
    let message = match error.kind {
        Some(kind) if error.message.is_empty() => kind,
        Some(kind) => format!("{kind}: {}", error.message),
        None => error.message,
    };
    LlmError::ProviderError {
        status_code,
        message,
    }
}

fn status_error(status_code: u16, body: &[u8]) -> LlmError {
    let provider = PROVIDER.to_string();
    match status_code {
        401 => LlmError::AuthenticationFailed { provider },
        429 => LlmError::RateLimitExceeded { provider },
        503 => LlmError::ServiceUnavailable { provider },
        _ => {
            let parsed = serde_json::from_slice::<CompletionResponse>(body)
                .ok()
                .and_then(|response| response.error);
            match parsed {
                Some(error) => provider_error(status_code, error),
                None => LlmError::ProviderError {
                    status_code,
                    message: String::from_utf8_lossy(body).trim().to_string(),
                },
            }
        }
    }
}

pub struct OpenAiCompletionClient {
    config: GenerationConfig,
}

impl OpenAiCompletionClient {
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }

    pub fn build_prompt(&self, prompt_seed: &str) -> String {
        match &self.config.prompt_suffix {
            Some(suffix) => format!("{prompt_seed}{suffix}"),
            None => prompt_seed.to_string(),
        }
    }

    pub fn build_request(&self, prompt_seed: &str) -> GenerationRequest {
        GenerationRequest {
            model: self.config.model.clone(),
            prompt: self.build_prompt(prompt_seed),
            max_tokens: self.config.max_tokens,
            temperature: 1.0,
            top_p: 1.0,
            n: 1,
            stream: false,
            logprobs: None,
            stop: String::new(),
        }
    }

    /// One completion round trip with a client built for this call only.
    pub async fn try_generate(&self, prompt_seed: &str) -> Result<String, CoreError> {
        let request = self.build_request(prompt_seed);
        let http_client = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .build()?;

        let transport_error = |e: reqwest::Error| -> CoreError {
            if e.is_timeout() {
                LlmError::RequestTimeout {
                    provider: PROVIDER.to_string(),
                }
                .into()
            } else {
                CoreError::Network(e)
            }
        };

        let response = http_client
            .post(self.config.endpoint.clone())
            .bearer_auth(&self.config.bearer_token)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body).into());
        }

        Ok(decode_completion(&body)?)
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompletionClient {
    async fn generate(&self, prompt_seed: &str) -> Option<String> {
        let started = Instant::now();
        match self.try_generate(prompt_seed).await {
            Ok(text) => {
                debug!(
                    "Completion of {} chars in {:.2}s",
                    text.len(),
                    started.elapsed().as_secs_f64()
                );
                Some(text)
            }
            Err(e) => {
                warn!("Text generation failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use reqwest::Url;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn test_config(endpoint: Url) -> GenerationConfig {
        GenerationConfig {
            endpoint,
            bearer_token: "sk-test".to_string(),
            model: "text-curie-001".to_string(),
            max_tokens: 256,
            prompt_suffix: Some(
                ". Please reply in Markdown format that is appropriate for Reddit.".to_string(),
            ),
            timeout: Duration::from_secs(5),
        }
    }

    fn completions_url(server: &mockito::ServerGuard) -> Url {
        format!("{}/v1/completions", server.url()).parse().unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let client = OpenAiCompletionClient::new(test_config(
            "https://api.openai.com/v1/completions".parse().unwrap(),
        ));
        let body = serde_json::to_value(client.build_request("i love living in america")).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "model": "text-curie-001",
                "prompt": "i love living in america. Please reply in Markdown format that is appropriate for Reddit.",
                "max_tokens": 256,
                "temperature": 1.0,
                "top_p": 1.0,
                "n": 1,
                "stream": false,
                "logprobs": null,
                "stop": ""
            })
        );
    }

    #[test]
    fn test_prompt_without_suffix() {
        let mut config = test_config("https://api.openai.com/v1/completions".parse().unwrap());
        config.prompt_suffix = None;
        let client = OpenAiCompletionClient::new(config);
        assert_eq!(client.build_prompt("hello"), "hello");
    }

    #[test]
    fn test_decode_completion() {
        assert_eq!(
            decode_completion(br#"{"choices": [{"text": "\n\nLand of the free.  "}]}"#).unwrap(),
            "Land of the free."
        );
        assert_eq!(
            decode_completion(br#"{"choices": [{"text": "first"}, {"text": "second"}]}"#)
                .unwrap(),
            "first"
        );
    }

    #[test]
    fn test_decode_completion_failures() {
        assert!(matches!(
            decode_completion(br#"{"choices": [{"text": "   "}]}"#),
            Err(LlmError::EmptyCompletion { .. })
        ));
        assert!(matches!(
            decode_completion(br#"{"choices": []}"#),
            Err(LlmError::EmptyCompletion { .. })
        ));
        assert!(matches!(
            decode_completion(br#"{"id": "cmpl-1"}"#),
            Err(LlmError::EmptyCompletion { .. })
        ));
        assert!(matches!(
            decode_completion(b"<html>bad gateway</html>"),
            Err(LlmError::InvalidResponseFormat { .. })
        ));

        match decode_completion(
            br#"{"error": {"message": "The model does not exist", "type": "invalid_request_error"}}"#,
        ) {
            Err(LlmError::ProviderError {
                status_code,
                message,
            }) => {
                assert_eq!(status_code, 200);
                assert_eq!(message, "invalid_request_error: The model does not exist");
            }
            other => panic!("expected ProviderError, got {other:?}"),
        }
    }

    #[test]
    fn test_status_errors() {
        assert!(matches!(
            status_error(401, b"{}"),
            LlmError::AuthenticationFailed { .. }
        ));
        assert!(matches!(
            status_error(429, b"{}"),
            LlmError::RateLimitExceeded { .. }
        ));
        assert!(matches!(
            status_error(503, b""),
            LlmError::ServiceUnavailable { .. }
        ));
        match status_error(400, br#"{"error": {"message": "max_tokens too large"}}"#) {
            LlmError::ProviderError {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 400);
                assert_eq!(message, "max_tokens too large");
            }
            other => panic!("expected ProviderError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_against_stub() {
        let mut server = mockito::Server::new_async().await;
        let completions = server
            .mock("POST", "/v1/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "text-curie-001",
                "prompt": "what about the united states. Please reply in Markdown format that is appropriate for Reddit.",
                "max_tokens": 256
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"text": "\n\nIt is a big country."}]}"#)
            .create_async()
            .await;
        let client = OpenAiCompletionClient::new(test_config(completions_url(&server)));

        let reply = client.generate("what about the united states").await;
        assert_eq!(reply.as_deref(), Some("It is a big country."));

        completions.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_returns_none_on_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _completions = server
            .mock("POST", "/v1/completions")
            .with_status(500)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": {"message": "boom"}}"#)
            .expect(2)
            .create_async()
            .await;
        let client = OpenAiCompletionClient::new(test_config(completions_url(&server)));

        match client.try_generate("hello").await {
            Err(CoreError::Llm(LlmError::ProviderError {
                status_code,
                message,
            })) => {
                assert_eq!(status_code, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected ProviderError, got {other:?}"),
        }
        assert_eq!(client.generate("hello").await, None);
    }

    #[tokio::test]
    async fn test_generate_returns_none_on_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _completions = server
            .mock("POST", "/v1/completions")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;
        let client = OpenAiCompletionClient::new(test_config(completions_url(&server)));
        assert_eq!(client.generate("hello").await, None);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{addr}/v1/completions").parse().unwrap();
        let client = OpenAiCompletionClient::new(test_config(url));
        assert!(matches!(
            client.try_generate("hello").await,
            Err(CoreError::Network(_))
        ));
        assert_eq!(client.generate("hello").await, None);
    }

    #[tokio::test]
    async fn test_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let mut config = test_config(format!("http://{addr}/v1/completions").parse().unwrap());
        config.timeout = Duration::from_millis(200);
        let client = OpenAiCompletionClient::new(config);

        assert!(matches!(
            client.try_generate("hello").await,
            Err(CoreError::Llm(LlmError::RequestTimeout { .. }))
        ));
    }
}
