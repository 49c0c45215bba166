//! Backends speaking the OpenAI-compatible `/v1/chat/completions` endpoint:
//! LM Studio and `mlx_lm.server`.
//!
//! Neither server hands per-client state back to us, so these backends are
//! stateless and the pipeline bypasses the prompt cache for them.

use crate::error::GenerateError;
use crate::generator::{ComputationState, Generation, Generator, StateCodec};
use crate::http_client::HttpClient;
use crate::prompt::Prompt;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

pub struct ChatCompletionsGenerator {
    name: &'static str,
    label: &'static str,
    unreachable_hint: &'static str,
    http: Box<dyn HttpClient>,
    host: String,
    model: Option<String>,
    temperature: f64,
}

impl ChatCompletionsGenerator {
    /// LM Studio answers with whatever model is loaded when `model` is `None`.
    pub fn lm_studio(
        http: Box<dyn HttpClient>,
        host: &str,
        model: Option<&str>,
        temperature: f64,
    ) -> Self {
        Self {
            name: "lmstudio",
            label: "LM Studio",
            unreachable_hint: "Ensure LM Studio is running and a model is loaded",
            http,
            host: host.trim_end_matches('/').to_string(),
            model: model.map(str::to_string),
            temperature,
        }
    }

    pub fn mlx(http: Box<dyn HttpClient>, host: &str, model: &str, temperature: f64) -> Self {
        Self {
            name: "mlx",
            label: "mlx_lm.server",
            unreachable_hint: "Start it with: mlx_lm.server --model <model>",
            http,
            host: host.trim_end_matches('/').to_string(),
            model: Some(model.to_string()),
            temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.host)
    }
}

impl StateCodec for ChatCompletionsGenerator {
    fn decode(&self, bytes: Vec<u8>) -> Result<ComputationState, String> {
        if bytes.is_empty() {
            Ok(ComputationState::default())
        } else {
            Err(format!("{} keeps no client-side state", self.label))
        }
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    fn name(&self) -> &str {
        self.name
    }

    fn stateful(&self) -> bool {
        false
    }

    fn fresh_state(&self) -> ComputationState {
        ComputationState::default()
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        state: ComputationState,
        max_tokens: u32,
    ) -> Result<Generation, GenerateError> {
        let mut body = json!({
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "temperature": self.temperature,
            "max_tokens": max_tokens,
            "stream": false,
        });
        if let Some(model) = &self.model {
            body["model"] = json!(model);
        }

        let url = self.endpoint();
        info!("Asking {} at {}", self.label, self.host);

        let response = self.http.post_json(&url, &body).await.map_err(|e| {
            GenerateError::BackendUnavailable(format!("{}: {}. {}", url, e, self.unreachable_hint))
        })?;

        if !response.is_success() {
            return Err(GenerateError::Failed(format!(
                "{} returned HTTP {}: {}",
                self.label,
                response.status,
                response.body.trim()
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&response.body).map_err(|e| {
            GenerateError::Failed(format!("unexpected {} response ({}): {}", self.label, e, response.body))
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GenerateError::Failed(format!("{} returned no choices", self.label)))?;

        Ok(Generation { text, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::mock::MockHttpClient;
    use crate::prompt::{Mode, Request};
    use std::sync::Arc;

    fn lm_studio(http: MockHttpClient, model: Option<&str>) -> (Arc<MockHttpClient>, ChatCompletionsGenerator) {
        let http = Arc::new(http);
        let generator =
            ChatCompletionsGenerator::lm_studio(Box::new(http.clone()), "http://localhost:1234", model, 0.2);
        (http, generator)
    }

    fn mlx(http: MockHttpClient) -> (Arc<MockHttpClient>, ChatCompletionsGenerator) {
        let http = Arc::new(http);
        let generator = ChatCompletionsGenerator::mlx(
            Box::new(http.clone()),
            "http://localhost:8080/",
            "mlx-community/Phi-3-mini-4k-instruct-8bit",
            0.2,
        );
        (http, generator)
    }

    fn prompt() -> Prompt {
        Request::new(Mode::Explain, "ls -lS").prompt()
    }

    #[test]
    fn test_lmstudio_is_stateless() {
        let (_http, lmstudio) = lm_studio(MockHttpClient::new(), None);
        assert!(!lmstudio.stateful());
        assert!(lmstudio.fresh_state().is_empty());
        assert!(lmstudio.decode(b"leftover".to_vec()).is_err());
    }

    #[tokio::test]
    async fn test_generate_sends_two_messages() {
        let (http, lmstudio) = lm_studio(
            MockHttpClient::new().respond(200, r#"{"choices":[{"message":{"role":"assistant","content":"Lists files by size."}}]}"#),
            Some("phi-3"),
        );

        let generation = lmstudio.generate(&prompt(), lmstudio.fresh_state(), 200).await.unwrap();
        assert_eq!(generation.text, "Lists files by size.");

        let request = http.last_request();
        assert_eq!(request["messages"][0]["role"], "system");
        assert_eq!(request["messages"][1]["content"], "ls -lS");
        assert_eq!(request["max_tokens"], 200);
        assert_eq!(request["model"], "phi-3");
        assert_eq!(request["temperature"], 0.2);
    }

    #[tokio::test]
    async fn test_model_omitted_when_unset() {
        let (http, lmstudio) = lm_studio(
            MockHttpClient::new().respond(200, r#"{"choices":[{"message":{"content":"ok"}}]}"#),
            None,
        );
        lmstudio.generate(&prompt(), lmstudio.fresh_state(), 10).await.unwrap();
        assert!(http.last_request().get("model").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let (_http, lmstudio) = lm_studio(MockHttpClient::new().refuse("connection refused"), None);
        let err = lmstudio.generate(&prompt(), lmstudio.fresh_state(), 10).await.unwrap_err();
        assert!(matches!(err, GenerateError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_choices_is_failure() {
        let (_http, lmstudio) = lm_studio(MockHttpClient::new().respond(200, r#"{"choices":[]}"#), None);
        let err = lmstudio.generate(&prompt(), lmstudio.fresh_state(), 10).await.unwrap_err();
        assert!(matches!(err, GenerateError::Failed(_)));
    }

    #[tokio::test]
    async fn test_mlx_names_model_and_endpoint() {
        let (http, mlx) = mlx(
            MockHttpClient::new().respond(200, r#"{"choices":[{"message":{"content":"```zsh\nls -lS\n```"}}]}"#),
        );

        assert_eq!(mlx.name(), "mlx");
        assert!(!mlx.stateful());

        let generation = mlx.generate(&prompt(), mlx.fresh_state(), 100).await.unwrap();
        assert_eq!(generation.text, "```zsh\nls -lS\n```");

        let (url, request) = http.requests.lock().unwrap()[0].clone();
        assert_eq!(url, "http://localhost:8080/v1/chat/completions");
        assert_eq!(request["model"], "mlx-community/Phi-3-mini-4k-instruct-8bit");
        assert_eq!(request["max_tokens"], 100);
    }

    #[tokio::test]
    async fn test_mlx_unreachable_mentions_server() {
        let (_http, mlx) = mlx(MockHttpClient::new().refuse("connection refused"));
        let err = mlx.generate(&prompt(), mlx.fresh_state(), 100).await.unwrap_err();
        assert!(matches!(err, GenerateError::BackendUnavailable(ref m) if m.contains("mlx_lm.server")));
    }

    #[tokio::test]
    async fn test_mlx_server_error_is_failure() {
        let (_http, mlx) = mlx(MockHttpClient::new().respond(500, "model load failed"));
        let err = mlx.generate(&prompt(), mlx.fresh_state(), 100).await.unwrap_err();
        assert_eq!(
            err,
            GenerateError::Failed("mlx_lm.server returned HTTP 500: model load failed".to_string())
        );
    }
}
