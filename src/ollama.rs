//! Ollama backend.
//!
//! Ollama's `/api/generate` returns a `context` token array that, sent back on
//! the next call, resumes the conversation without re-evaluating it. That
//! array, tagged with the model it came from, is this backend's computation
//! state.

use crate::error::GenerateError;
use crate::generator::{ComputationState, Generation, Generator, StateCodec};
use crate::http_client::HttpClient;
use crate::prompt::Prompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct OllamaState {
    version: u32,
    model: String,
    context: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    context: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

pub struct OllamaGenerator {
    http: Box<dyn HttpClient>,
    host: String,
    model: String,
    temperature: f64,
}

impl OllamaGenerator {
    pub fn new(http: Box<dyn HttpClient>, host: &str, model: &str, temperature: f64) -> Self {
        Self {
            http,
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.host)
    }

    fn encode(&self, context: Vec<u32>) -> ComputationState {
        let state = OllamaState {
            version: STATE_VERSION,
            model: self.model.clone(),
            context,
        };
        ComputationState::from_bytes(serde_json::to_vec(&state).unwrap_or_default())
    }

    fn parse(&self, bytes: &[u8]) -> Result<OllamaState, String> {
        let state: OllamaState =
            serde_json::from_slice(bytes).map_err(|e| format!("not an Ollama context: {}", e))?;
        if state.version != STATE_VERSION {
            return Err(format!(
                "context format version {} is not supported (expected {})",
                state.version, STATE_VERSION
            ));
        }
        if state.model != self.model {
            return Err(format!(
                "context was built by model '{}', current model is '{}'",
                state.model, self.model
            ));
        }
        Ok(state)
    }

    fn classify_failure(&self, status: u16, body: &str, had_context: bool) -> GenerateError {
        let message = serde_json::from_str::<ErrorResponse>(body)
            .map(|e| e.error)
            .unwrap_or_else(|_| body.trim().to_string());

        if status == 404 {
            return GenerateError::BackendUnavailable(format!(
                "model '{}' is not available ({}). Try: ollama pull {}",
                self.model, message, self.model
            ));
        }

        let detail = format!("Ollama returned HTTP {}: {}", status, message);
        if had_context {
            GenerateError::StateInvalid(detail)
        } else {
            GenerateError::Failed(detail)
        }
    }
}

impl StateCodec for OllamaGenerator {
    fn decode(&self, bytes: Vec<u8>) -> Result<ComputationState, String> {
        self.parse(&bytes)?;
        Ok(ComputationState::from_bytes(bytes))
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    fn fresh_state(&self) -> ComputationState {
        self.encode(Vec::new())
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        state: ComputationState,
        max_tokens: u32,
    ) -> Result<Generation, GenerateError> {
        let state = self.parse(state.as_bytes()).map_err(GenerateError::StateInvalid)?;
        let had_context = !state.context.is_empty();

        let mut body = json!({
            "model": self.model,
            "system": prompt.system,
            "prompt": prompt.user,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": max_tokens,
            }
        });
        if had_context {
            body["context"] = json!(state.context);
        }

        let url = self.endpoint();
        info!(
            "Asking Ollama model '{}' ({} cached context tokens)",
            self.model,
            state.context.len()
        );

        let response = self
            .http
            .post_json(&url, &body)
            .await
            .map_err(|e| GenerateError::BackendUnavailable(format!("{}: {}", url, e)))?;

        if !response.is_success() {
            return Err(self.classify_failure(response.status, &response.body, had_context));
        }

        let parsed: GenerateResponse = serde_json::from_str(&response.body).map_err(|e| {
            GenerateError::Failed(format!("unexpected Ollama response ({}): {}", e, response.body))
        })?;

        let context = parsed.context.unwrap_or(state.context);
        debug!("Ollama returned {} context tokens", context.len());

        Ok(Generation {
            text: parsed.response,
            state: self.encode(context),
        })
    }
}
