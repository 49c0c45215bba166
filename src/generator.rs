//! The generation capability consumed by the pipeline.
//!
//! A backend turns a [`Prompt`] plus an opaque [`ComputationState`] into text
//! and a replacement state. Only the backend knows what the state bytes mean;
//! everything else moves them around wholesale.

use crate::error::GenerateError;
use crate::prompt::{Mode, Prompt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque, backend-defined model state for one conversation prefix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComputationState(Vec<u8>);

impl ComputationState {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Decides whether persisted bytes are a usable state for this backend and model.
pub trait StateCodec: Send + Sync {
    fn decode(&self, bytes: Vec<u8>) -> Result<ComputationState, String>;
}

/// Output of one successful generation call.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub state: ComputationState,
}

#[async_trait]
pub trait Generator: StateCodec {
    /// Short backend identifier used in diagnostics.
    fn name(&self) -> &str;

    /// Whether this backend carries state between calls at all.
    fn stateful(&self) -> bool {
        true
    }

    /// The empty state used when nothing usable is cached.
    fn fresh_state(&self) -> ComputationState;

    async fn generate(
        &self,
        prompt: &Prompt,
        state: ComputationState,
        max_tokens: u32,
    ) -> Result<Generation, GenerateError>;
}

const MOCK_BACKEND: &str = "mock";

#[derive(Debug, Serialize, Deserialize)]
struct MockState {
    backend: String,
    turns: u32,
}

/// Deterministic offline backend.
///
/// Answers are picked from the request words and wrapped the way chat models
/// usually reply (code fences, a trailing end-of-turn marker). Its state is a
/// turn counter so cache reuse is observable.
pub struct MockGenerator;

impl MockGenerator {
    pub fn new() -> Self {
        Self
    }

    fn encode(state: &MockState) -> ComputationState {
        // Serializing a two-field struct cannot fail.
        ComputationState::from_bytes(serde_json::to_vec(state).unwrap_or_default())
    }

    fn parse(bytes: &[u8]) -> Result<MockState, String> {
        let state: MockState =
            serde_json::from_slice(bytes).map_err(|e| format!("not a mock state: {}", e))?;
        if state.backend != MOCK_BACKEND {
            return Err(format!("state belongs to backend '{}'", state.backend));
        }
        Ok(state)
    }

    pub fn turns(state: &ComputationState) -> Option<u32> {
        Self::parse(state.as_bytes()).ok().map(|s| s.turns)
    }

    fn mock_answer(mode: Mode, request: &str) -> String {
        let request = request.trim();
        let lower = request.to_lowercase();
        match mode {
            Mode::Generate => {
                let command = if lower.contains("list") && lower.contains("file") && lower.contains("size") {
                    "ls -lS".to_string()
                } else if lower.contains("disk") {
                    "df -h".to_string()
                } else if lower.contains("process") {
                    "ps aux".to_string()
                } else if lower.contains("list") && lower.contains("file") {
                    "ls -la".to_string()
                } else {
                    format!("echo '{}'", request.replace('\'', ""))
                };
                format!("```zsh\n{}\n```<|end|>", command)
            }
            Mode::Explain => {
                let program = request.split_whitespace().next().unwrap_or("the command");
                format!(
                    "`{}` runs **{}** with the given arguments.\n\n- Output is written to standard output.<|end|>",
                    request, program
                )
            }
        }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCodec for MockGenerator {
    fn decode(&self, bytes: Vec<u8>) -> Result<ComputationState, String> {
        Self::parse(&bytes)?;
        Ok(ComputationState::from_bytes(bytes))
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn name(&self) -> &str {
        MOCK_BACKEND
    }

    fn fresh_state(&self) -> ComputationState {
        Self::encode(&MockState {
            backend: MOCK_BACKEND.to_string(),
            turns: 0,
        })
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        state: ComputationState,
        _max_tokens: u32,
    ) -> Result<Generation, GenerateError> {
        let mut parsed = Self::parse(state.as_bytes()).map_err(GenerateError::StateInvalid)?;
        parsed.turns += 1;

        Ok(Generation {
            text: Self::mock_answer(prompt.mode, &prompt.user),
            state: Self::encode(&parsed),
        })
    }
}
