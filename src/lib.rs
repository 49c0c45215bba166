//! zsh-llm-suggestions - shell commands from plain-language requests.
//!
//! Each invocation is a short-lived process: read a request from stdin, ask a
//! language-model backend, clean up the answer and print it. Stateful
//! backends get their model state back between runs through a file-backed
//! prompt cache holding one slot per mode.
//!
//! # Architecture
//!
//! - [`config`] - Configuration file and environment overrides
//! - [`prompt`] - Modes, requests and the system/user prompt pair
//! - [`generator`] - The backend trait, opaque computation state, mock backend
//! - [`ollama`] / [`chat_completions`] - Network backends (Ollama; LM Studio and MLX)
//! - [`http_client`] - HTTP client abstraction
//! - [`prompt_cache`] - One state blob per mode, replaced atomically
//! - [`pipeline`] - Load, generate, retry once on rejected state, save
//! - [`postprocess`] - Boundary-marker and code-fence removal
//! - [`highlight`] - Terminal highlighting of explanations
//! - [`command_router`] - Builds the pieces for one run
//! - [`error`] - Error taxonomy
//!
//! # Example
//!
//! ```ignore
//! use zsh_llm_suggestions::command_router::{CommandRouter, RunOptions};
//! use zsh_llm_suggestions::config::Config;
//! use zsh_llm_suggestions::prompt::Mode;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let router = CommandRouter::new(Config::load()?, RunOptions::default());
//!     let command = router
//!         .process_request(Mode::Generate, "list files sorted by size".to_string())
//!         .await?;
//!     println!("{}", command);
//!     Ok(())
//! }
//! ```

pub mod chat_completions;
pub mod command_router;
pub mod config;
pub mod error;
pub mod generator;
pub mod highlight;
pub mod http_client;
pub mod ollama;
pub mod pipeline;
pub mod postprocess;
pub mod prompt;
pub mod prompt_cache;
