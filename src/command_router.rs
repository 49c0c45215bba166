//! Wires configuration, backend, prompt cache and highlighter into a pipeline run.

use crate::chat_completions::ChatCompletionsGenerator;
use crate::config::{BackendKind, Config, TEMPERATURE};
use crate::generator::{Generator, MockGenerator};
use crate::highlight::{use_color, ColorChoice, Highlighter, PlainHighlighter, SyntectHighlighter};
use crate::http_client::ReqwestHttpClient;
use crate::ollama::OllamaGenerator;
use crate::pipeline::Pipeline;
use crate::prompt::{Mode, Request};
use crate::prompt_cache::PromptCache;
use anyhow::Result;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::info;

/// Per-invocation switches from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub backend: Option<BackendKind>,
    pub no_cache: bool,
    /// `None` highlights unless `NO_COLOR` is set.
    pub color: Option<ColorChoice>,
}

pub struct CommandRouter {
    config: Config,
    options: RunOptions,
}

impl CommandRouter {
    pub fn new(config: Config, options: RunOptions) -> Self {
        Self { config, options }
    }

    pub fn backend(&self) -> BackendKind {
        self.options
            .backend
            .unwrap_or_else(|| self.config.effective_backend())
    }

    fn build_generator(&self) -> Box<dyn Generator> {
        match self.backend() {
            BackendKind::Ollama => Box::new(OllamaGenerator::new(
                Box::new(ReqwestHttpClient::new()),
                &self.config.ollama_host,
                &self.config.ollama_model,
                TEMPERATURE,
            )),
            BackendKind::LmStudio => Box::new(ChatCompletionsGenerator::lm_studio(
                Box::new(ReqwestHttpClient::new()),
                &self.config.lmstudio_host,
                self.config.lmstudio_model.as_deref(),
                TEMPERATURE,
            )),
            BackendKind::Mlx => Box::new(ChatCompletionsGenerator::mlx(
                Box::new(ReqwestHttpClient::new()),
                &self.config.mlx_host,
                &self.config.mlx_model,
                TEMPERATURE,
            )),
            BackendKind::Mock => {
                info!("Using mock generator");
                Box::new(MockGenerator::new())
            }
        }
    }

    fn build_highlighter(&self) -> Box<dyn Highlighter> {
        let color = use_color(
            self.options.color,
            std::env::var_os("NO_COLOR").is_some(),
            std::io::stdout().is_terminal(),
        );
        if color {
            Box::new(SyntectHighlighter::new())
        } else {
            Box::new(PlainHighlighter)
        }
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        self.config.resolve_cache_dir()
    }

    /// Runs one request and returns the text to print.
    pub async fn process_request(&self, mode: Mode, text: String) -> Result<String> {
        let request = Request::new(mode, text);
        let generator = self.build_generator();
        let highlighter = self.build_highlighter();

        let cache = if self.options.no_cache {
            None
        } else {
            Some(PromptCache::new(self.cache_dir()?))
        };

        info!("Processing {} request with backend '{}'", mode, generator.name());

        let pipeline = Pipeline::new(
            generator.as_ref(),
            cache.as_ref(),
            highlighter.as_ref(),
            self.config.max_tokens_for(self.backend()),
        );
        Ok(pipeline.run(&request).await?)
    }

    /// Removes every prompt cache slot.
    pub fn clear_cache(&self) -> Result<PathBuf> {
        let dir = self.cache_dir()?;
        PromptCache::new(&dir).clear_all()?;
        info!("Prompt cache cleared in {:?}", dir);
        Ok(dir)
    }
}
