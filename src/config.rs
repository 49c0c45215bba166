use anyhow::{anyhow, Context, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

const ENV_PREFIX: &str = "ZSH_LLM_SUGGESTIONS_";

pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_LMSTUDIO_HOST: &str = "http://localhost:1234";
pub const DEFAULT_MLX_HOST: &str = "http://localhost:8080";
pub const DEFAULT_MLX_MODEL: &str = "mlx-community/Phi-3-mini-4k-instruct-8bit";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
/// Small models served by `mlx_lm.server` ramble past a one-line command.
pub const DEFAULT_MLX_MAX_TOKENS: u32 = 100;
pub const TEMPERATURE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Ollama,
    LmStudio,
    Mlx,
    Mock,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Ollama => "ollama",
            BackendKind::LmStudio => "lmstudio",
            BackendKind::Mlx => "mlx",
            BackendKind::Mock => "mock",
        })
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(BackendKind::Ollama),
            "lmstudio" | "lm-studio" => Ok(BackendKind::LmStudio),
            "mlx" => Ok(BackendKind::Mlx),
            "mock" => Ok(BackendKind::Mock),
            other => Err(anyhow!(
                "unknown backend '{}', expected ollama, lmstudio, mlx or mock",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,
    #[serde(default = "default_lmstudio_host")]
    pub lmstudio_host: String,
    #[serde(default)]
    pub lmstudio_model: Option<String>,
    #[serde(default = "default_mlx_host")]
    pub mlx_host: String,
    #[serde(default = "default_mlx_model")]
    pub mlx_model: String,
    /// Where slot files live. Defaults to the directory holding the executable.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Unset means the backend's own default, see [`Config::max_tokens_for`].
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub use_mock: bool,
}

fn default_ollama_model() -> String {
    DEFAULT_OLLAMA_MODEL.to_string()
}

fn default_ollama_host() -> String {
    DEFAULT_OLLAMA_HOST.to_string()
}

fn default_lmstudio_host() -> String {
    DEFAULT_LMSTUDIO_HOST.to_string()
}

fn default_mlx_host() -> String {
    DEFAULT_MLX_HOST.to_string()
}

fn default_mlx_model() -> String {
    DEFAULT_MLX_MODEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            ollama_model: default_ollama_model(),
            ollama_host: default_ollama_host(),
            lmstudio_host: default_lmstudio_host(),
            lmstudio_model: None,
            mlx_host: default_mlx_host(),
            mlx_model: default_mlx_model(),
            cache_dir: None,
            max_tokens: None,
            use_mock: false,
        }
    }
}

impl Config {
    /// Load configuration from file, environment variables, or create default
    pub fn load() -> Result<Self> {
        let mut config = match Self::get_config_path() {
            Ok(path) => Self::load_file_or_default(&path),
            Err(e) => {
                info!("{}, using default configuration", e);
                Self::default()
            }
        };

        // Environment variables override config file
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// A broken file is reported and skipped rather than failing the run.
    fn load_file_or_default(config_path: &Path) -> Self {
        match Self::load_from_file(config_path) {
            Ok(Some(config)) => config,
            Ok(None) => {
                info!("No config file found, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!("Ignoring config file {}: {:#}", config_path.display(), e);
                Self::default()
            }
        }
    }

    fn load_from_file(config_path: &Path) -> Result<Option<Self>> {
        if !config_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("could not read {}", config_path.display()))?;
        let config: Config = toml::from_str(&content).context("invalid TOML")?;
        info!("Loaded config from: {}", config_path.display());
        Ok(Some(config))
    }

    /// Applies `ZSH_LLM_SUGGESTIONS_*` overrides. Bad values are skipped.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, suffix)).filter(|value| !value.trim().is_empty())
        };

        if let Some(value) = var("BACKEND") {
            match value.parse() {
                Ok(backend) => self.backend = backend,
                Err(e) => warn!("Ignoring {}BACKEND: {}", ENV_PREFIX, e),
            }
        }
        if let Some(model) = var("OLLAMA_MODEL") {
            self.ollama_model = model;
        }
        if let Some(host) = var("OLLAMA_HOST") {
            self.ollama_host = host;
        }
        if let Some(host) = var("LMSTUDIO_HOST") {
            self.lmstudio_host = host;
        }
        if let Some(model) = var("LMSTUDIO_MODEL") {
            self.lmstudio_model = Some(model);
        }
        if let Some(host) = var("MLX_HOST") {
            self.mlx_host = host;
        }
        if let Some(model) = var("MLX_MODEL") {
            self.mlx_model = model;
        }
        if let Some(dir) = var("CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(value) = var("MAX_TOKENS") {
            match value.trim().parse::<u32>() {
                Ok(n) if n > 0 => self.max_tokens = Some(n),
                _ => warn!("Ignoring {}MAX_TOKENS: '{}' is not a positive number", ENV_PREFIX, value),
            }
        }
        if lookup(&format!("{}USE_MOCK", ENV_PREFIX)).is_some() {
            self.use_mock = true;
        }
    }

    /// The backend to use, with mock mode taking precedence.
    pub fn effective_backend(&self) -> BackendKind {
        if self.use_mock {
            BackendKind::Mock
        } else {
            self.backend
        }
    }

    /// Token limit for one answer: the configured value, else the backend default.
    pub fn max_tokens_for(&self, backend: BackendKind) -> u32 {
        self.max_tokens.unwrap_or(match backend {
            BackendKind::Mlx => DEFAULT_MLX_MAX_TOKENS,
            _ => DEFAULT_MAX_TOKENS,
        })
    }

    /// Resolves the cache directory, falling back to the executable's directory.
    pub fn resolve_cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let exe = std::env::current_exe()?;
        exe.parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("Could not determine the directory of {}", exe.display()))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join("config.toml"))
    }

    pub fn get_config_dir() -> Result<PathBuf> {
        let home = home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home.join(".zsh-llm-suggestions"))
    }

    pub fn show_config_info(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        println!("Configuration file: {}", config_path.display());
        println!(
            "Status: {}",
            if config_path.exists() { "Found" } else { "Not found (using defaults)" }
        );

        println!("Backend: {}", self.effective_backend());
        println!("Ollama: {} (model {})", self.ollama_host, self.ollama_model);
        println!(
            "LM Studio: {} (model {})",
            self.lmstudio_host,
            self.lmstudio_model.as_deref().unwrap_or("currently loaded")
        );
        println!("MLX: {} (model {})", self.mlx_host, self.mlx_model);
        println!("Max tokens: {}", self.max_tokens_for(self.effective_backend()));
        match self.resolve_cache_dir() {
            Ok(dir) => println!("Prompt cache directory: {}", dir.display()),
            Err(e) => println!("Prompt cache directory: unavailable ({})", e),
        }

        println!("\nOverride any setting with environment variables, e.g.:");
        println!("  export {}BACKEND=ollama", ENV_PREFIX);
        println!("  export {}OLLAMA_MODEL={}", ENV_PREFIX, DEFAULT_OLLAMA_MODEL);

        Ok(())
    }
}
