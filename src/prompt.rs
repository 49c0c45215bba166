//! Operating modes and the two-message prompt sent to a backend.

use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

const GENERATE_SYSTEM_MESSAGE: &str = "You are a zsh shell expert, please write a ZSH command that solves my problem. You should only output the completed command, no need to include any other explanation.";

const EXPLAIN_SYSTEM_MESSAGE: &str = "You are a zsh shell expert, please briefly explain how the given command works. Be as concise as possible. Use Markdown syntax for formatting.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Turn a natural-language request into a shell command.
    Generate,
    /// Explain an existing command in Markdown.
    Explain,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Generate, Mode::Explain];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Generate => "generate",
            Mode::Explain => "explain",
        }
    }

    pub fn system_message(&self) -> &'static str {
        match self {
            Mode::Generate => GENERATE_SYSTEM_MESSAGE,
            Mode::Explain => EXPLAIN_SYSTEM_MESSAGE,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "generate" => Ok(Mode::Generate),
            "explain" => Ok(Mode::Explain),
            other => Err(anyhow!("unknown mode '{}', expected 'generate' or 'explain'", other)),
        }
    }
}

/// One user request, read once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub mode: Mode,
    pub text: String,
}

impl Request {
    pub fn new(mode: Mode, text: impl Into<String>) -> Self {
        Self {
            mode,
            text: text.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn prompt(&self) -> Prompt {
        Prompt {
            mode: self.mode,
            system: self.mode.system_message().to_string(),
            user: self.text.clone(),
        }
    }
}

/// System and user message pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub mode: Mode,
    pub system: String,
    pub user: String,
}
