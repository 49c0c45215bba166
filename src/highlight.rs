//! Terminal highlighting for explanations.

use once_cell::sync::Lazy;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Style, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};
use std::str::FromStr;
use tracing::debug;

const THEME: &str = "base16-ocean.dark";
const RESET: &str = "\x1b[0m";

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

/// When explanations get colour codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChoice {
    Always,
    /// Only when stdout is a terminal.
    Auto,
    Never,
}

impl FromStr for ColorChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "always" => Ok(ColorChoice::Always),
            "auto" => Ok(ColorChoice::Auto),
            "never" => Ok(ColorChoice::Never),
            other => Err(anyhow::anyhow!(
                "unknown color choice '{}', expected always, auto or never",
                other
            )),
        }
    }
}

/// Decides whether to highlight. Without an explicit choice, colour is on
/// unless `NO_COLOR` is set: the shell widget captures stdout and prints it
/// to the terminal itself, so a pipe is the normal case.
pub fn use_color(choice: Option<ColorChoice>, no_color_env: bool, stdout_is_terminal: bool) -> bool {
    match choice {
        Some(ColorChoice::Always) => true,
        Some(ColorChoice::Never) => false,
        Some(ColorChoice::Auto) => stdout_is_terminal && !no_color_env,
        None => !no_color_env,
    }
}

/// Renders Markdown for display. Must fall back to the input rather than fail.
pub trait Highlighter {
    fn highlight(&self, markdown: &str) -> String;
}

/// Leaves text untouched.
pub struct PlainHighlighter;

impl Highlighter for PlainHighlighter {
    fn highlight(&self, markdown: &str) -> String {
        markdown.to_string()
    }
}

/// 24-bit ANSI colouring of Markdown via syntect.
pub struct SyntectHighlighter {
    theme: String,
}

impl SyntectHighlighter {
    pub fn new() -> Self {
        Self::with_theme(THEME)
    }

    pub fn with_theme(theme: &str) -> Self {
        Self {
            theme: theme.to_string(),
        }
    }

    fn try_highlight(&self, markdown: &str) -> Result<String, String> {
        let syntax = SYNTAX_SET
            .find_syntax_by_extension("md")
            .ok_or_else(|| "no Markdown syntax available".to_string())?;
        let theme = THEME_SET
            .themes
            .get(&self.theme)
            .ok_or_else(|| format!("theme '{}' not found", self.theme))?;

        let mut highlighter = HighlightLines::new(syntax, theme);
        let mut out = String::with_capacity(markdown.len() * 2);
        for line in LinesWithEndings::from(markdown) {
            let ranges: Vec<(Style, &str)> = highlighter
                .highlight_line(line, &SYNTAX_SET)
                .map_err(|e| e.to_string())?;
            out.push_str(&as_24_bit_terminal_escaped(&ranges, false));
        }
        out.push_str(RESET);
        Ok(out)
    }
}

impl Default for SyntectHighlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl Highlighter for SyntectHighlighter {
    fn highlight(&self, markdown: &str) -> String {
        match self.try_highlight(markdown) {
            Ok(highlighted) => highlighted,
            Err(reason) => {
                debug!("Highlighting unavailable, printing plain text: {}", reason);
                markdown.to_string()
            }
        }
    }
}
