//! Cleanup of raw model output before it is printed.

use crate::prompt::Mode;
use once_cell::sync::Lazy;
use regex::Regex;

// Chat-template control tokens that some models leak into their output:
// `<|end|>`, `<|eot_id|>`, `<s>`, `</s>`, `[INST]`, `[/INST]`.
static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<\|[A-Za-z0-9_]+\|>|</?s>|\[/?INST\]").expect("marker pattern is valid")
});

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z0-9_+-]*").expect("fence pattern is valid"));

/// Removes model boundary markers.
pub fn strip_markers(text: &str) -> String {
    MARKER_RE.replace_all(text, "").trim().to_string()
}

/// Removes Markdown code-fence delimiters, keeping what they enclosed.
pub fn strip_code_fences(text: &str) -> String {
    FENCE_RE.replace_all(text, "").trim().to_string()
}

pub fn clean(mode: Mode, raw: &str) -> String {
    let text = strip_markers(raw);
    match mode {
        Mode::Generate => strip_code_fences(&text),
        Mode::Explain => text,
    }
}
