use anyhow::Result;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const GENERATE_SLOT: &str = "prompt_cache_generate.bin";
const EXPLAIN_SLOT: &str = "prompt_cache_explain.bin";

/// The binary with a private cache directory and home, and no inherited
/// logging or colour settings.
fn command(args: &[&str], dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_zsh-llm-suggestions"));
    cmd.args(args)
        .env("HOME", dir)
        .env("ZSH_LLM_SUGGESTIONS_CACHE_DIR", dir)
        .env_remove("RUST_LOG")
        .env_remove("NO_COLOR")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Feeds stdin and collects the output. The child may exit before reading
/// stdin (bad arguments, `--clear-cache`), so a closed pipe is not an error.
fn run(mut cmd: Command, stdin: &str) -> Result<Output> {
    let mut child = cmd.spawn()?;
    if let Some(mut input) = child.stdin.take() {
        match input.write_all(stdin.as_bytes()) {
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
            other => other?,
        }
    }
    Ok(child.wait_with_output()?)
}

/// Helper to run the binary with the mock backend.
fn run_cli(args: &[&str], stdin: &str, dir: &Path) -> Result<Output> {
    let mut cmd = command(args, dir);
    // Enable mock mode for deterministic testing
    cmd.env("ZSH_LLM_SUGGESTIONS_USE_MOCK", "1");
    run(cmd, stdin)
}

fn mock_turns(path: &Path) -> Option<u64> {
    let bytes = std::fs::read(path).ok()?;
    let state: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    state["turns"].as_u64()
}

#[test]
fn test_generate_without_cache_creates_slot() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run_cli(&["generate"], "list files sorted by size", dir.path())?;

    assert!(output.status.success(), "Generation should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "ls -lS\n", "Only the cleaned command goes to stdout");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("creating cache"), "Should report cache creation. Stderr: {}", stderr);

    assert_eq!(mock_turns(&dir.path().join(GENERATE_SLOT)), Some(1));
    assert!(!dir.path().join(EXPLAIN_SLOT).exists());

    Ok(())
}

#[test]
fn test_second_run_reuses_cache() -> Result<()> {
    let dir = TempDir::new()?;
    run_cli(&["generate"], "list files sorted by size", dir.path())?;
    let output = run_cli(&["generate", "-v"], "show disk usage", dir.path())?;

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "df -h\n");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Using prompt cache"), "Stderr: {}", stderr);
    assert_eq!(mock_turns(&dir.path().join(GENERATE_SLOT)), Some(2));

    Ok(())
}

#[test]
fn test_corrupt_cache_heals() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join(GENERATE_SLOT), b"\x00\x01 truncated tensor")?;

    let output = run_cli(&["generate"], "list files sorted by size", dir.path())?;

    assert!(output.status.success(), "Corruption must not be fatal");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "ls -lS\n");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unusable"), "Should warn about the bad cache. Stderr: {}", stderr);
    assert!(!stderr.contains("ERROR"));

    assert_eq!(mock_turns(&dir.path().join(GENERATE_SLOT)), Some(1));

    Ok(())
}

#[test]
fn test_explain_mode_highlights_captured_output() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run_cli(&["explain"], "ls -lS", dir.path())?;

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains('\x1b'), "Explanations are coloured even when captured. Stdout: {}", stdout);
    assert!(stdout.contains("the given arguments"), "Stdout: {}", stdout);
    assert!(!stdout.contains("<|end|>"));

    assert_eq!(mock_turns(&dir.path().join(EXPLAIN_SLOT)), Some(1));
    assert!(!dir.path().join(GENERATE_SLOT).exists());

    Ok(())
}

#[test]
fn test_explain_mode_plain_with_no_color_flag() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run_cli(&["explain", "--no-color"], "ls -lS", dir.path())?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("`ls -lS` runs **ls**"), "Stdout: {}", stdout);
    assert!(!stdout.contains('\x1b'));

    Ok(())
}

#[test]
fn test_explain_mode_plain_with_no_color_env() -> Result<()> {
    let dir = TempDir::new()?;
    let mut cmd = command(&["explain"], dir.path());
    cmd.env("ZSH_LLM_SUGGESTIONS_USE_MOCK", "1").env("NO_COLOR", "1");
    let output = run(cmd, "ls -lS")?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("`ls -lS` runs **ls**"), "Stdout: {}", stdout);
    assert!(!stdout.contains('\x1b'));

    Ok(())
}

#[test]
fn test_color_auto_is_plain_when_piped() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run_cli(&["explain", "--color", "auto"], "ls -lS", dir.path())?;

    assert!(output.status.success());
    assert!(!String::from_utf8_lossy(&output.stdout).contains('\x1b'));

    Ok(())
}

#[test]
fn test_clear_cache_removes_slots() -> Result<()> {
    let dir = TempDir::new()?;
    run_cli(&["generate"], "list files", dir.path())?;
    run_cli(&["explain"], "ls -la", dir.path())?;

    let output = run_cli(&["--clear-cache"], "", dir.path())?;
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(!dir.path().join(GENERATE_SLOT).exists());
    assert!(!dir.path().join(EXPLAIN_SLOT).exists());

    let again = run_cli(&["--clear-cache"], "", dir.path())?;
    assert!(again.status.success(), "Clearing twice is fine");

    Ok(())
}

#[test]
fn test_no_cache_writes_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run_cli(&["generate", "--no-cache"], "list processes", dir.path())?;

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "ps aux\n");
    assert!(!dir.path().join(GENERATE_SLOT).exists());

    Ok(())
}

#[test]
fn test_empty_request_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run_cli(&["generate"], "  \n", dir.path())?;

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ERROR:"));

    Ok(())
}

#[test]
fn test_unknown_mode_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run_cli(&["summarize"], "ls", dir.path())?;

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());

    Ok(())
}

#[test]
fn test_unreachable_backend_is_reported() -> Result<()> {
    let dir = TempDir::new()?;
    let mut cmd = command(&["generate", "--backend", "ollama"], dir.path());
    cmd.env("ZSH_LLM_SUGGESTIONS_OLLAMA_HOST", "http://127.0.0.1:9")
        .env_remove("ZSH_LLM_SUGGESTIONS_USE_MOCK");
    let output = run(cmd, "list files")?;

    assert!(!output.status.success());
    assert!(output.stdout.is_empty(), "No answer on stdout after a fatal error");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not reach backend 'ollama'"), "Stderr: {}", stderr);

    Ok(())
}
