use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use std::io::Read;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use zsh_llm_suggestions::command_router::{CommandRouter, RunOptions};
use zsh_llm_suggestions::config::{BackendKind, Config};
use zsh_llm_suggestions::highlight::ColorChoice;
use zsh_llm_suggestions::prompt::Mode;

fn cli() -> Command {
    Command::new("zsh-llm-suggestions")
        .about("Turn a request on stdin into a zsh command, or explain one")
        .long_about(
            "Reads a natural-language request (generate) or a command (explain) from standard \
             input and prints the model's answer on standard output. Diagnostics go to stderr.",
        )
        .arg(
            Arg::new("mode")
                .help("What to do with the text on stdin")
                .value_parser(["generate", "explain"])
                .required_unless_present_any(["config", "clear-cache"]),
        )
        .arg(
            Arg::new("backend")
                .long("backend")
                .help("Model backend to use")
                .value_parser(["ollama", "lmstudio", "mlx", "mock"])
                .num_args(1),
        )
        .arg(
            Arg::new("no-cache")
                .long("no-cache")
                .help("Start from a fresh model state and do not touch the prompt cache")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("clear-cache")
                .long("clear-cache")
                .help("Remove the saved prompt caches and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("color")
                .long("color")
                .help("Highlight explanations (default: always, unless NO_COLOR is set)")
                .value_parser(["always", "auto", "never"])
                .num_args(1),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Print explanations without highlighting")
                .conflicts_with("color")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Show configuration information")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log more to stderr (-v info, -vv debug)")
                .action(ArgAction::Count),
        )
}

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // stdout carries the answer only.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_count("verbose"));

    let config = Config::load()?;

    if matches.get_flag("config") {
        return config.show_config_info();
    }

    let options = RunOptions {
        backend: matches
            .get_one::<String>("backend")
            .map(|name| name.parse::<BackendKind>())
            .transpose()?,
        no_cache: matches.get_flag("no-cache"),
        color: if matches.get_flag("no-color") {
            Some(ColorChoice::Never)
        } else {
            matches
                .get_one::<String>("color")
                .map(|choice| choice.parse::<ColorChoice>())
                .transpose()?
        },
    };
    let router = CommandRouter::new(config, options);

    if matches.get_flag("clear-cache") {
        let dir = router.clear_cache()?;
        eprintln!("Prompt cache cleared in {}", dir.display());
        return Ok(());
    }

    let mode: Mode = matches
        .get_one::<String>("mode")
        .context("missing mode")?
        .parse()?;

    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("could not read the request from stdin")?;
    debug!("Read {} bytes from stdin", buffer.len());

    let answer = router.process_request(mode, buffer).await?;
    println!("{}", answer);

    Ok(())
}
