//! Bounded agent relay CLI.
//!
//! Reads `relay.toml`, pushes input through the configured agent chain for
//! up to `max_loops` rounds and prints the final output.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use relay::exit_codes;
use relay::io::config::{DEFAULT_CONFIG_PATH, RelayFileConfig, load_config, write_config};
use relay::logging;
use relay::pipeline::{RunOptions, build_engine, run_with_config};

#[derive(Parser)]
#[command(name = "relay", version, about = "Bounded multi-round agent relay")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter `relay.toml`.
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Load the config and check that every chain stage resolves.
    Validate {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Run one relay session and print the final output.
    Run {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// User input. Read from stdin when omitted.
        #[arg(short, long)]
        input: Option<String>,
        /// Print the history summary to stderr.
        #[arg(long)]
        summary: bool,
        /// Write a JSON history snapshot, even if the session fails.
        #[arg(long)]
        history_out: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::for_error(&err));
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { config, force } => cmd_init(&config, force),
        Command::Validate { config } => cmd_validate(&config),
        Command::Run {
            config,
            input,
            summary,
            history_out,
        } => cmd_run(&config, input, summary, history_out.as_deref()),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if !force && path.exists() {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &RelayFileConfig::starter())
        .with_context(|| format!("write {}", path.display()))?;
    println!("{}", path.display());
    Ok(())
}

fn cmd_validate(path: &Path) -> Result<()> {
    let cfg = load_config(path)?;
    build_engine(&cfg)?;
    Ok(())
}

fn cmd_run(
    path: &Path,
    input: Option<String>,
    summary: bool,
    history_out: Option<&Path>,
) -> Result<()> {
    let cfg = load_config(path)?;
    let input = match input {
        Some(input) => input,
        None => read_stdin()?,
    };
    let report = run_with_config(&cfg, &input, &RunOptions { history_out })?;
    if summary {
        eprintln!("{}", report.summary);
    }
    println!("{}", report.outcome.result);
    Ok(())
}

/// Read all of stdin, dropping one trailing newline.
fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("read input from stdin")?;
    if buf.ends_with('\n') {
        buf.pop();
        if buf.ends_with('\r') {
            buf.pop();
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["relay", "init"]);
        match cli.command {
            Command::Init { config, force } => {
                assert_eq!(config, PathBuf::from("relay.toml"));
                assert!(!force);
            }
            _ => panic!("expected init"),
        }
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["relay", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true, .. }));
    }

    #[test]
    fn parse_run_with_options() {
        let cli = Cli::parse_from([
            "relay",
            "run",
            "--config",
            "other.toml",
            "--input",
            "hello",
            "--summary",
            "--history-out",
            "out/history.json",
        ]);
        match cli.command {
            Command::Run {
                config,
                input,
                summary,
                history_out,
            } => {
                assert_eq!(config, PathBuf::from("other.toml"));
                assert_eq!(input.as_deref(), Some("hello"));
                assert!(summary);
                assert_eq!(history_out, Some(PathBuf::from("out/history.json")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_defaults_to_stdin_input() {
        let cli = Cli::parse_from(["relay", "run"]);
        assert!(matches!(
            cli.command,
            Command::Run {
                input: None,
                summary: false,
                history_out: None,
                ..
            }
        ));
    }
}
