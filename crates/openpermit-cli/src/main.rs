//! Operator CLI for the OpenPermit chat bridge
//!
//! Derives room aliases, renders and validates permit event documents, and
//! runs a self-contained demo of the bridge on an in-memory homeserver.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

use commands::{
    alias::{self, AliasCommand},
    common,
    demo::{self, DemoCommand},
    event::{self, BuildEventCommand},
    validate::{self, ValidateCommand},
};

#[derive(Parser)]
#[command(name = "openpermit-bridge")]
#[command(about = "OpenPermit - permit workflow to chat room bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Bridge configuration file (TOML); falls back to the environment
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the room alias for a permit
    Alias(AliasCommand),

    /// Build a permit event document and print it
    BuildEvent(BuildEventCommand),

    /// Validate a permit event document against the shape set
    Validate(ValidateCommand),

    /// Run the bridge end to end on an in-memory homeserver
    Demo(DemoCommand),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Alias(cmd) => {
            let settings = common::alias_settings(config)?;
            println!("{}", alias::run(&cmd, &settings));
            Ok(ExitCode::SUCCESS)
        }
        Commands::BuildEvent(cmd) => {
            let shapes = common::shape_source(config, cmd.shapes.as_deref())?;
            event::run(&cmd, shapes)
        }
        Commands::Validate(cmd) => {
            let shapes = common::shape_source(config, cmd.shapes.as_deref())?;
            validate::run(&cmd, shapes)
        }
        Commands::Demo(cmd) => {
            demo::run(&cmd).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "openpermit-bridge",
            "alias",
            "PERMIT-1",
            "--verbose",
            "--config",
            "bridge.toml",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("bridge.toml")));
        assert!(matches!(cli.command, Commands::Alias(_)));
    }

    #[test]
    fn build_event_requires_a_type() {
        assert!(Cli::try_parse_from(["openpermit-bridge", "build-event", "PERMIT-1"]).is_err());
        assert!(Cli::try_parse_from([
            "openpermit-bridge",
            "build-event",
            "PERMIT-1",
            "--type",
            "approval",
            "--payload",
            r#"{"approvedBy":"bob"}"#,
        ])
        .is_ok());
    }
}
