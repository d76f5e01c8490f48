//! Command-line interface for Meridian
//!
//! # Commands
//!
//! - `models` - List the model catalog across all backends
//! - `health` - Probe every backend and show its status
//! - `generate` - Send one prompt through the gateway
//! - `alerts` - Run canary calls and evaluate alert thresholds
//! - `config` - Configuration utilities (init)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! meridian config init
//! meridian models --json
//! meridian generate "Summarize RFC 9110" --scenario summarization
//! meridian completions zsh > ~/.zfunc/_meridian
//! ```

pub mod alerts;
pub mod bootstrap;
pub mod completions;
pub mod config;
pub mod generate;
pub mod health;
pub mod models;
pub mod output;

pub use bootstrap::Runtime;
pub use completions::handle_completions;
pub use config::handle_config_init;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "meridian.toml";

/// Meridian - inference routing and workflow orchestration
#[derive(Parser, Debug)]
#[command(
    name = "meridian",
    version,
    about = "Route inference requests across heterogeneous LLM backends"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available models
    Models(ModelsArgs),
    /// Probe backend health
    Health(HealthArgs),
    /// Generate a completion
    Generate(GenerateArgs),
    /// Evaluate alert thresholds against canary calls
    Alerts(AlertsArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Options shared by every command that loads a configuration.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,
}

#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Only list models of this backend
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Include unavailable models
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct HealthArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// Prompt text; optional when --template is given
    pub prompt: Option<String>,

    /// Scenario used to pick a selection strategy
    #[arg(short, long, default_value = "general")]
    pub scenario: String,

    /// Pin a model as backend:model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Caller id for access control and usage records
    #[arg(long, default_value = "cli")]
    pub caller: String,

    /// Named template from the configuration
    #[arg(short, long)]
    pub template: Option<String>,

    /// Template variable as name=value (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    #[arg(long)]
    pub system: Option<String>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub temperature: Option<f32>,

    /// Print fragments as they arrive
    #[arg(long, conflicts_with = "json")]
    pub stream: bool,

    /// Print the full response as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AlertsArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// Canary prompt sent to every available model
    #[arg(long, default_value = "ping")]
    pub prompt: String,

    /// Canary calls per model
    #[arg(short, long, default_value_t = 1)]
    pub rounds: u32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Also print the Prometheus exposition gathered during the canaries
    #[arg(long)]
    pub prometheus: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write an annotated example configuration
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parse_models_defaults() {
        let cli = Cli::try_parse_from(["meridian", "models"]).unwrap();
        match cli.command {
            Commands::Models(args) => {
                assert_eq!(args.common.config, PathBuf::from(DEFAULT_CONFIG_PATH));
                assert!(!args.json);
                assert!(args.backend.is_none());
            }
            _ => panic!("Expected Models command"),
        }
    }

    #[test]
    fn test_cli_parse_generate() {
        let cli = Cli::try_parse_from([
            "meridian",
            "generate",
            "hello",
            "-s",
            "resume-parsing",
            "--var",
            "a=1",
            "--var",
            "b=2",
            "-c",
            "custom.toml",
        ])
        .unwrap();
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.prompt.as_deref(), Some("hello"));
                assert_eq!(args.scenario, "resume-parsing");
                assert_eq!(args.vars, vec!["a=1", "b=2"]);
                assert_eq!(args.common.config, PathBuf::from("custom.toml"));
                assert_eq!(args.caller, "cli");
            }
            _ => panic!("Expected Generate command"),
        }
    }

    #[test]
    fn test_cli_stream_conflicts_with_json() {
        let result = Cli::try_parse_from(["meridian", "generate", "x", "--stream", "--json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_alerts_rounds() {
        let cli = Cli::try_parse_from(["meridian", "alerts", "-r", "3"]).unwrap();
        match cli.command {
            Commands::Alerts(args) => {
                assert_eq!(args.rounds, 3);
                assert_eq!(args.prompt, "ping");
                assert!(!args.prometheus);
            }
            _ => panic!("Expected Alerts command"),
        }
    }

    #[test]
    fn test_cli_parse_config_init() {
        let cli = Cli::try_parse_from(["meridian", "config", "init", "--force"]).unwrap();
        match cli.command {
            Commands::Config(ConfigCommands::Init(args)) => {
                assert!(args.force);
                assert_eq!(args.output, PathBuf::from(DEFAULT_CONFIG_PATH));
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_cli_parse_health() {
        let cli = Cli::try_parse_from(["meridian", "health", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Health(args) if args.json));
    }
}
