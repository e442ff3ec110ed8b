//! Dialer coordination tools
//!
//! `dialer replay` runs a scenario of telephony events and user actions
//! through the coordination engine and prints, for every step, the derived
//! call views, identities, audio state and the commands the engine sent to
//! the telephony stack.
//!
//! ```text
//! dialer replay crates/dialer-cli/scenarios/conference.json -v
//! dialer check-config dialer.toml
//! ```

mod scenario;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::Level;

use dialer_core::config::DialerConfig;
use dialer_core::logging::{parse_log_level, setup_logging, LogFormat, LoggingConfig};

use scenario::Scenario;

#[derive(Parser, Debug)]
#[command(author, version, about = "In-vehicle dialer coordination tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); overrides -v
    #[arg(long, global = true, value_parser = parse_level)]
    log_level: Option<Level>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Include source file and line in log lines
    #[arg(long, global = true)]
    log_source: bool,

    /// Log span open/close events (lookups, replay steps)
    #[arg(long, global = true)]
    log_spans: bool,
}

impl Cli {
    fn logging(&self) -> LoggingConfig {
        let default_level = if self.verbose { Level::DEBUG } else { Level::WARN };
        let format = if self.json_logs { LogFormat::Json } else { LogFormat::Text };
        LoggingConfig::new(self.log_level.unwrap_or(default_level))
            .with_format(format)
            .with_source_locations(self.log_source)
            .with_span_events(self.log_spans)
    }
}

fn parse_level(value: &str) -> Result<Level, String> {
    parse_log_level(value).map_err(|e| e.to_string())
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSON scenario through the engine
    Replay {
        /// Scenario file
        scenario: PathBuf,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print one compact JSON object per step instead of pretty output
        #[arg(long)]
        compact: bool,
    },
    /// Validate a configuration file and print it with defaults filled in
    CheckConfig {
        /// TOML configuration file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.logging())?;

    match cli.command {
        Command::Replay { scenario, config, compact } => {
            let config = load_config(config)?;
            let scenario = Scenario::from_file(&scenario)?;
            let reports = scenario::replay(&scenario, config).await?;
            for report in reports {
                let line = if compact {
                    serde_json::to_string(&report)?
                } else {
                    serde_json::to_string_pretty(&report)?
                };
                println!("{}", line);
            }
        }
        Command::CheckConfig { path } => {
            let config = DialerConfig::from_file(&path)
                .with_context(|| format!("invalid configuration {}", path.display()))?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<DialerConfig> {
    match path {
        Some(path) => DialerConfig::from_file(&path)
            .with_context(|| format!("invalid configuration {}", path.display())),
        None => Ok(DialerConfig::default()),
    }
}
