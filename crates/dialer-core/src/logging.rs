//! Logging setup for binaries embedding the dialer core
//!
//! The library itself only emits `tracing` events; a binary calls
//! [`setup_logging`] once at start-up to install a subscriber on stderr.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{DialerError, DialerResult};

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// How the dialer binary logs
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Base level; `RUST_LOG` directives are applied on top
    pub level: Level,
    pub format: LogFormat,
    /// Print the source file and line of each event
    pub source_locations: bool,
    /// Log when spans such as a lookup or a replay step open and close
    pub span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(Level::WARN)
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        LoggingConfig {
            level,
            format: LogFormat::Text,
            source_locations: false,
            span_events: false,
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_source_locations(mut self, enabled: bool) -> Self {
        self.source_locations = enabled;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    fn fmt_span(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already installed.
pub fn setup_logging(config: &LoggingConfig) -> DialerResult<()> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(config.level.into()))
        .with_span_events(config.fmt_span())
        .with_file(config.source_locations)
        .with_line_number(config.source_locations)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| DialerError::config(format!("cannot install log subscriber: {}", e)))?;

    tracing::debug!("Logging at {} ({:?})", config.level, config.format);
    Ok(())
}

/// Parse a log level name such as `debug` or `WARN`
pub fn parse_log_level(level: &str) -> DialerResult<Level> {
    Level::from_str(level).map_err(|_| DialerError::config(format!("unknown log level '{}'", level)))
}
