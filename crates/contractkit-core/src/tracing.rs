//! Log subscriber setup for binaries embedding contractkit.
//!
//! The libraries only emit `tracing` events. A binary installs a subscriber
//! once:
//!
//! ```ignore
//! use contractkit_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::server())?;
//! ```
//!
//! `RUST_LOG`, when set, replaces every directive built here.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Target prefix shared by every contractkit crate.
const CONTRACTKIT: &str = "contractkit";

/// HTTP and socket stacks, chatty below `warn`.
const TRANSPORT_TARGETS: &[&str] = &["axum", "hyper", "reqwest", "tungstenite", "tower"];

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, for a terminal.
    #[default]
    Pretty,
    /// One line per event, no timestamp.
    Compact,
    /// One JSON object per event.
    Json,
}

/// Subscriber settings.
///
/// The filter is `contractkit=<level>` followed by one directive per entry
/// of `targets`, unless `RUST_LOG` or `env_filter` is set.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub level: Level,
    /// Extra per-target levels, applied after `level`.
    pub targets: Vec<(String, Level)>,
    pub format: TracingOutputFormat,
    /// Print source file and line.
    pub location: bool,
    /// Print the module path of each event.
    pub show_target: bool,
    /// Log span open and close, which times dispatch and calls.
    pub span_timing: bool,
    /// Full filter directive; replaces `level` and `targets`.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            targets: TRANSPORT_TARGETS
                .iter()
                .map(|target| (target.to_string(), Level::WARN))
                .collect(),
            format: TracingOutputFormat::Pretty,
            location: false,
            show_target: true,
            span_timing: false,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Compact output for the CLI; warnings only unless `debug`.
    #[must_use]
    pub fn cli(debug: bool) -> Self {
        Self {
            level: if debug { Level::DEBUG } else { Level::WARN },
            format: TracingOutputFormat::Compact,
            location: debug,
            show_target: debug,
            ..Default::default()
        }
    }

    /// JSON lines with span timing for long-running servers.
    #[must_use]
    pub fn server() -> Self {
        Self {
            format: TracingOutputFormat::Json,
            location: true,
            span_timing: true,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the level of one target, replacing an earlier entry for it.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>, level: Level) -> Self {
        let target = target.into();
        self.targets.retain(|(existing, _)| *existing != target);
        self.targets.push((target, level));
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// The filter directive built from `level` and `targets`.
    pub fn directive(&self) -> String {
        std::iter::once(directive(CONTRACTKIT, self.level))
            .chain(
                self.targets
                    .iter()
                    .map(|(target, level)| directive(target, *level)),
            )
            .collect::<Vec<_>>()
            .join(",")
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(filter) = &self.env_filter {
            return Ok(EnvFilter::try_new(filter)?);
        }
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(self.directive())?),
        }
    }
}

fn directive(target: &str, level: Level) -> String {
    format!("{}={}", target, level.as_str().to_ascii_lowercase())
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed or the filter does
/// not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    let span_events = if config.span_timing {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_file(config.location)
        .with_line_number(config.location)
        .with_target(config.show_target)
        .with_span_events(span_events);
    let layer = match config.format {
        TracingOutputFormat::Pretty => base.pretty().boxed(),
        TracingOutputFormat::Compact => base.compact().without_time().boxed(),
        TracingOutputFormat::Json => base.json().boxed(),
    };

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(filter).with(layer))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_quiet_the_transport_stack() {
        let config = TracingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.format, TracingOutputFormat::Pretty);
        assert!(!config.span_timing);
        assert_eq!(
            config.directive(),
            "contractkit=info,axum=warn,hyper=warn,reqwest=warn,tungstenite=warn,tower=warn"
        );
    }

    #[test]
    fn cli_follows_debug_flag() {
        let quiet = TracingConfig::cli(false);
        assert_eq!(quiet.level, Level::WARN);
        assert!(!quiet.location);

        let debug = TracingConfig::cli(true);
        assert_eq!(debug.level, Level::DEBUG);
        assert_eq!(debug.format, TracingOutputFormat::Compact);
        assert!(debug.location);
    }

    #[test]
    fn server_logs_json_with_spans() {
        let config = TracingConfig::server();
        assert_eq!(config.format, TracingOutputFormat::Json);
        assert!(config.span_timing);
    }

    #[test]
    fn target_levels_replace_earlier_entries() {
        let config = TracingConfig {
            targets: Vec::new(),
            ..Default::default()
        }
        .with_target("axum", Level::WARN)
        .with_target("contractkit_server::socket", Level::TRACE)
        .with_target("axum", Level::DEBUG);
        assert_eq!(
            config.directive(),
            "contractkit=info,contractkit_server::socket=trace,axum=debug"
        );
        assert!(EnvFilter::try_new(config.directive()).is_ok());
    }

    #[test]
    fn explicit_filter_wins() {
        let config = TracingConfig::default().with_env_filter("contractkit_server=trace");
        assert!(config.filter().is_ok());

        let broken = TracingConfig::default().with_env_filter("contractkit=loudest");
        assert!(matches!(broken.filter(), Err(TracingError::EnvFilter(_))));
    }
}
