//! # Observability
//!
//! Provides a simple, configurable interface for initializing tracing output
//! for `skill-pipeline`.
//!
//! The pipeline opens a `pipeline_run` span per run and a `skill_invocation`
//! span per skill call; breaker transitions and skill failures are logged as
//! events inside them.

use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Configuration for initializing the observability system.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// The maximum log level to capture.
    pub level: Level,
    /// The target for the logs.
    pub target: LogTarget,
    pub format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            target: LogTarget::default(),
            format: LogFormat::default(),
        }
    }
}

/// Defines the output target for logs.
#[derive(Debug, Clone, Default)]
pub enum LogTarget {
    /// Log to the console (stdout).
    #[default]
    Console,
    /// Log to a file.
    File(String),
}

/// Line format of the emitted logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line, with span fields.
    Json,
}

/// Builds the filter used by [`init`]: `RUST_LOG` plus a directive for this crate.
pub fn build_filter(level: Level) -> Result<EnvFilter, Box<dyn std::error::Error>> {
    Ok(EnvFilter::from_default_env().add_directive(format!("skill_pipeline={}", level).parse()?))
}

/// Initializes the global tracing subscriber.
///
/// Call this once at the beginning of your application's main function.
///
/// # Errors
///
/// Returns an error if the log file cannot be created or if a global
/// subscriber has already been set.
pub fn init(config: ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = build_filter(config.level)?;
    let subscriber = tracing_subscriber::registry().with(filter);

    match (config.target, config.format) {
        (LogTarget::Console, LogFormat::Pretty) => {
            let layer = fmt::layer().with_writer(std::io::stdout);
            subscriber.with(layer).try_init()?;
        }
        (LogTarget::Console, LogFormat::Json) => {
            let layer = fmt::layer().json().with_writer(std::io::stdout);
            subscriber.with(layer).try_init()?;
        }
        (LogTarget::File(path), format) => {
            let file = Mutex::new(std::fs::File::create(path)?);
            match format {
                LogFormat::Pretty => {
                    let layer = fmt::layer().with_ansi(false).with_writer(file);
                    subscriber.with(layer).try_init()?;
                }
                LogFormat::Json => {
                    let layer = fmt::layer().json().with_writer(file);
                    subscriber.with(layer).try_init()?;
                }
            }
        }
    };

    Ok(())
}
