//! Tracing subscriber setup and delivery event logging

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::domain::communication::delivery::{EventLogger, LogFields};

/// Environment variables set by hosted runtimes
const CLOUD_MARKERS: &[&str] = &[
    "K_SERVICE",
    "K_REVISION",
    "RAILWAY_ENVIRONMENT",
    "KUBERNETES_SERVICE_HOST",
    "AWS_LAMBDA_FUNCTION_NAME",
    "HEROKU_APP_NAME",
    "CF_INSTANCE_INDEX",
];

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// JSON when running on a hosted runtime, text otherwise
    #[default]
    Auto,
    /// Human readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    /// Resolves [`LogFormat::Auto`] using `env` to look up environment
    /// variables.
    pub fn resolve(self, env: impl Fn(&str) -> Option<String>) -> Self {
        match self {
            Self::Auto if running_in_cloud(&env) => Self::Json,
            Self::Auto => Self::Text,
            format => format,
        }
    }
}

fn running_in_cloud(env: &impl Fn(&str) -> Option<String>) -> bool {
    let is_set = |name: &str| env(name).is_some_and(|value| !value.is_empty());

    CLOUD_MARKERS.iter().any(|marker| is_set(marker))
        || (is_set("PORT") && env("NODE_ENV").as_deref() == Some("production"))
}

/// Logging configuration
#[derive(Debug, Clone, Parser)]
pub struct LogConfig {
    /// The log filter, e.g. `info` or `resend_smtp_gateway=debug`
    #[clap(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// The log output format
    #[clap(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Auto)]
    pub log_format: LogFormat,
}

/// Installs the global tracing subscriber.
#[mutants::skip]
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("invalid log level {:?}", config.log_level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match config.log_format.resolve(|name| std::env::var(name).ok()) {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        _ => builder.try_init(),
    };

    installed.map_err(|error| anyhow!("failed to install the tracing subscriber: {error}"))
}

/// Writes delivery events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLogger;

fn render(fields: &LogFields) -> String {
    serde_json::to_string(fields).unwrap_or_default()
}

impl EventLogger for TracingEventLogger {
    fn info(&self, event: &str, fields: &LogFields) {
        info!(event = event, fields = %render(fields), "{event}");
    }

    fn error(&self, event: &str, fields: &LogFields) {
        error!(event = event, fields = %render(fields), "{event}");
    }
}
