//! Tracing initialization with configurable logging formats.

use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingConfig};

/// Install a global subscriber configured from `config`.
///
/// - Console logging in pretty, compact or JSON format
/// - `RUST_LOG` overrides `level` and `filter` when set
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TracingError> {
    tracing_subscriber::registry()
        .with(build_env_filter(config))
        .with(fmt_layer(config))
        .try_init()
        .map_err(|e| TracingError::Init(e.to_string()))
}

fn fmt_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => layer.pretty().with_thread_ids(false).boxed(),
        (LogFormat::Pretty, false) => layer
            .pretty()
            .with_thread_ids(false)
            .without_time()
            .boxed(),
        (LogFormat::Compact, true) => layer.compact().boxed(),
        (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
        (LogFormat::Json, true) => layer.json().with_current_span(true).boxed(),
        (LogFormat::Json, false) => layer
            .json()
            .with_current_span(true)
            .without_time()
            .boxed(),
    }
}

fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    let base_level = config.level.as_str();

    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else if let Some(filter) = &config.filter {
        let combined = format!("{base_level},{filter}");
        EnvFilter::try_new(combined).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else {
        // Quiet the HTTP stack by default
        EnvFilter::new(format!("{base_level},hyper=warn,h2=warn,tower=info"))
    }
}

/// Tracing initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_filter_from_level_and_directives() {
        temp_env::with_var_unset("RUST_LOG", || {
            let config = LoggingConfig {
                level: LogLevel::Debug,
                filter: Some("axum_response_validation=trace".into()),
                ..LoggingConfig::default()
            };
            let filter = build_env_filter(&config).to_string();
            assert!(filter.contains("axum_response_validation=trace"));
            assert!(filter.contains("debug"));
        });
    }

    #[test]
    fn test_rust_log_wins() {
        temp_env::with_var("RUST_LOG", Some("warn"), || {
            let config = LoggingConfig {
                level: LogLevel::Trace,
                ..LoggingConfig::default()
            };
            let filter = build_env_filter(&config).to_string();
            assert!(filter.contains("warn"));
            assert!(!filter.contains("trace"));
        });
    }

    #[test]
    fn test_invalid_directives_fall_back_to_level() {
        temp_env::with_var_unset("RUST_LOG", || {
            let config = LoggingConfig {
                level: LogLevel::Error,
                filter: Some("my_crate=loud".into()),
                ..LoggingConfig::default()
            };
            assert_eq!(build_env_filter(&config).to_string(), "error");
        });
    }

    #[test]
    fn test_every_format_builds_a_subscriber() {
        for format in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            for timestamps in [true, false] {
                let config = LoggingConfig {
                    format,
                    timestamps,
                    file_line: true,
                    ..LoggingConfig::default()
                };
                let subscriber = tracing_subscriber::registry()
                    .with(EnvFilter::new("off"))
                    .with(fmt_layer(&config));
                tracing::subscriber::with_default(subscriber, || {
                    assert!(!tracing::enabled!(tracing::Level::ERROR));
                });
            }
        }
    }
}
