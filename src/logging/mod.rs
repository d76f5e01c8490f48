//! Structured logging setup and helpers.
//!
//! Call logs carry `backend`, `model`, `scenario` and `caller_id` fields.
//! Prompt and completion text only appear when content logging is enabled,
//! and then only as a truncated preview.

pub mod fields;

pub use fields::{content_preview, generate_call_id, truncate_content};

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build filter directives string from LoggingConfig
///
/// The base level comes first, followed by one `meridian::<component>=<level>`
/// directive per configured component.
///
/// # Examples
///
/// ```
/// use meridian::config::LoggingConfig;
/// use meridian::logging::build_filter_directives;
///
/// let mut config = LoggingConfig::default();
/// config.component_levels.insert("routing".to_string(), "debug".to_string());
///
/// assert_eq!(build_filter_directives(&config), "info,meridian::routing=debug");
/// ```
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.level.clone();
    for (component, level) in &config.component_levels {
        filter_str.push_str(&format!(",meridian::{}={}", component, level));
    }
    filter_str
}

/// Install the global subscriber. `RUST_LOG` wins over the configured levels.
///
/// Output goes to stderr so command output on stdout stays machine-readable.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter_str = build_filter_directives(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
    }

    if config.enable_content_logging {
        tracing::warn!(
            max_chars = config.content_max_chars,
            "Content logging enabled; prompt previews will appear in logs"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_without_components() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            ..Default::default()
        };
        assert_eq!(build_filter_directives(&config), "warn");
    }

    #[test]
    fn test_filter_components_are_ordered() {
        let mut config = LoggingConfig::default();
        config
            .component_levels
            .insert("workflow".to_string(), "trace".to_string());
        config
            .component_levels
            .insert("gateway".to_string(), "debug".to_string());
        assert_eq!(
            build_filter_directives(&config),
            "info,meridian::gateway=debug,meridian::workflow=trace"
        );
    }
}
