use crate::env::SABI_LOGGER_LOG_ENV;
use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Directives used when `SABI_LOGGER_LOG` is unset: warnings and errors only.
pub const DEFAULT_FILTER: &str = "sabi_logger=warn";

/// Diagnostics output settings.
///
/// **Fields**
/// - `filter`: `EnvFilter` directives. `SABI_LOGGER_LOG` wins when set.
/// - `enable_ansi`: colorize console output.
/// - `show_target`: print the `sabi_logger` target next to each line.
#[derive(Clone, Debug)]
pub struct DiagnosticsConfig {
    pub filter: String,
    pub enable_ansi: bool,
    pub show_target: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            enable_ansi: true,
            show_target: false,
        }
    }
}

impl DiagnosticsConfig {
    /// Filter actually applied: the environment override or `self.filter`.
    pub fn effective_filter(&self) -> Result<EnvFilter, InitError> {
        self.filter_with_override(std::env::var(SABI_LOGGER_LOG_ENV).ok().as_deref())
    }

    fn filter_with_override(&self, directives: Option<&str>) -> Result<EnvFilter, InitError> {
        match directives {
            Some(directives) if !directives.trim().is_empty() => Ok(EnvFilter::try_new(directives)?),
            _ => Ok(EnvFilter::try_new(&self.filter)?),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install a console subscriber for this crate's diagnostics.
///
/// The library never does this on its own; hosts that already configure
/// `tracing` keep their subscriber and should not call it. Returns
/// [`InitError::AlreadyInstalled`] instead of panicking when a global
/// subscriber exists.
pub fn init_diagnostics(config: DiagnosticsConfig) -> Result<(), InitError> {
    let filter = config.effective_filter()?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(config.enable_ansi)
        .with_target(config.show_target);

    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// [`init_diagnostics`] with [`DiagnosticsConfig::default`].
pub fn init_default_diagnostics() -> Result<(), InitError> {
    init_diagnostics(DiagnosticsConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_directives_are_reported() {
        let config = DiagnosticsConfig {
            filter: "sabi_logger=notalevel".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.filter_with_override(None), Err(InitError::Filter(_))));
        assert!(matches!(config.filter_with_override(Some("  ")), Err(InitError::Filter(_))));
    }

    #[test]
    fn override_replaces_configured_filter() {
        let config = DiagnosticsConfig {
            filter: "sabi_logger=notalevel".to_string(),
            ..Default::default()
        };
        let filter = config.filter_with_override(Some("sabi_logger=debug")).unwrap();
        assert_eq!(filter.to_string(), "sabi_logger=debug");

        let bad_override = DiagnosticsConfig::default().filter_with_override(Some("sabi_logger=nope"));
        assert!(matches!(bad_override, Err(InitError::Filter(_))));
    }

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
