//! Logging setup and the reconcile span.
//!
//! Every reconcile pass runs inside a [`reconcile_span`], so log lines emitted
//! by the engine carry the controller, kind and object key without repeating
//! them at each call site.

use std::str::FromStr;
use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting the log format.
pub const LOG_FORMAT_ENV: &str = "WARDEN_LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,warden_audit=info";

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for in-cluster deployments.
    Json,
    /// Human-readable output.
    #[default]
    Pretty,
}

impl LogFormat {
    /// Reads [`LOG_FORMAT_ENV`], falling back to [`LogFormat::Pretty`] when
    /// the variable is unset or unrecognized.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Installs the global subscriber. Later calls are no-ops.
///
/// `RUST_LOG` overrides [`DEFAULT_FILTER`].
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let registry = tracing_subscriber::registry().with(filter);

        // A subscriber installed elsewhere (tests, embedding process) wins.
        let _ = match format {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        };
    });
}

/// Creates the span a single reconcile pass runs in.
#[must_use]
pub fn reconcile_span(controller: &str, kind: &str, key: &str) -> Span {
    tracing::info_span!("reconcile", controller = controller, kind = kind, key = key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" text ".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn init_logging_tolerates_repeat_calls() {
        init_logging(LogFormat::Json);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn reconcile_span_can_be_entered() {
        let span = reconcile_span("resource", "Pod", "default/web");
        let _guard = span.enter();
        tracing::debug!("inside reconcile span");
    }
}
