//! Centralised tracing initialisation for Strata binaries.
//!
//! Call [`init_tracing`] once at program start to configure the global
//! subscriber with an `EnvFilter` and optional JSON formatting.
//!
//! Calling it again is harmless: the global subscriber can only be set once
//! per process and later calls are ignored.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "STRATA_LOG";

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON log lines.
/// * `level`: default verbosity when neither `STRATA_LOG` nor `RUST_LOG`
///   is set.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = filter_from(
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        level,
    );

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

/// First non-empty, parseable directive set wins: `STRATA_LOG`, then
/// `RUST_LOG`, then `level`.
fn filter_from(strata_log: Option<String>, rust_log: Option<String>, level: Level) -> EnvFilter {
    strata_log
        .into_iter()
        .chain(rust_log)
        .filter(|directives| !directives.trim().is_empty())
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    fn hint(filter: EnvFilter) -> Option<LevelFilter> {
        filter.max_level_hint()
    }

    #[test]
    fn strata_log_takes_precedence_over_rust_log() {
        let filter = filter_from(Some("trace".into()), Some("warn".into()), Level::INFO);
        assert_eq!(hint(filter), Some(LevelFilter::TRACE));
    }

    #[test]
    fn rust_log_applies_when_strata_log_is_unset_or_blank() {
        let filter = filter_from(None, Some("warn".into()), Level::INFO);
        assert_eq!(hint(filter), Some(LevelFilter::WARN));

        let filter = filter_from(Some("  ".into()), Some("error".into()), Level::INFO);
        assert_eq!(hint(filter), Some(LevelFilter::ERROR));
    }

    #[test]
    fn default_level_applies_without_directives() {
        let filter = filter_from(None, None, Level::DEBUG);
        assert_eq!(hint(filter), Some(LevelFilter::DEBUG));
    }
}
