//! Log output for the `nlytics` command.
//!
//! Reports (markdown or `--json`) are printed on stdout; pipeline events
//! from [`crate::obs`] and the sandbox go to stderr. `--verbose` lowers the
//! level for the nlytics crates to `DEBUG`, and `RUST_LOG` overrides both.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default directives: `level` for nlytics targets, warnings from dependencies.
fn default_filter(level: Level) -> EnvFilter {
    EnvFilter::new(format!("warn,nlytics_core={level},nlytics={level}"))
}

/// Install the process-wide subscriber. `json` switches stderr to one JSON
/// object per event, matching `--json` reports on stdout. Later calls are
/// ignored.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let installed = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()
    } else {
        tracing_subscriber::registry().with(filter).with(layer).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_scopes_level_to_nlytics() {
        let rendered = default_filter(Level::DEBUG).to_string().to_lowercase();
        assert!(rendered.contains("nlytics_core=debug"));
        assert!(rendered.contains("warn"));
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
    }
}
