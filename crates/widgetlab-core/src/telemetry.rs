//! Tracing setup for the `widgetlab` binary and the dev server it embeds.
//!
//! Without `RUST_LOG`, the widgetlab crates log at the requested level while the chatty
//! dependencies (browser protocol, HTTP stack, JS engine) are held at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const WIDGETLAB_TARGETS: &[&str] = &[
    "widgetlab",
    "widgetlab_core",
    "widgetlab_bench",
    "widgetlab_server",
];

/// Dependencies whose debug output drowns the benchmark log.
const QUIET_TARGETS: &[&str] = &[
    "chromiumoxide",
    "tungstenite",
    "hyper",
    "hyper_util",
    "reqwest",
    "boa_engine",
];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let baseline = if level < Level::WARN { level } else { Level::WARN };
    let level = level.as_str().to_ascii_lowercase();
    let quiet = baseline.as_str().to_ascii_lowercase();

    let mut directives = vec![quiet.clone()];
    directives.extend(WIDGETLAB_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.extend(QUIET_TARGETS.iter().map(|t| format!("{t}={quiet}")));
    directives.join(",")
}

/// Install the global subscriber. Only the first call takes effect.
///
/// Human output goes to stderr so `widgetlab compile --json` and `render` keep stdout
/// clean; `json` switches to one JSON object per event.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_quiet_dependencies() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.starts_with("warn,"), "{directives}");
        assert!(directives.contains("widgetlab_bench=debug"));
        assert!(directives.contains("chromiumoxide=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_default_directives_respect_quieter_level() {
        let directives = default_directives(Level::ERROR);
        assert!(directives.starts_with("error,"), "{directives}");
        assert!(directives.contains("widgetlab_core=error"));
        assert!(directives.contains("boa_engine=error"));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
        tracing::info!("still logging");
    }
}
