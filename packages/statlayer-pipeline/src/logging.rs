//! tracing-subscriber setup.

use std::io::IsTerminal;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

const LOG_ENV_VAR: &str = "STATLAYER_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global fmt subscriber.
///
/// Filter comes from `STATLAYER_LOG`, then `RUST_LOG`, then `info`. Safe to
/// call from every test.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let directive = filter_directive(|key| std::env::var(key).ok());
        let env_filter =
            EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

        // try_init: a test harness may already own the global subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr)
            .try_init();

        tracing::debug!("log filter: {}", directive);
    });
}

fn filter_directive(lookup: impl Fn(&str) -> Option<String>) -> String {
    lookup(LOG_ENV_VAR)
        .or_else(|| lookup("RUST_LOG"))
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string())
}
