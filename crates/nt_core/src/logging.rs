use std::str::FromStr;
use std::sync::Once;
use tracing::Level;

static INIT: Once = Once::new();

/// Installs the global fmt subscriber once. `LOG_LEVEL` overrides `default_level`.
pub fn init_logging(default_level: Level) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    INIT.call_once(|| {
        let level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|raw| Level::from_str(&raw).ok())
            .unwrap_or(default_level);
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .init();
    });
}
