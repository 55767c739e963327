//! Logging bootstrap.
//!
//! Library crates only emit through the `tracing` facade; hosts call
//! [`init_logging`] once early in `main` to get output.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Logger configuration.
///
/// `env_filter` follows the `tracing-subscriber` `EnvFilter` syntax
/// (e.g. `"info"`, `"rxgl_runtime_glow=debug,rxgl_scene=trace"`).
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            ansi: true,
        }
    }
}

static INIT: Once = Once::new();

/// Installs the global subscriber once. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = match config.env_filter {
            Some(directive) => EnvFilter::new(directive),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(config.ansi)
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!("logging initialized");
        }
    });
}
