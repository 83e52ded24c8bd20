//! Logging setup.
//!
//! Everything goes through `tracing`. Two fixed targets double as log channel
//! tags: [`NATIVE_TAG`] for bridge diagnostics and [`CONSOLE_TAG`] for output
//! forwarded from script code. On Android the events land in logcat with the
//! target as tag; elsewhere they are printed by the fmt subscriber.

use std::sync::Once;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Channel for diagnostics emitted by the native bridge itself.
pub const NATIVE_TAG: &str = "NodeJS-Native";

/// Channel for text forwarded from script `console.log` calls.
pub const CONSOLE_TAG: &str = "NodeJS-Console";

static INIT: Once = Once::new();

/// Install the global subscriber. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::new("info");

        #[cfg(target_os = "android")]
        let result = tracing_subscriber::registry()
            .with(filter)
            .with(crate::android::log::AndroidLogLayer)
            .try_init();

        #[cfg(not(target_os = "android"))]
        let result = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init();

        if let Err(e) = result {
            eprintln!("[NodeBridge] Logging was already initialized: {}", e);
        }
    });
}
