//! Native bridge between a mobile app and an embedded JavaScript runtime.
//!
//! The app hands over a list of startup arguments; the bridge lays them out as
//! `argc`/`argv`, calls the runtime's process-style entry point and returns its
//! exit code. Script `console.log` output is forwarded to the platform log.
//!
//! - [`args`] - argument marshaling into one contiguous buffer
//! - [`entry`] - the runtime trait, [`launch`] and the once-per-process guard
//! - [`console`] - the console bridge and log sinks
//! - [`quickjs_runtime`] - QuickJS-backed runtime used on desktop and in tests
//! - `android` - nodejs-mobile entry point and the JNI exports (Android only)

use std::ffi::OsString;
use std::sync::Arc;

/// Argument marshaling
pub mod args;

/// Bridge configuration
pub mod config;

/// Console bridge and log sinks
pub mod console;

/// Runtime entry boundary
pub mod entry;

/// Launch failures and status sentinels
pub mod error;

/// Logging setup and channel tags
pub mod logging;

/// QuickJS runtime
pub mod quickjs_runtime;

/// Android-specific functionality
#[cfg(target_os = "android")]
pub mod android;

pub use args::{ArgBuffer, ArgVector, NulPolicy};
pub use config::BridgeConfig;
pub use console::{ConsoleBridge, LogSink, Severity, TracingSink};
pub use entry::{launch, status_code, EmbeddedRuntime, ExitStatus};
pub use error::LaunchError;
pub use quickjs_runtime::QuickJsRuntime;

/// Desktop launcher: run this process's own arguments through the bridge on QuickJS.
///
/// `node-bridge [options] script.js [args]` behaves like
/// `node [options] script.js [args]` for the subset QuickJS supports.
pub fn run() -> i32 {
    logging::init();

    let args: Vec<Vec<u8>> = std::env::args_os().map(arg_bytes).collect();
    let config = BridgeConfig::default();
    let mut runtime = QuickJsRuntime::from_config(Arc::new(TracingSink), &config);

    status_code(launch(&mut runtime, &args, &config))
}

/// Raw bytes of a process argument. Unix arguments are passed through as-is,
/// elsewhere they go through lossy UTF-8.
fn arg_bytes(arg: OsString) -> Vec<u8> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        arg.into_vec()
    }
    #[cfg(not(unix))]
    {
        arg.to_string_lossy().into_owned().into_bytes()
    }
}
