//! Entry point boundary.
//!
//! [`launch`] marshals the arguments, hands `argc`/`argv` to an
//! [`EmbeddedRuntime`] and blocks until it returns. The argument buffer lives
//! exactly as long as that call.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info};

use crate::args::{ArgBuffer, ArgVector};
use crate::config::BridgeConfig;
use crate::error::LaunchError;
use crate::logging::NATIVE_TAG;

/// A script runtime started through a process-style `main(argc, argv)`.
pub trait EmbeddedRuntime {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Run to completion and return the runtime's exit code.
    fn start(&mut self, argv: &mut ArgVector<'_>) -> i32;
}

/// The runtime ran and returned this code. Zero means success; any other
/// value is the runtime's own and is not interpreted here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitStatus {
    code: i32,
}

impl ExitStatus {
    pub fn from_code(code: i32) -> Self {
        Self { code }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Guards against starting a runtime twice in one process.
#[derive(Debug, Default)]
pub struct StartGuard {
    started: AtomicBool,
}

impl StartGuard {
    pub const fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
        }
    }

    /// Returns false if the guard was already claimed.
    pub fn claim(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }

    /// Hand the guard back. Only used when the runtime was never entered.
    pub fn release(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    pub fn is_claimed(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

static PROCESS_GUARD: StartGuard = StartGuard::new();

/// Start `runtime` with `args` using the process-wide start guard.
pub fn launch<R, S>(
    runtime: &mut R,
    args: &[S],
    config: &BridgeConfig,
) -> Result<ExitStatus, LaunchError>
where
    R: EmbeddedRuntime + ?Sized,
    S: AsRef<[u8]>,
{
    launch_with_guard(&PROCESS_GUARD, runtime, args, config)
}

/// Same as [`launch`] with an explicit guard.
///
/// The guard is only consulted when `config.single_start` is set. It stays
/// claimed once the runtime has been entered, whatever the outcome.
pub fn launch_with_guard<R, S>(
    guard: &StartGuard,
    runtime: &mut R,
    args: &[S],
    config: &BridgeConfig,
) -> Result<ExitStatus, LaunchError>
where
    R: EmbeddedRuntime + ?Sized,
    S: AsRef<[u8]>,
{
    info!(target: NATIVE_TAG, "Starting {} with arguments", runtime.name());

    if config.single_start && !guard.claim() {
        error!(target: NATIVE_TAG, "{} has already been started in this process", runtime.name());
        return Err(LaunchError::AlreadyStarted);
    }

    info!(target: NATIVE_TAG, "Argument count: {}", args.len());
    for (i, arg) in args.iter().enumerate() {
        info!(target: NATIVE_TAG, "Argument {}: {}", i, String::from_utf8_lossy(arg.as_ref()));
    }

    let mut buffer = match ArgBuffer::marshal(args, config.nul_policy, config.max_argument_bytes) {
        Ok(buffer) => buffer,
        Err(e) => {
            if config.single_start {
                guard.release();
            }
            return Err(e);
        }
    };
    info!(target: NATIVE_TAG, "Allocated arguments buffer: {} bytes", buffer.len());

    let code = {
        let mut argv = buffer.vector();
        info!(target: NATIVE_TAG, "Before calling {} entry point", runtime.name());
        runtime.start(&mut argv)
    };
    info!(target: NATIVE_TAG, "After calling {} entry point, result: {}", runtime.name(), code);

    drop(buffer);
    info!(target: NATIVE_TAG, "Freed arguments buffer");

    Ok(ExitStatus::from_code(code))
}

/// Collapse a launch outcome into the integer handed back to the managed caller.
///
/// The mapping is lossy: a runtime that itself exits with `-1` to `-7` yields
/// the same integer as the matching sentinel in [`crate::error`]. Callers that
/// need to tell them apart keep the `Result` instead.
pub fn status_code(outcome: Result<ExitStatus, LaunchError>) -> i32 {
    match outcome {
        Ok(status) => status.code(),
        Err(e) => {
            error!(target: NATIVE_TAG, "Launch failed: {}", e);
            e.sentinel()
        }
    }
}
