//! Node.js (nodejs-mobile) as the embedded runtime.
//!
//! `libnode.so` exports the C++ entry point `node::Start(int, char**)`. It
//! has no C wrapper, so it is bound by its Itanium-mangled name. `build.rs`
//! adds the link directives.
//!
//! Node can only be started once per process. `BridgeConfig::single_start`
//! defaults to true so a second start fails fast instead of crashing inside V8.

#![cfg(target_os = "android")]

use std::ffi::{c_char, c_int};
use std::path::Path;

use tracing::{error, info};

use crate::args::ArgVector;
use crate::config::BridgeConfig;
use crate::entry::{launch, EmbeddedRuntime, ExitStatus};
use crate::error::LaunchError;
use crate::logging::NATIVE_TAG;

extern "C" {
    /// `int node::Start(int argc, char** argv)`
    #[link_name = "_ZN4node5StartEiPPc"]
    fn node_start(argc: c_int, argv: *mut *mut c_char) -> c_int;
}

/// Runs Node on the calling thread until its event loop drains.
#[derive(Clone, Copy, Debug, Default)]
pub struct NodeRuntime;

impl EmbeddedRuntime for NodeRuntime {
    fn name(&self) -> &str {
        "Node.js"
    }

    fn start(&mut self, argv: &mut ArgVector<'_>) -> i32 {
        // SAFETY: argv holds argc pointers to NUL-terminated strings in a
        // buffer that stays alive and exclusively borrowed for this call
        unsafe { node_start(argv.argc(), argv.as_mut_ptr()) }
    }
}

/// Start Node with `<program> <options...> <project_dir>/<entry_script>`.
pub fn start_project(project_dir: &Path, config: &BridgeConfig) -> Result<ExitStatus, LaunchError> {
    let entry = config.entry_script_path(project_dir);
    if !entry.is_file() {
        error!(target: NATIVE_TAG, "[NodeBridge] {} not found", entry.display());
        return Err(LaunchError::MissingEntryScript(entry));
    }
    info!(target: NATIVE_TAG, "[NodeBridge] Starting project {}", project_dir.display());

    let argv = config.argv_for_project(project_dir);
    launch(&mut NodeRuntime, &argv, config)
}
