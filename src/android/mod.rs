//! Android-specific implementations.
//!
//! This module is only compiled on Android builds (`target_os = "android"`).
//! It provides:
//!
//! - **Node.js entry point** - `node::Start` from nodejs-mobile's `libnode.so`
//! - **JNI exports** - the native methods `MainActivity` declares as `external`
//! - **Logcat** - a `tracing` layer and a console sink writing to `liblog`
//!
//! ## Startup
//!
//! 1. `System.loadLibrary` runs `JNI_OnLoad`, which routes logging to logcat
//! 2. Optionally `configureBridge(json)` replaces the default `BridgeConfig`
//! 3. `startNodeWithArguments(args)` or `startNodeProject(dir)` blocks the
//!    calling thread until Node returns; the activity calls it from a worker thread

#![cfg(target_os = "android")]

pub mod jni_exports;
pub mod log;
pub mod node_bridge;

pub use log::{AndroidLogLayer, AndroidLogSink};
pub use node_bridge::NodeRuntime;
