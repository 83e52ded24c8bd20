//! Native methods declared by `com.example.mobilecontextserver.MainActivity`.
//!
//! ```kotlin
//! external fun configureBridge(json: String): Int
//! external fun startNodeWithArguments(arguments: Array<String>): Int
//! external fun startNodeProject(projectDir: String): Int
//! external fun startQuickJsWithArguments(arguments: Array<String>): Int
//! ```
//!
//! Every start call blocks until the runtime returns and yields its exit code,
//! or one of the negative sentinels in `crate::error` if it never ran.

#![cfg(target_os = "android")]

use std::ffi::c_void;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use jni::objects::{JObject, JObjectArray, JString};
use jni::sys::{jint, JNI_VERSION_1_6};
use jni::{JNIEnv, JavaVM};
use tracing::{info, warn};

use super::log::AndroidLogSink;
use super::node_bridge::{self, NodeRuntime};
use crate::config::BridgeConfig;
use crate::entry::{launch, status_code};
use crate::error::LaunchError;
use crate::logging::{self, NATIVE_TAG};
use crate::quickjs_runtime::QuickJsRuntime;

/// Configuration in effect for this process. Fixed on first use.
static CONFIG: OnceLock<BridgeConfig> = OnceLock::new();

fn bridge_config() -> &'static BridgeConfig {
    CONFIG.get_or_init(BridgeConfig::default)
}

#[no_mangle]
pub extern "system" fn JNI_OnLoad(_vm: JavaVM, _reserved: *mut c_void) -> jint {
    logging::init();
    info!(target: NATIVE_TAG, "[NodeBridge] Native library loaded");
    JNI_VERSION_1_6
}

/// Copy a `String[]` into owned Rust strings, in order.
fn read_string_array(env: &mut JNIEnv<'_>, array: &JObjectArray<'_>) -> Result<Vec<String>, String> {
    let count = env.get_array_length(array)
        .map_err(|e| format!("Failed to get argument count: {}", e))?;

    let mut args = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
    for i in 0..count {
        let element = env.get_object_array_element(array, i)
            .map_err(|e| format!("Failed to get argument {}: {}", i, e))?;
        let jargument = JString::from(element);
        let argument: String = env.get_string(&jargument)
            .map_err(|e| format!("Failed to convert argument {}: {}", i, e))?
            .into();
        // Free the local ref now; long argument lists would overflow the local table
        env.delete_local_ref(jargument)
            .map_err(|e| format!("Failed to release argument {}: {}", i, e))?;
        args.push(argument);
    }

    Ok(args)
}

fn read_string(env: &mut JNIEnv<'_>, value: &JString<'_>) -> Result<String, LaunchError> {
    env.get_string(value)
        .map(String::from)
        .map_err(|e| LaunchError::Jni(format!("Failed to convert string: {}", e)))
}

#[no_mangle]
pub extern "system" fn Java_com_example_mobilecontextserver_MainActivity_configureBridge<'local>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    json: JString<'local>,
) -> jint {
    let outcome = read_string(&mut env, &json)
        .and_then(|json| BridgeConfig::from_json(&json))
        .and_then(|config| CONFIG.set(config).map_err(|_| LaunchError::AlreadyConfigured));

    match outcome {
        Ok(()) => {
            info!(target: NATIVE_TAG, "[NodeBridge] Configuration applied: {:?}", bridge_config());
            0
        }
        Err(e) => {
            warn!(target: NATIVE_TAG, "[NodeBridge] Configuration rejected: {}", e);
            e.sentinel()
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_example_mobilecontextserver_MainActivity_startNodeWithArguments<'local>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    arguments: JObjectArray<'local>,
) -> jint {
    let outcome = read_string_array(&mut env, &arguments)
        .map_err(LaunchError::Jni)
        .and_then(|args| launch(&mut NodeRuntime, &args, bridge_config()));
    status_code(outcome)
}

#[no_mangle]
pub extern "system" fn Java_com_example_mobilecontextserver_MainActivity_startNodeProject<'local>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    project_dir: JString<'local>,
) -> jint {
    let outcome = read_string(&mut env, &project_dir)
        .and_then(|dir| node_bridge::start_project(Path::new(&dir), bridge_config()));
    status_code(outcome)
}

/// QuickJS with `console.log` routed to logcat. Unlike Node it can be started repeatedly.
#[no_mangle]
pub extern "system" fn Java_com_example_mobilecontextserver_MainActivity_startQuickJsWithArguments<'local>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    arguments: JObjectArray<'local>,
) -> jint {
    let config = BridgeConfig {
        single_start: false,
        ..bridge_config().clone()
    };
    let mut runtime = QuickJsRuntime::from_config(Arc::new(AndroidLogSink), &config);

    let outcome = read_string_array(&mut env, &arguments)
        .map_err(LaunchError::Jni)
        .and_then(|args| launch(&mut runtime, &args, &config));
    status_code(outcome)
}
