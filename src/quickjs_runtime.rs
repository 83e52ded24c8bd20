//! QuickJS as an embedded runtime.
//!
//! Lets the bridge run the same `node <options> main.js <args>` invocation
//! in-process where nodejs-mobile is not available (desktop builds, tests).
//! It provides:
//! - `console.log` through the [`ConsoleBridge`]
//! - a minimal `process` object (`argv`, `execArgv`, `platform`, `exitCode`, `exit`)
//! - evaluation of the entry script and of any pending promise jobs

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use rquickjs::convert::Coerced;
use rquickjs::function::Opt;
use rquickjs::{CatchResultExt, Context, Ctx, Exception, FromJs, Function, Object, Runtime, Value};
use tracing::{error, info};

use crate::args::ArgVector;
use crate::config::BridgeConfig;
use crate::console::{ConsoleBridge, LogSink};
use crate::entry::EmbeddedRuntime;
use crate::logging::NATIVE_TAG;

/// Exit code for a script that threw and never caught.
pub const EXIT_UNCAUGHT_EXCEPTION: i32 = 1;
/// Exit code when no readable entry script was given (Node uses 9 for invalid arguments).
pub const EXIT_INVALID_ARGUMENT: i32 = 9;

/// Message of the uncatchable error `process.exit()` throws to unwind the script.
const EXIT_SIGNAL: &str = "process.exit";

/// Promises rejected with no handler attached, as reported by the engine.
#[derive(Default)]
struct UnhandledRejections {
    pending: Cell<usize>,
    last_reason: RefCell<Option<String>>,
}

impl UnhandledRejections {
    fn track(&self, is_handled: bool, reason: impl FnOnce() -> String) {
        if is_handled {
            // A handler was attached after the rejection was reported
            self.pending.set(self.pending.get().saturating_sub(1));
        } else {
            self.pending.set(self.pending.get() + 1);
            *self.last_reason.borrow_mut() = Some(reason());
        }
    }

    /// Description of an unhandled rejection, if any is left.
    fn outstanding(&self) -> Option<String> {
        if self.pending.get() == 0 {
            return None;
        }
        Some(
            self.last_reason
                .borrow()
                .clone()
                .unwrap_or_else(|| "unknown reason".to_string()),
        )
    }
}

fn describe_reason<'js>(ctx: &Ctx<'js>, reason: Value<'js>) -> String {
    match Coerced::<String>::from_js(ctx, reason) {
        Ok(Coerced(text)) => text,
        Err(_) => {
            let _ = ctx.catch();
            "<unprintable reason>".to_string()
        }
    }
}

pub struct QuickJsRuntime {
    console: ConsoleBridge,
    memory_limit: Option<usize>,
}

impl QuickJsRuntime {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            console: ConsoleBridge::new(sink),
            memory_limit: None,
        }
    }

    pub fn from_config(sink: Arc<dyn LogSink>, config: &BridgeConfig) -> Self {
        Self {
            console: ConsoleBridge::new(sink),
            memory_limit: config.quickjs_memory_limit,
        }
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Evaluate `source` and return the script's exit code.
    /// `Err` carries the description of an uncaught exception.
    fn run(&self, invocation: &Invocation, source: &str) -> Result<i32, String> {
        let runtime = Runtime::new().map_err(|e| format!("Failed to create QuickJS runtime: {}", e))?;
        if let Some(limit) = self.memory_limit {
            runtime.set_memory_limit(limit);
        }

        let context = Context::full(&runtime)
            .map_err(|e| format!("Failed to create QuickJS context: {}", e))?;

        let exit_request: Rc<Cell<Option<i32>>> = Rc::new(Cell::new(None));

        let rejections = Rc::new(UnhandledRejections::default());
        let tracked = rejections.clone();
        runtime.set_host_promise_rejection_tracker(Some(Box::new(
            move |ctx, _promise, reason, is_handled| {
                tracked.track(is_handled, || describe_reason(&ctx, reason));
            },
        )));

        let evaluated = context.with(|ctx| -> Result<(), String> {
            // Console first: nothing may run before it is in place
            self.console
                .install(&ctx)
                .map_err(|e| format!("Failed to install console: {}", e))?;

            setup_process(&ctx, invocation, exit_request.clone())?;

            ctx.eval::<(), _>(source)
                .catch(&ctx)
                .map_err(|e| format!("Uncaught exception: {}", e))
        });
        if let Some(code) = exit_request.get() {
            return Ok(code);
        }
        evaluated?;

        loop {
            let ran = runtime.execute_pending_job();
            if let Some(code) = exit_request.get() {
                return Ok(code);
            }
            match ran {
                Ok(true) => {}
                Ok(false) => break,
                Err(_) => return Err("Uncaught exception in a pending job".to_string()),
            }
        }

        if let Some(reason) = rejections.outstanding() {
            return Err(format!("Unhandled promise rejection: {}", reason));
        }

        context.with(|ctx| -> Result<i32, String> {
            let process: Object = ctx
                .globals()
                .get("process")
                .map_err(|e| format!("process object missing: {}", e))?;
            let code: Option<i32> = process
                .get("exitCode")
                .map_err(|e| format!("Invalid process.exitCode: {}", e))?;
            Ok(code.unwrap_or(0))
        })
    }
}

impl EmbeddedRuntime for QuickJsRuntime {
    fn name(&self) -> &str {
        "QuickJS"
    }

    fn start(&mut self, argv: &mut ArgVector<'_>) -> i32 {
        let invocation = Invocation::from_args(argv.to_strings());

        let Some(script) = invocation.script.as_deref() else {
            error!(target: NATIVE_TAG, "[QuickJS] No entry script in arguments");
            return EXIT_INVALID_ARGUMENT;
        };

        let source = match std::fs::read_to_string(script) {
            Ok(source) => source,
            Err(e) => {
                error!(target: NATIVE_TAG, "[QuickJS] Cannot read entry script {}: {}", script, e);
                return EXIT_INVALID_ARGUMENT;
            }
        };

        info!(target: NATIVE_TAG, "[QuickJS] Running {}", script);
        match self.run(&invocation, &source) {
            Ok(code) => code,
            Err(e) => {
                error!(target: NATIVE_TAG, "[QuickJS] {}", e);
                EXIT_UNCAUGHT_EXCEPTION
            }
        }
    }
}

/// `argv` split the way Node splits it: program, runtime options, script, script arguments.
#[derive(Debug, PartialEq, Eq)]
struct Invocation {
    program: String,
    exec_argv: Vec<String>,
    script: Option<String>,
    script_args: Vec<String>,
}

impl Invocation {
    fn from_args(args: Vec<String>) -> Self {
        let mut iter = args.into_iter();
        let program = iter.next().unwrap_or_default();

        let mut exec_argv = Vec::new();
        let mut script = None;
        for arg in iter.by_ref() {
            if arg.starts_with('-') {
                exec_argv.push(arg);
            } else {
                script = Some(arg);
                break;
            }
        }

        Self {
            program,
            exec_argv,
            script,
            script_args: iter.collect(),
        }
    }

    /// `process.argv` as scripts see it: options are not part of it.
    fn process_argv(&self) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        argv.extend(self.script.iter().cloned());
        argv.extend(self.script_args.iter().cloned());
        argv
    }
}

fn platform() -> &'static str {
    #[cfg(target_os = "android")]
    let platform = "android";
    #[cfg(target_os = "linux")]
    let platform = "linux";
    #[cfg(target_os = "macos")]
    let platform = "darwin";
    #[cfg(target_os = "windows")]
    let platform = "win32";
    #[cfg(not(any(target_os = "android", target_os = "linux", target_os = "macos", target_os = "windows")))]
    let platform = "unknown";

    platform
}

fn setup_process<'js>(
    ctx: &Ctx<'js>,
    invocation: &Invocation,
    exit_request: Rc<Cell<Option<i32>>>,
) -> Result<(), String> {
    let process = Object::new(ctx.clone())
        .map_err(|e| format!("Failed to create process object: {}", e))?;

    process.set("platform", platform())
        .map_err(|e| format!("Failed to set process.platform: {}", e))?;

    process.set("argv", invocation.process_argv())
        .map_err(|e| format!("Failed to set process.argv: {}", e))?;

    process.set("execArgv", invocation.exec_argv.clone())
        .map_err(|e| format!("Failed to set process.execArgv: {}", e))?;

    // process.exit([code]) records the code and unwinds the script. The
    // thrown error is uncatchable: no try/catch or finally in the script runs.
    let exit_fn = Function::new(ctx.clone(), move |ctx: Ctx<'js>, code: Opt<i32>| -> rquickjs::Result<()> {
        let code = match code.0 {
            Some(code) => code,
            None => {
                let process: Object = ctx.globals().get("process")?;
                process.get::<_, Option<i32>>("exitCode")?.unwrap_or(0)
            }
        };
        exit_request.set(Some(code));

        let signal = Exception::from_message(ctx.clone(), EXIT_SIGNAL)?;
        // SAFETY: the context is live for 'js and `signal` is an Error object owned by it
        unsafe {
            rquickjs::qjs::JS_SetUncatchableError(ctx.as_raw().as_ptr(), signal.as_object().as_value().as_raw());
        }
        Err(signal.throw())
    }).map_err(|e| format!("Failed to create process.exit: {}", e))?;
    process.set("exit", exit_fn)
        .map_err(|e| format!("Failed to set process.exit: {}", e))?;

    ctx.globals().set("process", process)
        .map_err(|e| format!("Failed to set process global: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::tests::RecordingSink;
    use crate::entry::{launch_with_guard, StartGuard};
    use std::path::{Path, PathBuf};

    fn config() -> BridgeConfig {
        BridgeConfig {
            single_start: false,
            ..BridgeConfig::default()
        }
    }

    fn write_script(dir: &Path, source: &str) -> PathBuf {
        let path = dir.join("main.js");
        std::fs::write(&path, source).unwrap();
        path
    }

    fn run(runtime: &mut QuickJsRuntime, args: &[String]) -> i32 {
        launch_with_guard(&StartGuard::new(), runtime, args, &config())
            .unwrap()
            .code()
    }

    fn texts(sink: &RecordingSink) -> Vec<String> {
        sink.lines().into_iter().map(|(_, text)| text).collect()
    }

    #[test]
    fn test_invocation_split() {
        let invocation = Invocation::from_args(
            ["node", "--trace-warnings", "-x", "main.js", "--port", "3000"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        assert_eq!(invocation.program, "node");
        assert_eq!(invocation.exec_argv, vec!["--trace-warnings", "-x"]);
        assert_eq!(invocation.script.as_deref(), Some("main.js"));
        assert_eq!(invocation.script_args, vec!["--port", "3000"]);
        assert_eq!(invocation.process_argv(), vec!["node", "main.js", "--port", "3000"]);
    }

    #[test]
    fn test_invocation_without_arguments() {
        let invocation = Invocation::from_args(Vec::new());
        assert_eq!(invocation.program, "");
        assert!(invocation.script.is_none());
        assert_eq!(invocation.process_argv(), vec![""]);
    }

    #[test]
    fn test_script_sees_marshaled_argv() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            r#"
            console.log(JSON.stringify(process.argv));
            console.log(JSON.stringify(process.execArgv));
            "#,
        );
        let script = script.to_string_lossy().into_owned();

        let sink = Arc::new(RecordingSink::default());
        let mut runtime = QuickJsRuntime::new(sink.clone());
        let args: Vec<String> = vec![
            "node".into(),
            "--trace-warnings".into(),
            script.clone(),
            "héllo".into(),
            "".into(),
        ];

        assert_eq!(run(&mut runtime, &args), 0);
        assert_eq!(
            texts(&sink),
            vec![
                serde_json::to_string(&["node", script.as_str(), "héllo", ""]).unwrap(),
                r#"["--trace-warnings"]"#.to_string(),
            ]
        );
    }

    #[test]
    fn test_exit_code_from_process_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "process.exitCode = 3;");
        let mut runtime = QuickJsRuntime::new(Arc::new(RecordingSink::default()));

        let args = vec!["node".to_string(), script.to_string_lossy().into_owned()];
        assert_eq!(run(&mut runtime, &args), 3);
    }

    #[test]
    fn test_process_exit_stops_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            r#"
            console.log("before");
            process.exit(5);
            console.log("after");
            "#,
        );
        let sink = Arc::new(RecordingSink::default());
        let mut runtime = QuickJsRuntime::new(sink.clone());

        let args = vec!["node".to_string(), script.to_string_lossy().into_owned()];
        assert_eq!(run(&mut runtime, &args), 5);
        assert_eq!(texts(&sink), vec!["before"]);
    }

    fn run_source(source: &str) -> (i32, Vec<String>) {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), source);
        let sink = Arc::new(RecordingSink::default());
        let mut runtime = QuickJsRuntime::new(sink.clone());

        let args = vec!["node".to_string(), script.to_string_lossy().into_owned()];
        let code = run(&mut runtime, &args);
        (code, texts(&sink))
    }

    #[test]
    fn test_process_exit_in_promise_job() {
        let (code, lines) = run_source(
            r#"
            Promise.resolve().then(() => { process.exit(4); });
            Promise.resolve().then(() => console.log("next job"));
            "#,
        );
        assert_eq!(code, 4);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_process_exit_cannot_be_caught() {
        let (code, lines) = run_source(
            r#"
            try { process.exit(5); } catch (e) { console.log("caught"); } finally { console.log("finally"); }
            console.log("after");
            "#,
        );
        assert_eq!(code, 5);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_process_exit_inside_to_string() {
        let (code, lines) = run_source(
            r#"
            console.log({ toString() { process.exit(6); } });
            console.log("after");
            "#,
        );
        assert_eq!(code, 6);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_process_exit_without_code_uses_exit_code() {
        let (code, _) = run_source("process.exitCode = 2; process.exit();");
        assert_eq!(code, 2);
    }

    #[test]
    fn test_unhandled_rejection_returns_one() {
        let (code, _) = run_source(r#"Promise.reject(new Error("x"));"#);
        assert_eq!(code, EXIT_UNCAUGHT_EXCEPTION);
    }

    #[test]
    fn test_throw_in_then_returns_one() {
        let (code, lines) = run_source(
            r#"
            Promise.resolve().then(() => { throw new Error("late"); });
            console.log("sync done");
            "#,
        );
        assert_eq!(code, EXIT_UNCAUGHT_EXCEPTION);
        assert_eq!(lines, vec!["sync done"]);
    }

    #[test]
    fn test_handled_rejection_exits_cleanly() {
        let (code, lines) = run_source(
            r#"
            const p = Promise.reject(new Error("x"));
            p.catch((e) => console.log("handled " + e.message));
            "#,
        );
        assert_eq!(code, 0);
        assert_eq!(lines, vec!["handled x"]);
    }

    #[test]
    fn test_unhandled_rejection_reason() {
        let rejections = UnhandledRejections::default();
        assert_eq!(rejections.outstanding(), None);

        rejections.track(false, || "Error: x".to_string());
        assert_eq!(rejections.outstanding().as_deref(), Some("Error: x"));

        rejections.track(true, || unreachable!());
        assert_eq!(rejections.outstanding(), None);
    }

    #[test]
    fn test_uncaught_exception_returns_one() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            r#"
            console.log("starting");
            throw new Error("boom");
            "#,
        );
        let sink = Arc::new(RecordingSink::default());
        let mut runtime = QuickJsRuntime::new(sink.clone());

        let args = vec!["node".to_string(), script.to_string_lossy().into_owned()];
        assert_eq!(run(&mut runtime, &args), EXIT_UNCAUGHT_EXCEPTION);
        assert_eq!(texts(&sink), vec!["starting"]);
    }

    #[test]
    fn test_pending_jobs_run_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            r#"
            Promise.resolve("later").then((v) => console.log(v));
            console.log("now");
            "#,
        );
        let sink = Arc::new(RecordingSink::default());
        let mut runtime = QuickJsRuntime::new(sink.clone());

        let args = vec!["node".to_string(), script.to_string_lossy().into_owned()];
        assert_eq!(run(&mut runtime, &args), 0);
        assert_eq!(texts(&sink), vec!["now", "later"]);
    }

    #[test]
    fn test_missing_script_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.js").to_string_lossy().into_owned();
        let mut runtime = QuickJsRuntime::new(Arc::new(RecordingSink::default()));

        assert_eq!(run(&mut runtime, &["node".to_string(), missing]), EXIT_INVALID_ARGUMENT);
        assert_eq!(run(&mut runtime, &["node".to_string()]), EXIT_INVALID_ARGUMENT);
        assert_eq!(run(&mut runtime, &[]), EXIT_INVALID_ARGUMENT);
    }

    #[test]
    fn test_memory_limit_applies() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), r#"globalThis.big = "x".repeat(64 * 1024 * 1024);"#);
        let mut runtime =
            QuickJsRuntime::new(Arc::new(RecordingSink::default())).with_memory_limit(8 * 1024 * 1024);

        let args = vec!["node".to_string(), script.to_string_lossy().into_owned()];
        assert_eq!(run(&mut runtime, &args), EXIT_UNCAUGHT_EXCEPTION);
    }

    #[test]
    fn test_from_config_takes_memory_limit() {
        let config = BridgeConfig {
            quickjs_memory_limit: Some(1024),
            ..BridgeConfig::default()
        };
        let runtime = QuickJsRuntime::from_config(Arc::new(RecordingSink::default()), &config);
        assert_eq!(runtime.memory_limit, Some(1024));
    }
}
