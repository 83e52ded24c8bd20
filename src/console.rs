//! Console bridge: forwards script `console.log` calls to the host log.
//!
//! The host grants the embedded context a [`LogSink`] by installing a
//! [`ConsoleBridge`] during runtime initialization, before any script runs.
//! Only the first argument of a call is forwarded, converted with the
//! language's own string coercion; a call without arguments logs nothing.

use std::sync::Arc;

use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Ctx, FromJs, Function, Object, Value};
use tracing::{error, info};

use crate::logging::CONSOLE_TAG;

/// Forwarded in place of a value that could not be converted to text.
pub const CONVERSION_FAILED: &str = "<string conversion failed>";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Destination for script console output.
pub trait LogSink: Send + Sync {
    fn log(&self, severity: Severity, message: &str);
}

/// Emits console output as `tracing` events on the console channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => info!(target: CONSOLE_TAG, "{}", message),
            Severity::Error => error!(target: CONSOLE_TAG, "{}", message),
        }
    }
}

#[derive(Clone)]
pub struct ConsoleBridge {
    sink: Arc<dyn LogSink>,
}

impl ConsoleBridge {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Forward one console call. `None` means the call had no arguments.
    pub fn forward(&self, message: Option<&str>) {
        if let Some(message) = message {
            self.sink.log(Severity::Info, message);
        }
    }

    /// Register `console.log` in the context's global object.
    pub fn install<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<()> {
        let console = Object::new(ctx.clone())?;

        let bridge = self.clone();
        console.set(
            "log",
            Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<()> {
                let Some(first) = args.0.into_iter().next() else {
                    return Ok(());
                };
                let text = match Coerced::<String>::from_js(&ctx, first) {
                    Ok(Coerced(text)) => text,
                    Err(_) => {
                        let pending = ctx.catch();
                        // SAFETY: only inspects the header of a value owned by this context
                        if unsafe { rquickjs::qjs::JS_IsUncatchableError(pending.as_raw()) } {
                            // e.g. process.exit() from inside toString(): keep unwinding
                            return Err(ctx.throw(pending));
                        }
                        // Otherwise drop the pending TypeError so the script keeps running
                        CONVERSION_FAILED.to_string()
                    }
                };
                bridge.forward(Some(&text));
                Ok(())
            })?,
        )?;

        ctx.globals().set("console", console)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};
    use std::sync::Mutex;

    /// Sink that keeps every line for inspection.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) lines: Mutex<Vec<(Severity, String)>>,
    }

    impl RecordingSink {
        pub(crate) fn lines(&self) -> Vec<(Severity, String)> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl LogSink for RecordingSink {
        fn log(&self, severity: Severity, message: &str) {
            self.lines.lock().unwrap().push((severity, message.to_string()));
        }
    }

    fn run_script(script: &str) -> Vec<(Severity, String)> {
        let sink = Arc::new(RecordingSink::default());
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            ConsoleBridge::new(sink.clone()).install(&ctx).unwrap();
            ctx.eval::<(), _>(script).unwrap();
        });
        sink.lines()
    }

    #[test]
    fn test_forwards_single_argument_once() {
        let lines = run_script(r#"console.log("hello");"#);
        assert_eq!(lines, vec![(Severity::Info, "hello".to_string())]);
    }

    #[test]
    fn test_zero_arguments_log_nothing() {
        assert!(run_script("console.log();").is_empty());
    }

    #[test]
    fn test_only_first_argument_is_forwarded() {
        let lines = run_script(r#"console.log("first", "second", 3);"#);
        assert_eq!(lines, vec![(Severity::Info, "first".to_string())]);
    }

    #[test]
    fn test_non_string_values_are_coerced() {
        let lines = run_script(
            r#"
            console.log(42);
            console.log(true);
            console.log(null);
            console.log({ toString() { return "custom"; } });
            "#,
        );
        let texts: Vec<String> = lines.into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, vec!["42", "true", "null", "custom"]);
    }

    #[test]
    fn test_unconvertible_value_uses_placeholder() {
        let lines = run_script(
            r#"
            console.log(Symbol("s"));
            console.log("after");
            "#,
        );
        let texts: Vec<String> = lines.into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, vec![CONVERSION_FAILED, "after"]);
    }

    #[test]
    fn test_forward_without_message_is_silent() {
        let sink = Arc::new(RecordingSink::default());
        let bridge = ConsoleBridge::new(sink.clone());
        bridge.forward(None);
        bridge.forward(Some("line"));
        assert_eq!(sink.lines(), vec![(Severity::Info, "line".to_string())]);
    }
}
