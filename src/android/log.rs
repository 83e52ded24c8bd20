//! Logcat output via `liblog`.

use std::ffi::{c_char, c_int, CString};
use std::fmt::{self, Write};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::console::{LogSink, Severity};
use crate::logging::CONSOLE_TAG;

#[link(name = "log")]
extern "C" {
    fn __android_log_write(prio: c_int, tag: *const c_char, text: *const c_char) -> c_int;
}

// android/log.h priorities
const ANDROID_LOG_VERBOSE: c_int = 2;
const ANDROID_LOG_DEBUG: c_int = 3;
const ANDROID_LOG_INFO: c_int = 4;
const ANDROID_LOG_WARN: c_int = 5;
const ANDROID_LOG_ERROR: c_int = 6;

/// C string for liblog; NUL bytes would cut the line short, so they are dropped.
fn to_cstring(text: &str) -> CString {
    CString::new(text.replace('\0', "")).unwrap_or_default()
}

/// Write one line to logcat.
pub fn write(priority: c_int, tag: &str, message: &str) {
    let tag = to_cstring(tag);
    let text = to_cstring(message);
    // SAFETY: both pointers are valid NUL-terminated strings for the duration of the call
    unsafe {
        __android_log_write(priority, tag.as_ptr(), text.as_ptr());
    }
}

fn level_priority(level: &Level) -> c_int {
    if *level == Level::ERROR {
        ANDROID_LOG_ERROR
    } else if *level == Level::WARN {
        ANDROID_LOG_WARN
    } else if *level == Level::INFO {
        ANDROID_LOG_INFO
    } else if *level == Level::DEBUG {
        ANDROID_LOG_DEBUG
    } else {
        ANDROID_LOG_VERBOSE
    }
}

/// Console output straight to logcat under the console tag.
#[derive(Clone, Copy, Debug, Default)]
pub struct AndroidLogSink;

impl LogSink for AndroidLogSink {
    fn log(&self, severity: Severity, message: &str) {
        let priority = match severity {
            Severity::Info => ANDROID_LOG_INFO,
            Severity::Error => ANDROID_LOG_ERROR,
        };
        write(priority, CONSOLE_TAG, message);
    }
}

/// `tracing` layer that writes every event to logcat, tagged with the event target.
pub struct AndroidLogLayer;

impl<S: Subscriber> Layer<S> for AndroidLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        visitor.message.push_str(&visitor.fields);
        write(level_priority(metadata.level()), metadata.target(), &visitor.message);
    }
}

/// Collects the `message` field, and any other fields as ` name=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
