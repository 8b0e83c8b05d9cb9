//! The process-wide log hook.
//!
//! Everything in the workspace logs through `tracing`. A host that wants
//! messages without adopting `tracing` registers a callback with
//! [`set_log_callback`] and installs [`LogCallbackLayer`] in its
//! subscriber; the layer forwards each event's message with its mapped
//! [`LogLevel`].

use std::fmt::Write as _;
use std::sync::{Arc, RwLock};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    pub fn from_tracing(level: &Level) -> Self {
        match *level {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warning,
            Level::INFO => LogLevel::Info,
            Level::DEBUG | Level::TRACE => LogLevel::Debug,
        }
    }
}

pub type LogCallback = Box<dyn Fn(LogLevel, &str) + Send + Sync>;

type SharedCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

static LOG_CALLBACK: RwLock<Option<SharedCallback>> = RwLock::new(None);

/// Install or clear (`None`) the global log callback. Replaces any
/// previous callback.
pub fn set_log_callback(callback: Option<LogCallback>) {
    *LOG_CALLBACK.write().expect("log callback lock poisoned") =
        callback.map(Arc::from);
}

pub fn has_log_callback() -> bool {
    LOG_CALLBACK
        .read()
        .expect("log callback lock poisoned")
        .is_some()
}

/// Send one message straight to the callback, bypassing `tracing`.
pub fn emit(level: LogLevel, message: &str) {
    let callback = LOG_CALLBACK
        .read()
        .expect("log callback lock poisoned")
        .clone();
    if let Some(callback) = callback {
        callback(level, message);
    }
}

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
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

/// `tracing-subscriber` layer forwarding events to the log callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCallbackLayer {
    _priv: (),
}

impl LogCallbackLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: Subscriber> Layer<S> for LogCallbackLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !has_log_callback() {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let level = LogLevel::from_tracing(event.metadata().level());
        visitor.message.push_str(&visitor.fields);
        emit(level, &visitor.message);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[test]
    fn level_mapping() {
        assert_eq!(LogLevel::from_tracing(&Level::ERROR), LogLevel::Error);
        assert_eq!(LogLevel::from_tracing(&Level::WARN), LogLevel::Warning);
        assert_eq!(LogLevel::from_tracing(&Level::INFO), LogLevel::Info);
        assert_eq!(LogLevel::from_tracing(&Level::TRACE), LogLevel::Debug);
        assert!(LogLevel::Error < LogLevel::Debug);
    }

    #[test]
    fn layer_forwards_formatted_events() {
        let seen: Arc<Mutex<Vec<(LogLevel, String)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        set_log_callback(Some(Box::new(move |level, msg: &str| {
            sink.lock().unwrap().push((level, msg.to_owned()));
        })));

        let subscriber =
            tracing_subscriber::registry().with(LogCallbackLayer::new());
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(count = 3, "leaked {} buffers", 3);
        });
        set_log_callback(None);

        let seen = seen.lock().unwrap();
        assert!(seen.iter().any(|(level, msg)| {
            *level == LogLevel::Warning
                && msg.starts_with("leaked 3 buffers")
                && msg.contains("count=3")
        }));
    }
}
