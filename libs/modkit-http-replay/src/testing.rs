//! Log capture for unit tests.

use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;

/// Messages recorded at or above a level.
#[derive(Clone)]
pub struct CapturedLogs {
    level: tracing::Level,
    messages: Arc<Mutex<Vec<String>>>,
}

impl CapturedLogs {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|message| message.contains(needle))
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CapturedLogs {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        // Level ordering is by verbosity: ERROR < WARN < INFO < DEBUG < TRACE
        if *event.metadata().level() <= self.level {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            self.messages.lock().unwrap().push(visitor.0);
        }
    }
}

struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

/// Install a thread-local subscriber recording events at `level` or above.
///
/// Works with `#[tokio::test]` on the default current-thread runtime.
pub fn capture_logs(level: tracing::Level) -> (DefaultGuard, CapturedLogs) {
    let logs = CapturedLogs {
        level,
        messages: Arc::new(Mutex::new(Vec::new())),
    };
    let subscriber = tracing_subscriber::registry().with(logs.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (guard, logs)
}
