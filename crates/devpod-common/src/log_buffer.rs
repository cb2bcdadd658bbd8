//! Deferred log output
//!
//! A [`LogBuffer`] collects tracing events emitted inside one scoped
//! subscriber and holds them until the caller decides to replay them into
//! the process-wide subscriber or drop them.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// One captured event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferedEvent {
    pub level: Level,
    pub message: String,
}

/// Append-only event buffer shared with its [`BufferLayer`]
#[derive(Clone, Debug, Default)]
pub struct LogBuffer {
    events: Arc<Mutex<Vec<BufferedEvent>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer that appends every event it sees to this buffer
    pub fn layer(&self) -> BufferLayer {
        BufferLayer {
            events: Arc::clone(&self.events),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Snapshot of the captured events
    pub fn events(&self) -> Vec<BufferedEvent> {
        self.events.lock().clone()
    }

    /// Empty the buffer, re-emitting its events when `flush` is set
    ///
    /// Replayed events go to whatever subscriber is current for the caller,
    /// so this must run outside the scope the events were captured in.
    /// Returns the number of events handled.
    pub fn finish(self, flush: bool) -> usize {
        let drained = std::mem::take(&mut *self.events.lock());
        if flush {
            for event in &drained {
                replay(event);
            }
        }
        drained.len()
    }
}

fn replay(event: &BufferedEvent) {
    let message = event.message.as_str();
    match event.level {
        Level::ERROR => tracing::error!("{message}"),
        Level::WARN => tracing::warn!("{message}"),
        Level::INFO => tracing::info!("{message}"),
        Level::DEBUG => tracing::debug!("{message}"),
        _ => tracing::trace!("{message}"),
    }
}

/// [`Layer`] half of a [`LogBuffer`]
pub struct BufferLayer {
    events: Arc<Mutex<Vec<BufferedEvent>>>,
}

impl<S: Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.events.lock().push(BufferedEvent {
            level: *event.metadata().level(),
            message: visitor.finish(),
        });
    }
}

/// Flattens an event into "message key=value ..." text
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}
