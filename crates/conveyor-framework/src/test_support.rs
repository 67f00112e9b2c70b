//! Tracing capture for asserting on log output in tests.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

/// One captured event with the fields of every enclosing span flattened in.
#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(String, String)>,
    pub spans: Vec<String>,
}

impl Record {
    /// Value of an event or span field, innermost first.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct FieldCollector(Vec<(String, String)>);

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }
}

struct SpanFields(Vec<(String, String)>);

#[derive(Clone, Default)]
pub(crate) struct Captured(Arc<Mutex<Vec<Record>>>);

impl Captured {
    pub fn records(&self) -> Vec<Record> {
        self.0.lock().clone()
    }

    pub fn find(&self, message_prefix: &str) -> Option<Record> {
        self.0
            .lock()
            .iter()
            .find(|r| r.message.starts_with(message_prefix))
            .cloned()
    }
}

struct CaptureLayer(Captured);

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        attrs.record(&mut collector);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(collector.0));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let mut message = String::new();
        let mut fields = Vec::new();
        for (k, v) in collector.0 {
            if k == "message" {
                message = v;
            } else {
                fields.push((k, v));
            }
        }

        let mut spans = Vec::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                spans.push(span.name().to_string());
                if let Some(SpanFields(span_fields)) = span.extensions().get::<SpanFields>() {
                    fields.extend(span_fields.iter().cloned());
                }
            }
        }

        self.0.0.lock().push(Record {
            level: *event.metadata().level(),
            message,
            fields,
            spans,
        });
    }
}

/// Installs a capturing subscriber for the current thread.
///
/// Use with a current-thread runtime so spawned work stays on this thread.
pub(crate) fn capture() -> (Captured, tracing::subscriber::DefaultGuard) {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer(captured.clone()));
    let guard = tracing::subscriber::set_default(subscriber);
    (captured, guard)
}
