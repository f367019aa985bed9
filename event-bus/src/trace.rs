//! Inject/extract the default W3C/OTel text-map representation of a trace
//! context into/from AMQP message headers.
//!
//! `lapin`'s `FieldTable` plays the role of the spec's caller-supplied
//! header map; `Injector`/`Extractor` impls over it are the Rust equivalent
//! of the spec's caller-supplied `set`/`get` functions — the traits *are*
//! that contract, expressed as methods rather than closures.

use lapin::types::{AMQPValue, FieldTable, LongString};
use opentelemetry::global;
use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::trace::{Span as OtelSpan, Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

pub struct HeaderInjector<'a>(pub &'a mut FieldTable);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0
            .insert(key.into(), AMQPValue::LongString(LongString::from(value)));
    }
}

pub struct HeaderExtractor<'a>(pub &'a FieldTable);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        match self.0.inner().get(key) {
            Some(AMQPValue::LongString(s)) => std::str::from_utf8(s.as_bytes()).ok(),
            _ => None,
        }
    }

    fn keys(&self) -> Vec<&str> {
        self.0
            .inner()
            .keys()
            .map(|k| k.as_str())
            .collect()
    }
}

/// Writes the current span's trace context into `headers`, creating the
/// header map entries on first use (the header map itself is always
/// present, matching the spec's "creates the header map on first use" via
/// `FieldTable::default()` already being empty-but-present).
pub fn inject_context(span: &Span, headers: &mut FieldTable) {
    let ctx = span.context();
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&ctx, &mut HeaderInjector(headers));
    });
}

/// Reads a trace context out of `headers`. Returns the current/ambient
/// context when no valid trace headers are present.
pub fn extract_context(headers: &FieldTable) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Tags `span` with exception kind/message and sets its status to error, per
/// the publish/consume failure handling in the component design. `kind` is
/// the error taxonomy variant name (e.g. `"BrokerUnreachable"`); `message` is
/// its `Display` text. There is no captured stack trace to attach in Rust.
pub fn record_exception(span: &Span, kind: &str, message: &str) {
    let ctx = span.context();
    let otel_span = ctx.span();
    otel_span.add_event(
        "exception",
        vec![
            KeyValue::new("exception.type", kind.to_string()),
            KeyValue::new("exception.message", message.to_string()),
        ],
    );
    otel_span.set_status(Status::error(message.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use tracing_subscriber::prelude::*;

    #[test]
    fn inject_then_extract_preserves_trace_id() {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let mut headers = FieldTable::default();
        let subscriber = tracing_subscriber::registry().with(tracing_opentelemetry::layer());
        let _guard = tracing::subscriber::set_default(subscriber);

        let span = tracing::info_span!("publish");
        let otel_ctx = span.context();
        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(&otel_ctx, &mut HeaderInjector(&mut headers));
        });

        let extracted = extract_context(&headers);
        assert_eq!(
            extracted.span().span_context().trace_id(),
            otel_ctx.span().span_context().trace_id()
        );
    }
}
