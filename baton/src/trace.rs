//! Run tracing: span lifecycle hooks emitted around a run.
//!
//! The runner opens a span for the run, one per turn and one per tool call,
//! and records attributes and errors on them. Spans nest: each turn is a
//! child of the run span and each tool call a child of its turn, linked
//! through [`SpanContext`]. A [`Tracer`] observes these spans and must never
//! affect the run: every call the runner makes into a tracer is guarded, so a
//! panicking implementation is logged and ignored. Every span the runner
//! starts is ended, including on timeout, cancellation and tool panics.
//!
//! - [`NoopTracer`] discards everything (the default).
//! - [`LogTracer`] forwards span events to the `tracing` subscriber.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

/// A shared dynamic tracer.
pub type SharedTracer = Arc<dyn Tracer>;

/// Identity of a span and its link to the parent span.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanContext {
    /// Trace the span belongs to.
    pub trace_id: String,
    /// Unique id of the span.
    pub span_id: String,
    /// Id of the enclosing span, `None` for a root span.
    pub parent_span_id: Option<String>,
}

impl SpanContext {
    /// A context with a fresh span id in `trace_id`, nested under `parent`.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, parent: Option<&Self>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: uuid::Uuid::new_v4().simple().to_string(),
            parent_span_id: parent.map(|p| p.span_id.clone()),
        }
    }

    /// Whether the span has no parent.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }
}

/// An open span.
pub trait Span: Send {
    /// The span name.
    fn name(&self) -> &str;

    /// Identity of the span, handed to child spans as their parent.
    fn context(&self) -> &SpanContext;

    /// Record a key/value attribute.
    fn set_attribute(&mut self, key: &str, value: Value);

    /// Mark the span as failed.
    fn set_error(&mut self, error: &str);

    /// Close the span.
    fn end(self: Box<Self>);
}

/// Creates spans for a run.
pub trait Tracer: Send + Sync {
    /// Open a span named `name` within trace `trace_id`, as a child of
    /// `parent` when given.
    fn start_span(
        &self,
        trace_id: &str,
        parent: Option<&SpanContext>,
        name: &str,
    ) -> Box<dyn Span>;

    /// Close `span`.
    fn end_span(&self, span: Box<dyn Span>) {
        span.end();
    }
}

/// A tracer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

/// The span produced by [`NoopTracer`].
#[derive(Debug, Clone)]
pub struct NoopSpan {
    context: SpanContext,
}

impl Span for NoopSpan {
    fn name(&self) -> &str {
        ""
    }

    fn context(&self) -> &SpanContext {
        &self.context
    }

    fn set_attribute(&mut self, _key: &str, _value: Value) {}

    fn set_error(&mut self, _error: &str) {}

    fn end(self: Box<Self>) {}
}

impl Tracer for NoopTracer {
    fn start_span(
        &self,
        trace_id: &str,
        parent: Option<&SpanContext>,
        _name: &str,
    ) -> Box<dyn Span> {
        Box::new(NoopSpan {
            context: SpanContext::new(trace_id, parent),
        })
    }
}

/// Log verbosity for [`LogTracer`] span lifecycle events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Trace-level logging (most verbose).
    Trace,
    /// Debug-level logging (default).
    #[default]
    Debug,
    /// Info-level logging.
    Info,
}

macro_rules! log_at_level {
    ($level:expr, $($arg:tt)*) => {
        match $level {
            LogLevel::Trace => tracing::trace!($($arg)*),
            LogLevel::Debug => tracing::debug!($($arg)*),
            LogLevel::Info  => tracing::info!($($arg)*),
        }
    };
}

/// A tracer that emits span events through `tracing`.
///
/// Span starts, attributes and ends are logged at the configured level;
/// errors are always logged at `WARN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer {
    level: LogLevel,
}

impl LogTracer {
    /// Create a log tracer at the default level (DEBUG).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log tracer at a custom level.
    #[must_use]
    pub const fn with_level(level: LogLevel) -> Self {
        Self { level }
    }
}

impl Tracer for LogTracer {
    fn start_span(
        &self,
        trace_id: &str,
        parent: Option<&SpanContext>,
        name: &str,
    ) -> Box<dyn Span> {
        let context = SpanContext::new(trace_id, parent);
        log_at_level!(self.level,
            trace_id,
            span = name,
            span_id = %context.span_id,
            parent_span_id = ?context.parent_span_id,
            "span started"
        );
        Box::new(LogSpan {
            context,
            name: name.to_owned(),
            level: self.level,
            started: Instant::now(),
            failed: false,
        })
    }
}

/// The span produced by [`LogTracer`].
pub struct LogSpan {
    context: SpanContext,
    name: String,
    level: LogLevel,
    started: Instant,
    failed: bool,
}

impl fmt::Debug for LogSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSpan")
            .field("context", &self.context)
            .field("name", &self.name)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl Span for LogSpan {
    fn name(&self) -> &str {
        &self.name
    }

    fn context(&self) -> &SpanContext {
        &self.context
    }

    fn set_attribute(&mut self, key: &str, value: Value) {
        log_at_level!(self.level,
            trace_id = %self.context.trace_id,
            span = %self.name,
            key,
            value = %value,
            "span attribute"
        );
    }

    fn set_error(&mut self, error: &str) {
        self.failed = true;
        tracing::warn!(trace_id = %self.context.trace_id, span = %self.name, error, "span error");
    }

    fn end(self: Box<Self>) {
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        log_at_level!(self.level,
            trace_id = %self.context.trace_id,
            span = %self.name,
            elapsed_ms,
            failed = self.failed,
            "span ended"
        );
    }
}

/// Run a tracer callback, swallowing any panic it raises.
pub(crate) fn guarded<T>(what: &str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(operation = what, "tracer panicked; ignoring");
            None
        }
    }
}

/// A span handle owned by the runner. All operations are panic-guarded and
/// become no-ops once the underlying tracer has misbehaved. A handle dropped
/// without [`end`](Self::end) still ends its span.
pub(crate) struct RunSpan {
    inner: Option<Box<dyn Span>>,
    context: Option<SpanContext>,
    tracer: SharedTracer,
}

impl RunSpan {
    pub(crate) fn start(
        tracer: &SharedTracer,
        trace_id: &str,
        parent: Option<&SpanContext>,
        name: &str,
    ) -> Self {
        let inner = guarded("start_span", || tracer.start_span(trace_id, parent, name));
        let context = inner
            .as_ref()
            .and_then(|span| guarded("context", || span.context().clone()));
        Self {
            inner,
            context,
            tracer: Arc::clone(tracer),
        }
    }

    /// Identity of the span, if the tracer produced one.
    pub(crate) const fn context(&self) -> Option<&SpanContext> {
        self.context.as_ref()
    }

    pub(crate) fn attr(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if let Some(span) = self.inner.as_mut()
            && guarded("set_attribute", || span.set_attribute(key, value)).is_none()
        {
            self.inner = None;
        }
    }

    pub(crate) fn error(&mut self, error: &str) {
        if let Some(span) = self.inner.as_mut()
            && guarded("set_error", || span.set_error(error)).is_none()
        {
            self.inner = None;
        }
    }

    pub(crate) fn end(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(span) = self.inner.take() {
            let tracer = Arc::clone(&self.tracer);
            guarded("end_span", move || tracer.end_span(span));
        }
    }
}

impl Drop for RunSpan {
    fn drop(&mut self) {
        self.close();
    }
}
