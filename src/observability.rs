//! Observability (C9): request-scoped tracing spans, an audit trail
//! independent of the logging backend, and (behind the `metrics` feature)
//! Prometheus-style counters and histograms.
//!
//! Structured logging itself is configured once, at startup, by
//! [`crate::setup_tracing`]; this module adds the per-request layer on top:
//! a span carrying identity/tool context, an [`AuditSink`] that records the
//! authorization and dispatch outcome of every call under a stable request
//! id, and metrics recording grounded on the same `telemetry_metrics`
//! (`metrics` crate) dependency the teacher already declares.

use std::time::Duration;

use serde::Serialize;
use tracing::Span;

/// Generate a new request id. Every call into [`crate::pipeline::Pipeline::handle`]
/// gets one, threaded through its tracing span and any audit events it emits.
#[must_use]
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Open the tracing span a request's lifetime is recorded under.
///
/// Fields left empty (tenant, tool) are filled in with `Span::record` once
/// resolved, since authentication and tool resolution happen after the
/// span is opened.
pub fn request_span(request_id: &str) -> Span {
    tracing::info_span!(
        "tool_call",
        request_id = %request_id,
        tenant_id = tracing::field::Empty,
        tool_id = tracing::field::Empty,
        backend = tracing::field::Empty,
        outcome = tracing::field::Empty,
    )
}

/// Terminal disposition of a request, recorded on both the span and the
/// audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Dispatched and returned a result.
    Success,
    /// Rejected by authentication, authorization, tenant policy, quota, or
    /// rate limiting before dispatch was attempted.
    Denied,
    /// Reached dispatch but the adapter returned an error.
    Error,
}

impl Outcome {
    /// Lowercase label used in tracing fields, audit logs, and metric tags.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Denied => "denied",
            Self::Error => "error",
        }
    }
}

/// One audit trail entry: who called what, and what happened.
///
/// Carries the same `request_id` as the request's tracing span, so an
/// audit event produced by a rejected authorization check (testable
/// property 7) can be correlated back to the authenticated request that
/// triggered it.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Correlates this event with the request's tracing span.
    pub request_id: String,
    /// Authenticated principal id, or `"anonymous"`.
    pub principal_id: String,
    /// Resolved tenant id, when tenancy is enabled.
    pub tenant_id: Option<String>,
    /// Bare or qualified tool reference as the caller supplied it.
    pub tool: String,
    /// Owning backend, once resolved; absent if the tool itself could not
    /// be resolved.
    pub backend: Option<String>,
    /// Terminal disposition.
    pub outcome: Outcome,
    /// Short human-readable reason, populated for `Denied`/`Error`.
    pub detail: Option<String>,
}

/// Sink for [`AuditEvent`]s. The default implementation logs through
/// `tracing`; deployments that need a durable audit log (a file, a SIEM
/// forwarder) implement this trait and wire it in at `Gateway` construction
/// instead.
pub trait AuditSink: Send + Sync {
    /// Record one audit event.
    fn record(&self, event: &AuditEvent);
}

/// Default [`AuditSink`]: emits a structured `tracing` event at `info`
/// (success) or `warn` (denied/error) level.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        match event.outcome {
            Outcome::Success => tracing::info!(
                request_id = %event.request_id,
                principal_id = %event.principal_id,
                tenant_id = event.tenant_id.as_deref(),
                tool = %event.tool,
                backend = event.backend.as_deref(),
                outcome = event.outcome.as_str(),
                "tool call audit"
            ),
            Outcome::Denied | Outcome::Error => tracing::warn!(
                request_id = %event.request_id,
                principal_id = %event.principal_id,
                tenant_id = event.tenant_id.as_deref(),
                tool = %event.tool,
                backend = event.backend.as_deref(),
                outcome = event.outcome.as_str(),
                detail = event.detail.as_deref(),
                "tool call audit"
            ),
        }
    }
}

#[cfg(feature = "metrics")]
mod metrics_impl {
    use super::Outcome;
    use std::time::Duration;

    /// Record one completed tool call: a counter tagged by tool/backend/
    /// outcome, and a latency histogram.
    pub fn record_tool_call(tool: &str, backend: &str, outcome: Outcome, elapsed: Duration) {
        telemetry_metrics::counter!(
            "gateway_tool_calls_total",
            "tool" => tool.to_string(),
            "backend" => backend.to_string(),
            "outcome" => outcome.as_str(),
        )
        .increment(1);
        telemetry_metrics::histogram!(
            "gateway_tool_call_duration_seconds",
            "tool" => tool.to_string(),
            "backend" => backend.to_string(),
        )
        .record(elapsed.as_secs_f64());
    }

    /// Record a circuit breaker state transition for a `(backend, tool)` pair.
    pub fn record_circuit_state(backend: &str, key: &str, state: &str) {
        telemetry_metrics::gauge!(
            "gateway_circuit_breaker_state",
            "backend" => backend.to_string(),
            "key" => key.to_string(),
            "state" => state.to_string(),
        )
        .set(1.0);
    }
}

#[cfg(feature = "metrics")]
pub use metrics_impl::{record_circuit_state, record_tool_call};

/// No-op stand-ins when the `metrics` feature is disabled, so call sites
/// never need to `cfg`-gate themselves.
#[cfg(not(feature = "metrics"))]
pub fn record_tool_call(_tool: &str, _backend: &str, _outcome: Outcome, _elapsed: Duration) {}

#[cfg(not(feature = "metrics"))]
pub fn record_circuit_state(_backend: &str, _key: &str, _state: &str) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(new_request_id(), new_request_id());
    }

    struct RecordingSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    impl AuditSink for RecordingSink {
        fn record(&self, event: &AuditEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn recording_sink_captures_denied_outcome() {
        let sink = RecordingSink { events: Mutex::new(Vec::new()) };
        sink.record(&AuditEvent {
            request_id: "r1".to_string(),
            principal_id: "anonymous".to_string(),
            tenant_id: Some("T1".to_string()),
            tool: "sandbox:execute_code".to_string(),
            backend: Some("sandbox".to_string()),
            outcome: Outcome::Denied,
            detail: Some("tenant policy denied".to_string()),
        });
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].request_id, "r1");
        assert_eq!(events[0].outcome, Outcome::Denied);
    }
}
