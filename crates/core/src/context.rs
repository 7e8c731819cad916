//! Per-invocation correlation context.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation values carried explicitly through one invocation.
///
/// The HTTP layer derives this from the `x-trace-id` header, the scheduler
/// copies `trace_id` into every queue message, and the queue consumer rebuilds
/// it on delivery. It is attached to tracing spans by whoever owns the span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    trace_id: String,
}

impl TraceContext {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
        }
    }

    /// Mint a fresh trace id.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7().to_string())
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }
}
