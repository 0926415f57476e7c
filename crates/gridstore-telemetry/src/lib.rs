//! # gridstore telemetry
//!
//! OpenTelemetry integration for namespace operations. Every engine call runs
//! inside a span carrying the `grid.*` attributes below, so traces can be
//! filtered by sandbox, scope, namespace or operation.

mod spans;
mod tracer;

pub use spans::{NamespaceSpanAttributes, namespace_span, safe_serialize, trace_namespace_op};
pub use tracer::{init_telemetry, register_span_processor, tracer_provider};

/// Span attribute names
pub mod attributes {
    pub const GRID_OPERATION: &str = "grid.operation";
    pub const GRID_SANDBOX_ID: &str = "grid.sandbox_id";
    pub const GRID_SCOPE: &str = "grid.scope";
    pub const GRID_NAMESPACE_ID: &str = "grid.namespace_id";
    pub const GRID_NAMESPACE_KIND: &str = "grid.namespace_kind";
    pub const GRID_PATH: &str = "grid.path";
    pub const GRID_BYTES: &str = "grid.bytes";
    pub const GRID_VERSION: &str = "grid.version";

    // Tracer name
    pub const SYSTEM_NAME: &str = "gridstore";
}
