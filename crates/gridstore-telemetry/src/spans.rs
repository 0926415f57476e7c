//! Span helpers for namespace operations

use crate::attributes::*;
use tracing::Span;

/// Attributes describing one namespace operation
#[derive(Debug, Clone, Default)]
pub struct NamespaceSpanAttributes {
    pub operation: String,
    pub sandbox_id: String,
    pub scope: Option<String>,
    pub namespace_id: Option<String>,
    pub kind: Option<String>,
    pub grid_path: Option<String>,
}

impl NamespaceSpanAttributes {
    pub fn new(operation: impl Into<String>, sandbox_id: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            sandbox_id: sandbox_id.into(),
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_namespace(mut self, namespace_id: impl Into<String>) -> Self {
        self.namespace_id = Some(namespace_id.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_grid_path(mut self, grid_path: impl Into<String>) -> Self {
        self.grid_path = Some(grid_path.into());
        self
    }
}

/// Build the span an engine call runs inside.
///
/// `grid.bytes` and `grid.version` are declared empty and may be recorded
/// once the operation knows them.
pub fn namespace_span(attrs: &NamespaceSpanAttributes) -> Span {
    let span = tracing::info_span!(
        "namespace_op",
        { GRID_OPERATION } = %attrs.operation,
        { GRID_SANDBOX_ID } = %attrs.sandbox_id,
        { GRID_SCOPE } = tracing::field::Empty,
        { GRID_NAMESPACE_ID } = tracing::field::Empty,
        { GRID_NAMESPACE_KIND } = tracing::field::Empty,
        { GRID_PATH } = tracing::field::Empty,
        { GRID_BYTES } = tracing::field::Empty,
        { GRID_VERSION } = tracing::field::Empty,
    );

    if let Some(scope) = &attrs.scope {
        span.record(GRID_SCOPE, scope.as_str());
    }
    if let Some(namespace_id) = &attrs.namespace_id {
        span.record(GRID_NAMESPACE_ID, namespace_id.as_str());
    }
    if let Some(kind) = &attrs.kind {
        span.record(GRID_NAMESPACE_KIND, kind.as_str());
    }
    if let Some(grid_path) = &attrs.grid_path {
        span.record(GRID_PATH, grid_path.as_str());
    }

    span
}

/// Record a completed operation as a standalone span
pub fn trace_namespace_op(attrs: NamespaceSpanAttributes, bytes: u64, version: u64) {
    let span = namespace_span(&attrs);
    span.record(GRID_BYTES, bytes);
    span.record(GRID_VERSION, version);

    let _guard = span.enter();
}

/// Helper to safely serialize to JSON string
pub fn safe_serialize<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<not serializable>".to_string())
}
