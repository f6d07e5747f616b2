//! Task execution span helpers.

use tracing::Span;
use uuid::Uuid;

/// Start a span for one command task.
///
/// The `task.result` field is declared empty and filled in by
/// [`record_result`] once the command has run.
pub fn start_task_span(command: &str, task_id: &Uuid) -> Span {
    tracing::debug_span!(
        "task.execute",
        "task.command" = command,
        "task.id" = %task_id,
        "task.result" = tracing::field::Empty,
    )
}

/// Record how a task ended on its span.
pub fn record_result(span: &Span, result: &str) {
    span.record("task.result", result);
}
