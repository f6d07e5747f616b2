//! Metric instrument factories for collector.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a provider installed by the embedding application these are
//! no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for collector instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("collector")
}

/// Counter: tasks handed to the worker pool.
pub fn tasks_submitted() -> Counter<u64> {
    meter()
        .u64_counter("collector.tasks.submitted")
        .with_description("Number of tasks submitted to the worker pool")
        .build()
}

/// Counter: tasks executed by the pool.
/// Labels: `outcome` ("ok" | "panicked").
pub fn tasks_executed() -> Counter<u64> {
    meter()
        .u64_counter("collector.tasks.executed")
        .with_description("Number of tasks executed")
        .build()
}

/// Histogram: task execution time in milliseconds.
/// Labels: `outcome`.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("collector.task.duration_ms")
        .with_description("Task execution time in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: interpreted commands.
/// Labels: `command`, `result` ("ok" | "error").
pub fn commands() -> Counter<u64> {
    meter()
        .u64_counter("collector.commands")
        .with_description("Number of commands interpreted")
        .build()
}

/// Counter: data file loads and saves.
/// Labels: `operation` ("load" | "save"), `result` ("ok" | "error").
pub fn persistence_operations() -> Counter<u64> {
    meter()
        .u64_counter("collector.persistence.operations")
        .with_description("Number of data file loads and saves")
        .build()
}
