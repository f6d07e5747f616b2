//! Turns input lines into command tasks and feeds them to the pool.

use std::io::BufRead;
use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::debug;
use uuid::Uuid;

use crate::command::Command;
use crate::config::Limits;
use crate::engine::{Task, WorkerPool};
use crate::error::Result;
use crate::model::Person;
use crate::output::Output;
use crate::storage::CollectionStore;
use crate::telemetry::metrics;
use crate::telemetry::work::{record_result, start_task_span};

/// One input line bound to the shared store and output sink.
pub struct CommandTask {
    id: Uuid,
    tokens: Vec<String>,
    store: Arc<CollectionStore<Person>>,
    output: Arc<dyn Output>,
    limits: Limits,
}

impl CommandTask {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

impl Task for CommandTask {
    fn name(&self) -> &str {
        self.tokens.first().map_or("", String::as_str)
    }

    fn run(self: Box<Self>) {
        let span = start_task_span(self.name(), &self.id);
        let _enter = span.enter();

        let parsed = Command::parse(&self.tokens);
        let label = parsed.as_ref().map_or("invalid", Command::name);
        let result = parsed.and_then(|command| command.execute(&self.store, &self.limits));

        let outcome = match result {
            Ok(lines) => {
                if !lines.is_empty() {
                    self.output.emit_block(&lines);
                }
                "ok"
            }
            Err(e) => {
                debug!(error = %e, "command failed");
                self.output.emit(&e.to_string());
                "error"
            }
        };

        record_result(&span, outcome);
        metrics::commands().add(
            1,
            &[
                KeyValue::new("command", label),
                KeyValue::new("result", outcome),
            ],
        );
    }
}

/// Builds [`CommandTask`]s against one store and sink.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<CollectionStore<Person>>,
    output: Arc<dyn Output>,
    limits: Limits,
}

impl Dispatcher {
    pub fn new(
        store: Arc<CollectionStore<Person>>,
        output: Arc<dyn Output>,
        limits: Limits,
    ) -> Self {
        Self {
            store,
            output,
            limits,
        }
    }

    /// Wrap one line. Returns `None` for a blank line.
    pub fn task(&self, line: &str) -> Option<CommandTask> {
        let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            return None;
        }

        Some(CommandTask {
            id: Uuid::new_v4(),
            tokens,
            store: Arc::clone(&self.store),
            output: Arc::clone(&self.output),
            limits: self.limits,
        })
    }

    /// Submit one task per line until EOF or the first blank line.
    ///
    /// Lines are decoded lossily: invalid UTF-8 becomes U+FFFD and the
    /// command fails inside its own task instead of ending the batch.
    /// Returns the number of commands submitted.
    pub fn feed<R: BufRead>(&self, mut input: R, pool: &WorkerPool) -> Result<usize> {
        let mut submitted = 0;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            let Some(task) = self.task(&line) else {
                break;
            };
            debug!(task_id = %task.id(), command = task.name(), "submitting");
            pool.submit(task)?;
            submitted += 1;
        }
        debug!(submitted, "input exhausted");
        Ok(submitted)
    }
}
