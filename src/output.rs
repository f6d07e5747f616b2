//! Output sinks for command results.

use std::io::Write;

use parking_lot::Mutex;

/// Where command tasks write their result lines.
///
/// Shared by every worker, so implementations must be thread-safe.
/// Emission failures are the sink's concern; callers never see them.
pub trait Output: Send + Sync {
    fn emit(&self, line: &str);

    /// Emit several lines without another task's output interleaving.
    fn emit_block(&self, lines: &[String]) {
        for line in lines {
            self.emit(line);
        }
    }
}

/// Writes lines to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalOutput;

impl Output for TerminalOutput {
    fn emit(&self, line: &str) {
        let _ = writeln!(std::io::stdout().lock(), "{line}");
    }

    fn emit_block(&self, lines: &[String]) {
        let mut stdout = std::io::stdout().lock();
        for line in lines {
            if writeln!(stdout, "{line}").is_err() {
                return;
            }
        }
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct BufferOutput {
    lines: Mutex<Vec<String>>,
}

impl BufferOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Drain everything emitted so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }
}

impl Output for BufferOutput {
    fn emit(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }

    fn emit_block(&self, lines: &[String]) {
        self.lines.lock().extend_from_slice(lines);
    }
}
