// src/shell/context.rs

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::errors::MeshsimError;
use crate::types::NodeId;

/// Shared, unbuffered line sink for command output.
///
/// Every line is flushed as soon as it is written so output interleaves with
/// the side effects that produced it.
#[derive(Clone)]
pub struct OutputSink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl OutputSink {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Write `line` plus a newline and flush.
    pub fn line(&self, line: impl fmt::Display) {
        let mut out = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let res = writeln!(out, "{line}").and_then(|()| out.flush());
        if let Err(e) = res {
            warn!(error = %e, "command output write failed");
        }
    }

    /// Write `text` as is (no newline) and flush.
    pub fn prompt(&self, text: &str) {
        let mut out = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let res = out.write_all(text.as_bytes()).and_then(|()| out.flush());
        if let Err(e) = res {
            warn!(error = %e, "prompt write failed");
        }
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

/// Result of executing one command.
///
/// Holds at most one error: a later error replaces an earlier one.
#[derive(Debug)]
pub struct CommandContext {
    output: OutputSink,
    error: Option<MeshsimError>,
    enter_node: Option<NodeId>,
    exit_requested: bool,
}

impl CommandContext {
    pub fn new(output: OutputSink) -> Self {
        Self {
            output,
            error: None,
            enter_node: None,
            exit_requested: false,
        }
    }

    pub fn output(&self) -> &OutputSink {
        &self.output
    }

    pub fn outputf(&self, line: impl fmt::Display) {
        self.output.line(line);
    }

    /// Record `err`, replacing any earlier one.
    pub fn error(&mut self, err: MeshsimError) {
        self.error = Some(err);
    }

    /// Record a user-level error message.
    pub fn errorf(&mut self, msg: impl Into<String>) {
        self.error(MeshsimError::user(msg));
    }

    /// Record `err` if there is one; `None` leaves the slot untouched.
    pub fn maybe_error(&mut self, err: Option<MeshsimError>) {
        if let Some(err) = err {
            self.error(err);
        }
    }

    pub fn err(&self) -> Option<&MeshsimError> {
        self.error.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_error(self) -> Option<MeshsimError> {
        self.error
    }

    pub(crate) fn set_enter_node(&mut self, id: NodeId) {
        self.enter_node = Some(id);
    }

    /// Node whose context the shell should switch to, set by a bare
    /// `node <id>`.
    pub fn enter_node(&self) -> Option<NodeId> {
        self.enter_node
    }

    pub(crate) fn set_exit_requested(&mut self) {
        self.exit_requested = true;
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }
}
