// src/exec/line_reader.rs

use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::line_buffer::PendingLineBuffer;

/// Prompt the device shell prints before reading a command.
const PROMPT: &str = "> ";

/// Upper bound on retained diagnostic (stderr) text per node.
const MAX_DIAGNOSTICS: usize = 16 * 1024;

/// Spawn the background line reader for one node process.
///
/// Every line of `output` is normalized (see [`normalize_line`]) and
/// published into `buffer` without ever blocking: when the buffer is full the
/// oldest pending line is evicted. When the stream ends, or a read fails, the
/// buffer is closed for good.
pub fn spawn_line_reader<R>(label: String, output: R, buffer: Arc<PendingLineBuffer>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let reader = BufReader::new(output);
        let mut lines = reader.lines();

        loop {
            match lines.next_line().await {
                Ok(Some(raw)) => {
                    let line = normalize_line(&raw);
                    if let Some(dropped) = buffer.push_evicting(line) {
                        warn!(node = %label, %dropped, "pending line buffer full; dropped oldest line");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(node = %label, error = %e, "read output error");
                    break;
                }
            }
        }

        buffer.close();
        debug!(node = %label, "line reader ended");
    })
}

/// Strip the shell prompt and carriage returns from a raw output line.
///
/// The device prints `"> "` before echoing each command, so the echo of
/// `channel` arrives as `"> channel"` and the echo of an empty line as
/// `"> "`. Both are reduced to the bare command text.
pub fn normalize_line(raw: &str) -> String {
    let mut line = raw.trim_end_matches('\r');
    loop {
        if let Some(rest) = line.strip_prefix(PROMPT) {
            line = rest;
        } else if line == PROMPT.trim_end() {
            line = "";
        } else {
            break;
        }
    }
    line.to_string()
}

/// Shared, bounded copy of a node's diagnostic stream.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    text: Arc<Mutex<String>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_line(&self, line: &str) {
        let mut text = self.text.lock().unwrap_or_else(PoisonError::into_inner);
        if text.len() + line.len() + 1 > MAX_DIAGNOSTICS {
            return;
        }
        text.push_str(line);
        text.push('\n');
    }

    pub fn snapshot(&self) -> String {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .trim_end()
            .to_string()
    }
}

/// Drain a node's diagnostic stream so the pipe never fills.
///
/// Lines are logged at debug and kept in `diagnostics`; they are only
/// surfaced to users when the process dies mid-exchange.
pub fn spawn_diagnostics_drain<R>(label: String, stderr: R, diagnostics: Diagnostics) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let reader = BufReader::new(stderr);
        let mut lines = reader.lines();

        while let Ok(Some(line)) = lines.next_line().await {
            debug!(node = %label, "stderr: {}", line);
            diagnostics.append_line(&line);
        }
    })
}
