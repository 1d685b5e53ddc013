// src/exec/driver.rs

//! Command/response driver for one device process.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::line_buffer::PendingLineBuffer;
use super::line_reader::{Diagnostics, spawn_diagnostics_drain, spawn_line_reader};
use super::matcher::{Expectation, LineMatcher, LinePattern};
use crate::config::ProtocolConfig;
use crate::errors::{MeshsimError, Result};
use crate::types::NodeId;

/// Terminal line of a command response block.
static DONE_OR_ERROR: LazyLock<LinePattern> = LazyLock::new(|| {
    LinePattern::Pattern(Regex::new(r"^(?:Done|Error \d+: .*)$").expect("static regex"))
});

static ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Error (\d+): (.*)$").expect("static regex"));

/// How long a dead process's diagnostic stream may take to drain before
/// the EOF fault is reported.
const DIAGNOSTICS_GRACE: Duration = Duration::from_millis(500);

/// Typed outcome of a command exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Lines between the echo and `Done`.
    Done(Vec<String>),
    /// The device answered `Error <code>: <message>`.
    Failed { code: u32, message: String },
}

/// Owner of one device process and its standard streams.
///
/// Every exchange takes `&mut self`, so at most one command/response is in
/// flight per driver.
pub struct NodeProcessDriver {
    id: NodeId,
    child: Child,
    stdin: ChildStdin,
    matcher: LineMatcher,
    protocol: ProtocolConfig,
    reader: Option<JoinHandle<()>>,
    diagnostics_drain: Option<JoinHandle<()>>,
}

impl fmt::Debug for NodeProcessDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeProcessDriver")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for NodeProcessDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node<{}>", self.id)
    }
}

impl NodeProcessDriver {
    /// Spawn `exe <id>`, attach its pipes, start the line reader and
    /// synchronize with the shell prompt.
    pub async fn spawn(
        exe: &Path,
        id: NodeId,
        protocol: ProtocolConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let exe = std::path::absolute(exe)
            .with_context(|| format!("resolving node executable '{}'", exe.display()))?;
        debug!(node = id, exe = %exe.display(), "spawning node process");

        let mut child = Command::new(&exe)
            .arg(id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning node {} from '{}'", id, exe.display()))?;

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => return Err(MeshsimError::protocol(id, "process pipes unavailable")),
        };

        let label = format!("Node<{id}>");
        let lines = Arc::new(PendingLineBuffer::new(protocol.line_buffer_capacity));
        let diagnostics = Diagnostics::new();

        let reader = spawn_line_reader(label.clone(), stdout, Arc::clone(&lines));
        let diagnostics_drain = spawn_diagnostics_drain(label, stderr, diagnostics.clone());

        let mut driver = Self {
            id,
            child,
            stdin,
            matcher: LineMatcher::new(id, lines, diagnostics, cancel),
            protocol,
            reader: Some(reader),
            diagnostics_drain: Some(diagnostics_drain),
        };

        driver.assure_prompt().await?;
        Ok(driver)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn protocol(&self) -> &ProtocolConfig {
        &self.protocol
    }

    pub fn matcher(&self) -> &LineMatcher {
        &self.matcher
    }

    async fn try_expect(&mut self, pattern: &LinePattern, timeout: Duration) -> Result<Expectation> {
        let res = self.matcher.try_expect_line(pattern, timeout).await;
        self.settle_eof(res).await
    }

    async fn expect(&mut self, pattern: &LinePattern, timeout: Duration) -> Result<Vec<String>> {
        let res = self.matcher.expect_line(pattern, timeout).await;
        self.settle_eof(res).await
    }

    /// On EOF, give the diagnostic drain a moment to collect what the process
    /// printed on its way out, then report with the complete text.
    async fn settle_eof<T>(&mut self, res: Result<T>) -> Result<T> {
        match res {
            Err(MeshsimError::ProcessEof { node, .. }) => {
                if let Some(drain) = self.diagnostics_drain.take() {
                    let _ = tokio::time::timeout(DIAGNOSTICS_GRACE, drain).await;
                }
                Err(MeshsimError::ProcessEof {
                    node,
                    diagnostics: self.matcher.diagnostics().snapshot(),
                })
            }
            other => other,
        }
    }

    /// Write `line` plus a terminator to the process.
    ///
    /// Write failures are only logged: a dead process is reported by the
    /// following expectation as an EOF, with its diagnostics attached.
    pub async fn write_line(&mut self, line: &str) {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');

        let res = async {
            self.stdin.write_all(&data).await?;
            self.stdin.flush().await
        }
        .await;

        if let Err(e) = res {
            warn!(node = self.id, error = %e, "write to node process failed");
        }
    }

    /// Resynchronize with an idle prompt.
    ///
    /// Two short attempts, then one at the full command timeout that faults
    /// if the process still does not answer. Returns every line seen along
    /// the way (asynchronous output such as ping replies or scan rows).
    pub async fn assure_prompt(&mut self) -> Result<Vec<String>> {
        let idle = LinePattern::exact("");
        let mut seen = Vec::new();

        for _ in 0..2 {
            self.write_line("").await;
            let found = self.try_expect(&idle, self.protocol.prompt_timeout).await?;
            seen.extend(found.collected);
            if found.matched {
                return Ok(seen);
            }
        }

        self.write_line("").await;
        let collected = self.expect(&idle, self.protocol.command_timeout).await?;
        seen.extend(collected);
        Ok(seen)
    }

    /// Run one command exchange and report the device's verdict.
    pub async fn try_command(&mut self, cmd: &str, timeout: Duration) -> Result<CommandOutcome> {
        self.write_line(cmd).await;
        self.expect(&LinePattern::exact(cmd), timeout).await?;
        let mut output = self.expect(&DONE_OR_ERROR, timeout).await?;

        let terminal = output
            .pop()
            .ok_or_else(|| MeshsimError::protocol(self.id, "missing terminal line"))?;

        if terminal == "Done" {
            return Ok(CommandOutcome::Done(output));
        }

        let caps = ERROR_LINE
            .captures(&terminal)
            .ok_or_else(|| MeshsimError::protocol(self.id, format!("bad terminal line: {terminal:?}")))?;
        let code = caps[1]
            .parse::<u32>()
            .map_err(|_| MeshsimError::protocol(self.id, format!("bad error code: {terminal:?}")))?;

        Ok(CommandOutcome::Failed {
            code,
            message: caps[2].to_string(),
        })
    }

    /// Run one command exchange; `Error N: msg` is a hard fault.
    pub async fn command(&mut self, cmd: &str, timeout: Duration) -> Result<Vec<String>> {
        match self.try_command(cmd, timeout).await? {
            CommandOutcome::Done(output) => Ok(output),
            CommandOutcome::Failed { code, message } => Err(MeshsimError::Command {
                node: self.id,
                code,
                message,
            }),
        }
    }

    /// [`command`](Self::command) with the configured default timeout.
    pub async fn run(&mut self, cmd: &str) -> Result<Vec<String>> {
        self.command(cmd, self.protocol.command_timeout).await
    }

    /// Command whose output must be exactly one line.
    pub async fn command_expect_string(&mut self, cmd: &str, timeout: Duration) -> Result<String> {
        let mut output = self.command(cmd, timeout).await?;
        if output.len() != 1 {
            return Err(MeshsimError::protocol(
                self.id,
                format!("expected 1 line, but received {}: {:?}", output.len(), output),
            ));
        }
        Ok(output.remove(0))
    }

    /// Single-line decimal value, or hexadecimal when prefixed `0x`/`0X`.
    pub async fn command_expect_int(&mut self, cmd: &str, timeout: Duration) -> Result<i64> {
        let s = self.command_expect_string(cmd, timeout).await?;
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => i64::from_str_radix(hex, 16),
            None => s.parse::<i64>(),
        };
        parsed.map_err(|_| MeshsimError::protocol(self.id, format!("unexpected number: {s:?}")))
    }

    /// Single-line hexadecimal value (an optional `0x` prefix is accepted).
    pub async fn command_expect_hex(&mut self, cmd: &str, timeout: Duration) -> Result<u64> {
        let s = self.command_expect_string(cmd, timeout).await?;
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(&s);
        u64::from_str_radix(digits, 16)
            .map_err(|_| MeshsimError::protocol(self.id, format!("unexpected number: {s:?}")))
    }

    /// Send `cmd` and wait only for its echo; results arrive asynchronously.
    pub async fn command_expect_none(&mut self, cmd: &str, timeout: Duration) -> Result<()> {
        self.write_line(cmd).await;
        self.expect(&LinePattern::exact(cmd), timeout).await?;
        Ok(())
    }

    /// Single-line `Enabled` / `Disabled`.
    pub async fn command_expect_enabled(&mut self, cmd: &str, timeout: Duration) -> Result<bool> {
        match self.command_expect_string(cmd, timeout).await?.as_str() {
            "Enabled" => Ok(true),
            "Disabled" => Ok(false),
            other => Err(MeshsimError::protocol(
                self.id,
                format!("expect Enabled/Disabled, but read: {other:?}"),
            )),
        }
    }

    /// Single-line `true` / `false`.
    pub async fn command_expect_bool(&mut self, cmd: &str, timeout: Duration) -> Result<bool> {
        match self.command_expect_string(cmd, timeout).await?.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(MeshsimError::protocol(
                self.id,
                format!("expect true/false, but read: {other:?}"),
            )),
        }
    }

    /// Start an echo request. Replies are asynchronous and not part of this
    /// exchange, so only the echo is awaited before resynchronizing.
    pub async fn ping(
        &mut self,
        addr: &str,
        payload_size: u32,
        count: u32,
        interval: u32,
        hop_limit: u32,
    ) -> Result<()> {
        let cmd = format!("ping {addr} {payload_size} {count} {interval} {hop_limit}");
        self.command_expect_none(&cmd, self.protocol.command_timeout).await?;
        self.assure_prompt().await?;
        Ok(())
    }

    /// Software reset; the shell restarts and is resynchronized.
    pub async fn reset(&mut self) -> Result<()> {
        warn!(node = self.id, "reset");
        self.write_line("reset").await;
        self.assure_prompt().await?;
        debug!(node = self.id, "ready");
        Ok(())
    }

    /// Factory reset; settings are wiped and the shell is resynchronized.
    pub async fn factory_reset(&mut self) -> Result<()> {
        warn!(node = self.id, "factoryreset");
        self.write_line("factoryreset").await;
        self.assure_prompt().await?;
        debug!(node = self.id, "ready");
        Ok(())
    }

    /// Ask the process to exit and reap it.
    ///
    /// Faults if the output stream is still open after the command timeout.
    /// A non-zero exit status is only logged.
    pub async fn exit(mut self) -> Result<()> {
        self.write_line("exit").await;
        self.matcher.expect_eof(self.protocol.command_timeout).await?;

        let status = self
            .child
            .wait()
            .await
            .with_context(|| format!("waiting for node {} to exit", self.id))?;

        if status.success() {
            info!(node = self.id, "node process exited");
        } else {
            warn!(
                node = self.id,
                exit_code = status.code().unwrap_or(-1),
                "node process exit error"
            );
        }

        // Reader already closed the buffer; the drain ends with the pipe.
        for task in [self.reader.take(), self.diagnostics_drain.take()].into_iter().flatten() {
            let _ = task.await;
        }
        Ok(())
    }
}
