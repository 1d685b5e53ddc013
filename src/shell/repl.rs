// src/shell/repl.rs

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::context::OutputSink;
use super::runner::CommandExecutor;
use super::{Command, NodeCmd, NodeSelector};
use crate::errors::Result;
use crate::types::NodeId;

/// Read commands from `input` until EOF, `exit` or cancellation.
///
/// Each command's output is followed by `Done` or `Error: <message>`. In node
/// context (entered with a bare `node <id>`) every line is forwarded to that
/// node, and `exit` returns to the simulation prompt.
pub async fn run_repl<R>(
    executor: &CommandExecutor,
    input: R,
    output: &OutputSink,
    cancel: &CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut node_context: Option<NodeId> = None;

    loop {
        match node_context {
            Some(id) => output.prompt(&format!("node {id}> ")),
            None => output.prompt("> "),
        }

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("shell cancelled");
                break;
            }
            next = lines.next_line() => next?,
        };

        let Some(line) = next else {
            debug!("shell input closed");
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed = match node_context {
            Some(_) if line == "exit" => {
                node_context = None;
                output.line("Done");
                continue;
            }
            Some(id) => Ok(Command::Node(NodeCmd {
                node: NodeSelector::new(id),
                command: Some(line.to_string()),
            })),
            None => line.parse::<Command>(),
        };

        let cmd = match parsed {
            Ok(cmd) => cmd,
            Err(e) => {
                output.line(format_args!("Error: {e}"));
                continue;
            }
        };

        let cc = executor.execute(cmd).await;
        if let Some(id) = cc.enter_node() {
            node_context = Some(id);
        }
        match cc.err() {
            Some(e) => output.line(format_args!("Error: {e}")),
            None => output.line("Done"),
        }
        if cc.exit_requested() {
            break;
        }
    }

    Ok(())
}
