// src/shell/mod.rs

//! Interactive command layer.
//!
//! - [`parse`] turns one input line into a [`Command`].
//! - [`context`] holds the per-command output sink and error slot.
//! - [`runner`] dispatches a command to its handler and routes every access
//!   to simulation state through the executor proxy.
//! - [`repl`] is the line-oriented front end over any async reader.

use std::fmt;

use crate::errors::{MeshsimError, Result};
use crate::types::{AddrType, NodeId};

pub mod context;
pub mod parse;
pub mod repl;
pub mod runner;

pub use context::{CommandContext, OutputSink};
pub use repl::run_repl;
pub use runner::CommandExecutor;

/// Reference to a target node as typed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSelector {
    pub id: NodeId,
}

impl NodeSelector {
    pub fn new(id: NodeId) -> Self {
        Self { id }
    }

    /// Resolve to a node id. Only positive numeric ids are supported.
    pub fn resolve(&self) -> Result<NodeId> {
        if self.id > 0 {
            return Ok(self.id);
        }
        Err(MeshsimError::Other(anyhow::anyhow!(
            "node selector not implemented: {}",
            self.id
        )))
    }
}

impl fmt::Display for NodeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// One parsed shell command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add(AddCmd),
    Del(DelCmd),
    Move(MoveCmd),
    Go(GoCmd),
    Speed(SpeedCmd),
    Nodes,
    Partitions,
    Ping(PingCmd),
    Node(NodeCmd),
    Radio(RadioCmd),
    Plr(PlrCmd),
    Counters,
    Scan(ScanCmd),
    Debug(DebugCmd),
    Exit,
}

/// `add <type> [x n] [y n] [id n] [rr n]`. The type is checked by the
/// handler so an unknown one is reported like any other user error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCmd {
    pub node_type: String,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub id: Option<NodeId>,
    pub radio_range: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelCmd {
    pub nodes: Vec<NodeSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCmd {
    pub target: NodeSelector,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GoDuration {
    Seconds(f64),
    Ever,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoCmd {
    pub duration: GoDuration,
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedCmd {
    Get,
    Set(f64),
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingDst {
    Node(NodeSelector),
    Addr(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingCmd {
    pub src: NodeSelector,
    pub dst: PingDst,
    pub addr_type: AddrType,
    pub data_size: Option<u32>,
    pub count: Option<u32>,
    pub interval: Option<u32>,
    pub hop_limit: Option<u32>,
}

/// `node <id>` enters node context; `node <id> "cmd"` runs one device
/// command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCmd {
    pub node: NodeSelector,
    pub command: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RadioAction {
    On,
    Off,
    /// Failure schedule in seconds; zero in either field disables it.
    FailTime { interval: f64, duration: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadioCmd {
    pub nodes: Vec<NodeSelector>,
    pub action: RadioAction,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlrCmd {
    pub ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCmd {
    pub node: NodeSelector,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugCmd {
    pub echo: Option<String>,
    pub fail: bool,
}
