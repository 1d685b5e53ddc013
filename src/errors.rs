// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! The variants follow the fault taxonomy of the node protocol:
//!
//! - `Protocol`, `Timeout`, `ProcessEof` and `Command` are hard faults for the
//!   in-flight exchange with a node process.
//! - `User` is a handler-level validation failure (unknown node type, node not
//!   found, ...). Handlers record it on the command context and keep going.
//! - The remaining variants cover the executor, configuration and IO plumbing.

use std::time::Duration;

use thiserror::Error;

use crate::types::NodeId;

#[derive(Error, Debug)]
pub enum MeshsimError {
    #[error("node {node}: protocol violation: {reason}")]
    Protocol { node: NodeId, reason: String },

    #[error("node {node}: no line matching {expected} within {timeout:?}")]
    Timeout {
        node: NodeId,
        expected: String,
        timeout: Duration,
    },

    #[error("node {node}: EOF: {diagnostics}")]
    ProcessEof { node: NodeId, diagnostics: String },

    #[error("node {node}: Error {code}: {message}")]
    Command {
        node: NodeId,
        code: u32,
        message: String,
    },

    #[error("{0}")]
    User(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("wait cancelled")]
    Cancelled,

    #[error("simulation executor stopped")]
    ExecutorStopped,

    #[error("work item aborted")]
    WorkAborted,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MeshsimError {
    pub fn user(msg: impl Into<String>) -> Self {
        MeshsimError::User(msg.into())
    }

    pub fn protocol(node: NodeId, reason: impl Into<String>) -> Self {
        MeshsimError::Protocol {
            node,
            reason: reason.into(),
        }
    }

    /// True for faults that abort the in-flight exchange with a node.
    pub fn is_hard_fault(&self) -> bool {
        !matches!(self, MeshsimError::User(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, MeshsimError>;
