// src/engine/mod.rs

//! Simulation engine.
//!
//! This module ties together:
//! - the virtual clock ([`clock`])
//! - the single-writer executor that owns the simulation state and is the
//!   only path by which it is mutated ([`executor`])
//! - the node registry, failure schedules and packet loss ([`simulation`])
//! - the aggregate counters ([`counters`])

pub mod clock;
pub mod counters;
pub mod executor;
pub mod simulation;

pub use clock::{MAX_SPEED, VirtualClock};
pub use counters::Counters;
pub use executor::{BoxFuture, ExecutorProxy, Steppable, WorkItem, spawn_executor};
pub use simulation::{NetworkParams, Node, NodeConfig, Simulation};

/// Proxy type used by the command layer.
pub type SimProxy = ExecutorProxy<Simulation>;
