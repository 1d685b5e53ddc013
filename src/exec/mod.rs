// src/exec/mod.rs

//! Node process layer.
//!
//! Everything needed to talk to one external device process over its
//! standard streams:
//!
//! - [`line_buffer`] holds the bounded, drop-oldest queue of pending lines.
//! - [`line_reader`] owns the background tasks that fill it (stdout) and
//!   drain the diagnostic stream (stderr).
//! - [`matcher`] waits, with a deadline, for a line matching a pattern.
//! - [`driver`] implements the echo / terminal-line command protocol.
//! - [`accessors`] layers typed device getters and setters on the driver.

pub mod accessors;
pub mod driver;
pub mod line_buffer;
pub mod line_reader;
pub mod matcher;

pub use accessors::LeaderData;
pub use driver::{CommandOutcome, NodeProcessDriver};
pub use line_buffer::{PendingLine, PendingLineBuffer};
pub use line_reader::{Diagnostics, normalize_line, spawn_diagnostics_drain, spawn_line_reader};
pub use matcher::{Expectation, LineMatcher, LinePattern};
