// src/exec/matcher.rs

//! Deadline-bound line matching over a node's pending line buffer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::line_buffer::PendingLineBuffer;
use super::line_reader::Diagnostics;
use crate::errors::{MeshsimError, Result};
use crate::types::NodeId;

/// What a waited-for line has to look like.
#[derive(Debug, Clone)]
pub enum LinePattern {
    /// Byte-for-byte equality.
    Exact(String),
    /// The whole line matches the regex.
    Pattern(Regex),
    /// Equal to one of the listed lines.
    OneOf(Vec<String>),
}

impl LinePattern {
    pub fn exact(line: impl Into<String>) -> Self {
        LinePattern::Exact(line.into())
    }

    /// Build a full-line regex pattern (the expression is anchored at both
    /// ends).
    pub fn regex(expr: &str) -> std::result::Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{expr})$")).map(LinePattern::Pattern)
    }

    pub fn one_of<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LinePattern::OneOf(lines.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, line: &str) -> bool {
        match self {
            LinePattern::Exact(expected) => line == expected,
            LinePattern::Pattern(re) => re.is_match(line),
            LinePattern::OneOf(expected) => expected.iter().any(|s| s == line),
        }
    }
}

impl fmt::Display for LinePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinePattern::Exact(s) => write!(f, "{s:?}"),
            LinePattern::Pattern(re) => write!(f, "/{}/", re.as_str()),
            LinePattern::OneOf(set) => write!(f, "one of {set:?}"),
        }
    }
}

/// Result of a non-faulting wait.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expectation {
    pub matched: bool,
    /// Every line read while waiting, in arrival order. When `matched`, the
    /// last entry is the matching line.
    pub collected: Vec<String>,
}

/// Consumer side of one node's line stream.
#[derive(Debug, Clone)]
pub struct LineMatcher {
    node: NodeId,
    lines: Arc<PendingLineBuffer>,
    diagnostics: Diagnostics,
    cancel: CancellationToken,
}

impl LineMatcher {
    pub fn new(
        node: NodeId,
        lines: Arc<PendingLineBuffer>,
        diagnostics: Diagnostics,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            node,
            lines,
            diagnostics,
            cancel,
        }
    }

    pub fn buffer(&self) -> &Arc<PendingLineBuffer> {
        &self.lines
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Read lines until one matches `pattern` or `timeout` elapses.
    ///
    /// Returns `matched = false` on deadline. End-of-stream while waiting is
    /// always a [`MeshsimError::ProcessEof`]: the process died while a
    /// response was outstanding.
    pub async fn try_expect_line(
        &self,
        pattern: &LinePattern,
        timeout: Duration,
    ) -> Result<Expectation> {
        let deadline = Instant::now() + timeout;
        let mut collected = Vec::new();

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Err(MeshsimError::Cancelled),

                _ = sleep_until(deadline) => {
                    return Ok(Expectation { matched: false, collected });
                }

                next = self.lines.next_line() => match next {
                    Some(line) => {
                        debug!(node = self.node, "{}", line);
                        let matched = pattern.matches(&line);
                        collected.push(line);
                        if matched {
                            return Ok(Expectation { matched: true, collected });
                        }
                    }
                    None => {
                        return Err(MeshsimError::ProcessEof {
                            node: self.node,
                            diagnostics: self.diagnostics.snapshot(),
                        });
                    }
                },
            }
        }
    }

    /// Like [`try_expect_line`](Self::try_expect_line), but a missed
    /// deadline is a [`MeshsimError::Timeout`].
    pub async fn expect_line(&self, pattern: &LinePattern, timeout: Duration) -> Result<Vec<String>> {
        let found = self.try_expect_line(pattern, timeout).await?;
        if !found.matched {
            return Err(MeshsimError::Timeout {
                node: self.node,
                expected: pattern.to_string(),
                timeout,
            });
        }
        Ok(found.collected)
    }

    /// Drain lines until permanent end-of-stream; fault if the stream is
    /// still open at the deadline.
    pub async fn expect_eof(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Err(MeshsimError::Cancelled),

                _ = sleep_until(deadline) => {
                    return Err(MeshsimError::Timeout {
                        node: self.node,
                        expected: "EOF".to_string(),
                        timeout,
                    });
                }

                next = self.lines.next_line() => match next {
                    Some(line) => warn!(node = self.node, "{}", line),
                    None => return Ok(()),
                },
            }
        }
    }
}
