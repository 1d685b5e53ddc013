// src/exec/line_buffer.rs

//! Bounded, drop-oldest buffer of pending output lines for one node process.
//!
//! There is exactly one producer (the node's line reader) and at most one
//! consumer at a time (the node's matcher). The producer never blocks: when
//! the ring is full it evicts the oldest line to make room.
//!
//! Closing the buffer is permanent. A closed buffer still hands out the lines
//! that were read before the close; only once it is drained does
//! [`PendingLineBuffer::next_line`] report end-of-stream.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

#[derive(Debug)]
pub struct PendingLineBuffer {
    capacity: usize,
    inner: Mutex<Ring>,
    available: Notify,
}

#[derive(Debug)]
struct Ring {
    lines: VecDeque<String>,
    closed: bool,
}

/// Non-blocking view of the buffer head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingLine {
    Line(String),
    /// Open but nothing buffered right now.
    Empty,
    /// Closed and fully drained.
    Eof,
}

impl PendingLineBuffer {
    /// Create a buffer holding at most `capacity` lines (clamped to >= 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Ring {
                lines: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().lines.is_empty()
    }

    /// True once the producer has closed the buffer and every line has been
    /// consumed.
    pub fn is_eof(&self) -> bool {
        let ring = self.lock();
        ring.closed && ring.lines.is_empty()
    }

    /// Append `line` if there is room. Hands the line back when full.
    pub fn try_push(&self, line: String) -> Result<(), String> {
        {
            let mut ring = self.lock();
            if ring.lines.len() >= self.capacity {
                return Err(line);
            }
            ring.lines.push_back(line);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Drop the oldest buffered line, returning it.
    pub fn evict_oldest(&self) -> Option<String> {
        self.lock().lines.pop_front()
    }

    /// Producer-side admission: enqueue `line`, evicting exactly one old line
    /// if the ring is full. Returns the evicted line, if any.
    pub fn push_evicting(&self, line: String) -> Option<String> {
        let line = match self.try_push(line) {
            Ok(()) => return None,
            Err(line) => line,
        };

        let evicted = self.evict_oldest();
        // Sole producer: the slot freed above cannot be taken by anyone else.
        if let Err(line) = self.try_push(line) {
            tracing::error!(%line, "line buffer still full after eviction; dropping line");
        }
        evicted
    }

    /// Mark the upstream stream as permanently closed.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_one();
    }

    /// Take the next line without waiting.
    pub fn try_next(&self) -> PendingLine {
        let mut ring = self.lock();
        match ring.lines.pop_front() {
            Some(line) => PendingLine::Line(line),
            None if ring.closed => PendingLine::Eof,
            None => PendingLine::Empty,
        }
    }

    /// Wait for the next line. `None` means permanent end-of-stream.
    ///
    /// Cancel-safe: a line is only removed from the ring in the same poll
    /// that returns it.
    pub async fn next_line(&self) -> Option<String> {
        loop {
            match self.try_next() {
                PendingLine::Line(line) => return Some(line),
                PendingLine::Eof => return None,
                PendingLine::Empty => self.available.notified().await,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
