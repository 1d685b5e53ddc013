// src/engine/clock.rs

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::trace;

/// Speed at which virtual time is advanced without any real-time pacing.
pub const MAX_SPEED: f64 = 1_000_000.0;

/// Longest real-time pause between two steps, however slow the speed.
const MAX_STEP_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Virtual clock of one simulation.
///
/// Time only moves while someone has asked for it (see
/// [`request_advance`](Self::request_advance)); the owning loop then calls
/// [`advance`](Self::advance) once per step, pacing steps in real time by
/// [`next_step_delay`](Self::next_step_delay).
#[derive(Debug)]
pub struct VirtualClock {
    now: Duration,
    step: Duration,
    speed: f64,
    waiters: Vec<(Duration, oneshot::Sender<()>)>,
}

impl VirtualClock {
    pub fn new(step: Duration, speed: f64) -> Self {
        Self {
            now: Duration::ZERO,
            step: step.max(Duration::from_micros(1)),
            speed: clamp_speed(speed),
            waiters: Vec::new(),
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn step_size(&self) -> Duration {
        self.step
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = clamp_speed(speed);
    }

    /// True when nobody is waiting for virtual time to pass.
    pub fn is_idle(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Ask for virtual time to advance by `duration` from now.
    ///
    /// The returned receiver completes once the clock has reached the target.
    /// A zero duration completes immediately.
    pub fn request_advance(&mut self, duration: Duration) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if duration.is_zero() {
            let _ = tx.send(());
        } else {
            self.waiters.push((self.now.saturating_add(duration), tx));
        }
        rx
    }

    /// Real-time delay before the next step, or `None` while idle.
    pub fn next_step_delay(&self) -> Option<Duration> {
        if self.is_idle() {
            return None;
        }
        if self.speed >= MAX_SPEED {
            return Some(Duration::ZERO);
        }
        let delay = Duration::try_from_secs_f64(self.step.as_secs_f64() / self.speed)
            .unwrap_or(MAX_STEP_DELAY);
        Some(delay.min(MAX_STEP_DELAY))
    }

    /// Move one step forward, stopping early at the nearest requested
    /// target, and complete every request that is now due.
    pub fn advance(&mut self) -> Duration {
        // Waiters whose caller went away no longer hold time back.
        self.waiters.retain(|(_, tx)| !tx.is_closed());

        let mut target = self.now.saturating_add(self.step);
        if let Some(earliest) = self.waiters.iter().map(|(at, _)| *at).min() {
            target = target.min(earliest);
        }
        self.now = target;

        let now = self.now;
        let (due, pending): (Vec<_>, Vec<_>) =
            self.waiters.drain(..).partition(|(at, _)| *at <= now);
        self.waiters = pending;

        for (_, tx) in due {
            let _ = tx.send(());
        }

        trace!(now = ?self.now, waiting = self.waiters.len(), "virtual time advanced");
        self.now
    }
}

fn clamp_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed.min(MAX_SPEED)
    } else {
        MAX_SPEED
    }
}
