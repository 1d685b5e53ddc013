// src/engine/executor.rs

//! Single-writer executor for simulation state.
//!
//! The state is moved into one owning task. Callers hold an
//! [`ExecutorProxy`] and submit closures over `&mut S`; the owning task runs
//! them one at a time, in submission order, and advances virtual time between
//! them. There is no other path to the state, so no two work items ever see
//! interleaved mutation.
//!
//! Work closures borrow the state for the lifetime of the future they
//! return:
//!
//! ```ignore
//! let count = proxy.call(|sim| Box::pin(async move { sim.node_count() })).await?;
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::clock::VirtualClock;
use crate::errors::{MeshsimError, Result};

/// Boxed future borrowing the executor state.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased unit of work.
pub type Action<S> = Box<dyn for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send>;

/// State driven by the owning loop.
///
/// The loop only needs the state's clock to pace itself; everything else is
/// reached through submitted work.
pub trait Steppable: Send + 'static {
    fn clock(&self) -> &VirtualClock;

    fn clock_mut(&mut self) -> &mut VirtualClock;

    /// Hook run after every virtual-time step.
    fn on_time_advanced(&mut self, _now: Duration) {}
}

/// One queued unit of work plus an optional completion signal.
pub struct WorkItem<S> {
    action: Action<S>,
    done: Option<oneshot::Sender<()>>,
}

impl<S> WorkItem<S> {
    pub fn new(action: Action<S>, done: Option<oneshot::Sender<()>>) -> Self {
        Self { action, done }
    }
}

/// Cloneable handle for submitting work to the owning task.
pub struct ExecutorProxy<S> {
    tx: mpsc::Sender<WorkItem<S>>,
    cancel: CancellationToken,
}

impl<S> Clone for ExecutorProxy<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S> std::fmt::Debug for ExecutorProxy<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorProxy")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

/// Move `state` into a new owning task.
///
/// `queue_len` bounds the number of submitted but not yet started items;
/// submitters wait for room. The task ends when `cancel` fires or every proxy
/// is dropped, and hands the state back through its join handle.
pub fn spawn_executor<S: Steppable>(
    state: S,
    queue_len: usize,
    cancel: CancellationToken,
) -> (ExecutorProxy<S>, JoinHandle<S>) {
    let (tx, rx) = mpsc::channel(queue_len.max(1));
    let handle = tokio::spawn(owning_loop(state, rx, cancel.clone()));
    (ExecutorProxy { tx, cancel }, handle)
}

async fn owning_loop<S: Steppable>(
    mut state: S,
    mut rx: mpsc::Receiver<WorkItem<S>>,
    cancel: CancellationToken,
) -> S {
    info!("simulation executor started");
    let mut next_step: Option<Instant> = None;

    loop {
        match (next_step, state.clock().next_step_delay()) {
            (None, Some(delay)) => next_step = Some(Instant::now() + delay),
            (Some(_), None) => next_step = None,
            _ => {}
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("simulation executor cancelled");
                break;
            }

            item = rx.recv() => match item {
                Some(item) => {
                    // A panicking item loses its result, never the executor.
                    let action = item.action;
                    let res = AssertUnwindSafe(async { action(&mut state).await })
                        .catch_unwind()
                        .await;
                    match (res, item.done) {
                        (Ok(()), Some(done)) => {
                            let _ = done.send(());
                        }
                        (Ok(()), None) => {}
                        (Err(panic), _) => {
                            error!(panic = panic_message(&*panic), "work item panicked");
                        }
                    }
                }
                None => {
                    debug!("all executor proxies dropped");
                    break;
                }
            },

            _ = sleep_until(next_step.unwrap_or_else(Instant::now)), if next_step.is_some() => {
                next_step = None;
                let now = state.clock_mut().advance();
                state.on_time_advanced(now);
                if state.clock().next_step_delay() == Some(Duration::ZERO) {
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    // Dropping the receiver fails every queued item's completion signal, so
    // callers still blocked on one get `ExecutorStopped`. The channel closes
    // before the items drop, which tells them apart from `WorkAborted`.
    drop(rx);
    info!("simulation executor stopped");
    state
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

impl<S: Steppable> ExecutorProxy<S> {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True once the owning task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue `work` for exclusive execution on the owning task.
    ///
    /// With `wait`, returns once the item has run; otherwise returns as soon
    /// as it is queued.
    pub async fn submit<F>(&self, work: F, wait: bool) -> Result<()>
    where
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
    {
        let (done, finished) = if wait {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        self.tx
            .send(WorkItem::new(Box::new(work), done))
            .await
            .map_err(|_| MeshsimError::ExecutorStopped)?;

        if let Some(finished) = finished {
            finished.await.map_err(|_| self.lost_result())?;
        }
        Ok(())
    }

    /// Run `work` on the owning task and hand back its result.
    pub async fn call<R, F>(&self, work: F) -> Result<R>
    where
        R: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, R> + Send + 'static,
    {
        let (item, result) = wrap_call(work);
        self.tx
            .send(item)
            .await
            .map_err(|_| MeshsimError::ExecutorStopped)?;
        result.await.map_err(|_| self.lost_result())
    }

    /// [`call`](Self::call) for plain threads outside the runtime.
    ///
    /// Panics if invoked from within an async context.
    pub fn call_blocking<R, F>(&self, work: F) -> Result<R>
    where
        R: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, R> + Send + 'static,
    {
        let (item, result) = wrap_call(work);
        self.tx
            .blocking_send(item)
            .map_err(|_| MeshsimError::ExecutorStopped)?;
        result.blocking_recv().map_err(|_| self.lost_result())
    }

    /// Why a submitted item never reported back: either the owner is gone,
    /// or the item panicked and the owner moved on.
    fn lost_result(&self) -> MeshsimError {
        if self.tx.is_closed() {
            MeshsimError::ExecutorStopped
        } else {
            MeshsimError::WorkAborted
        }
    }

    /// Ask for `duration` of virtual time; the receiver completes when the
    /// clock gets there.
    pub async fn request_advance(&self, duration: Duration) -> Result<oneshot::Receiver<()>> {
        self.call(move |s| Box::pin(async move { s.clock_mut().request_advance(duration) }))
            .await
    }

    /// Advance virtual time by `duration` and wait until it has passed.
    pub async fn go(&self, duration: Duration) -> Result<()> {
        let reached = self.request_advance(duration).await?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MeshsimError::Cancelled),
            res = reached => res.map_err(|_| MeshsimError::ExecutorStopped),
        }
    }

    /// Advance virtual time in `chunk`-sized pieces until `stop` fires.
    ///
    /// `stop` is only checked between chunks.
    pub async fn go_forever(&self, chunk: Duration, stop: &CancellationToken) -> Result<()> {
        while !stop.is_cancelled() {
            match self.go(chunk).await {
                Err(MeshsimError::Cancelled) if stop.is_cancelled() => break,
                res => res?,
            }
        }
        Ok(())
    }

    pub async fn set_rate(&self, speed: f64) -> Result<()> {
        self.call(move |s| Box::pin(async move { s.clock_mut().set_speed(speed) }))
            .await
    }

    pub async fn rate(&self) -> Result<f64> {
        self.call(|s| Box::pin(async move { s.clock().speed() })).await
    }

    pub async fn now(&self) -> Result<Duration> {
        self.call(|s| Box::pin(async move { s.clock().now() })).await
    }
}

fn wrap_call<S, R, F>(work: F) -> (WorkItem<S>, oneshot::Receiver<R>)
where
    S: Steppable,
    R: Send + 'static,
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, R> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let action: Action<S> = Box::new(move |state| {
        Box::pin(async move {
            let _ = tx.send(work(state).await);
        })
    });
    (WorkItem::new(action, None), rx)
}
