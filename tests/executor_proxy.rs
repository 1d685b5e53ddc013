// tests/executor_proxy.rs

use std::error::Error;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use meshsim::engine::{MAX_SPEED, Steppable, VirtualClock, spawn_executor};
use meshsim::errors::MeshsimError;
use meshsim_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// Minimal state: a clock plus a log of everything that touched it.
#[derive(Debug)]
struct Recorder {
    clock: VirtualClock,
    log: Vec<String>,
    /// Number of work items currently running; must never exceed one.
    active: u32,
    steps: u64,
}

impl Recorder {
    fn new(speed: f64) -> Self {
        Self {
            clock: VirtualClock::new(Duration::from_millis(10), speed),
            log: Vec::new(),
            active: 0,
            steps: 0,
        }
    }
}

impl Steppable for Recorder {
    fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    fn clock_mut(&mut self) -> &mut VirtualClock {
        &mut self.clock
    }

    fn on_time_advanced(&mut self, _now: Duration) {
        self.steps += 1;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_callers_from_many_threads_are_totally_ordered() -> TestResult {
    init_tracing();
    let cancel = CancellationToken::new();
    let (proxy, handle) = spawn_executor(Recorder::new(1.0), 4, cancel.clone());

    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    let mut threads = Vec::new();
    for t in 0..THREADS {
        let proxy = proxy.clone();
        threads.push(std::thread::spawn(move || {
            for i in 0..PER_THREAD {
                let entry = format!("{t}:{i}");
                proxy
                    .call_blocking(move |s: &mut Recorder| {
                        Box::pin(async move {
                            s.active += 1;
                            assert_eq!(s.active, 1, "work items overlapped");
                            tokio::task::yield_now().await;
                            s.log.push(entry);
                            s.active -= 1;
                        })
                    })
                    .expect("executor alive");
            }
        }));
    }

    tokio::task::spawn_blocking(move || {
        for t in threads {
            t.join().expect("caller thread panicked");
        }
    })
    .await?;

    cancel.cancel();
    let state = with_timeout(handle).await?;
    assert_eq!(state.log.len(), THREADS * PER_THREAD);

    // Each caller's own items keep their submission order.
    for t in 0..THREADS {
        let mine: Vec<usize> = state
            .log
            .iter()
            .filter_map(|e| e.strip_prefix(&format!("{t}:")))
            .map(|i| i.parse().expect("index"))
            .collect();
        assert_eq!(mine, (0..PER_THREAD).collect::<Vec<_>>());
    }
    Ok(())
}

#[tokio::test]
async fn submit_without_wait_still_runs_in_order() -> TestResult {
    init_tracing();
    let cancel = CancellationToken::new();
    let (proxy, handle) = spawn_executor(Recorder::new(1.0), 16, cancel.clone());

    for i in 0..5 {
        proxy
            .submit(
                move |s: &mut Recorder| Box::pin(async move { s.log.push(i.to_string()) }),
                false,
            )
            .await?;
    }
    proxy
        .submit(|s: &mut Recorder| Box::pin(async move { s.log.push("last".into()) }), true)
        .await?;

    let log = proxy.call(|s: &mut Recorder| Box::pin(async move { s.log.clone() })).await?;
    assert_eq!(log, vec!["0", "1", "2", "3", "4", "last"]);

    cancel.cancel();
    with_timeout(handle).await?;
    Ok(())
}

#[tokio::test]
async fn go_advances_virtual_time_by_the_requested_amount() -> TestResult {
    init_tracing();
    let cancel = CancellationToken::new();
    let (proxy, handle) = spawn_executor(Recorder::new(MAX_SPEED), 8, cancel.clone());

    assert_eq!(proxy.now().await?, Duration::ZERO);
    with_timeout(proxy.go(Duration::from_secs(5))).await?;
    assert_eq!(proxy.now().await?, Duration::from_secs(5));

    // Time does not move while nobody asks for it.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(proxy.now().await?, Duration::from_secs(5));

    cancel.cancel();
    let state = with_timeout(handle).await?;
    assert_eq!(state.steps, 500);
    Ok(())
}

#[tokio::test]
async fn rate_can_be_read_back() -> TestResult {
    init_tracing();
    let cancel = CancellationToken::new();
    let (proxy, handle) = spawn_executor(Recorder::new(1.0), 8, cancel.clone());

    assert_eq!(proxy.rate().await?, 1.0);
    proxy.set_rate(20.0).await?;
    assert_eq!(proxy.rate().await?, 20.0);
    proxy.set_rate(f64::INFINITY).await?;
    assert_eq!(proxy.rate().await?, MAX_SPEED);

    cancel.cancel();
    with_timeout(handle).await?;
    Ok(())
}

#[tokio::test]
async fn teardown_releases_waiting_callers() -> TestResult {
    init_tracing();
    let cancel = CancellationToken::new();
    // Slow clock: the advance below cannot finish before teardown.
    let (proxy, handle) = spawn_executor(Recorder::new(0.001), 8, cancel.clone());

    let waiter = {
        let proxy = proxy.clone();
        tokio::spawn(async move { proxy.go(Duration::from_secs(3600)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    cancel.cancel();
    let res = with_timeout(waiter).await?;
    assert!(
        matches!(res, Err(MeshsimError::Cancelled | MeshsimError::ExecutorStopped)),
        "got {res:?}"
    );
    with_timeout(handle).await?;

    let err = proxy
        .call(|s: &mut Recorder| Box::pin(async move { s.steps }))
        .await
        .expect_err("executor is gone");
    assert!(matches!(err, MeshsimError::ExecutorStopped));
    Ok(())
}

#[tokio::test]
async fn owner_stops_when_every_proxy_is_dropped() -> TestResult {
    init_tracing();
    let (proxy, handle) = spawn_executor(Recorder::new(0.001), 8, CancellationToken::new());

    let reached = proxy.request_advance(Duration::from_secs(60)).await?;
    drop(proxy);

    let state = with_timeout(handle).await?;
    assert!(state.clock.now() < Duration::from_secs(60));
    assert!(!state.clock.is_idle());

    // The pending request fails once the state holding it is gone.
    drop(state);
    assert!(with_timeout(reached).await.is_err());
    Ok(())
}

#[tokio::test]
async fn go_forever_stops_at_an_iteration_boundary() -> TestResult {
    init_tracing();
    let cancel = CancellationToken::new();
    let (proxy, handle) = spawn_executor(Recorder::new(MAX_SPEED), 8, cancel.clone());
    let stop = CancellationToken::new();

    let runner = {
        let proxy = proxy.clone();
        let stop = stop.clone();
        tokio::spawn(async move { proxy.go_forever(Duration::from_secs(1), &stop).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.cancel();
    with_timeout(runner).await??;

    let now = proxy.now().await?;
    assert!(now >= Duration::from_secs(1));
    assert_eq!(now.subsec_nanos(), 0, "stopped mid-iteration at {now:?}");

    cancel.cancel();
    with_timeout(handle).await?;
    Ok(())
}

#[tokio::test]
async fn panicking_work_item_does_not_stop_the_executor() -> TestResult {
    init_tracing();
    let cancel = CancellationToken::new();
    let (proxy, handle) = spawn_executor(Recorder::new(1.0), 8, cancel.clone());

    let err = proxy
        .call(|s: &mut Recorder| {
            Box::pin(async move {
                s.steps = s.steps.checked_sub(1).expect("no steps taken yet");
            })
        })
        .await
        .expect_err("item panicked");
    assert!(matches!(err, MeshsimError::WorkAborted), "got {err:?}");

    let err = proxy
        .submit(
            |s: &mut Recorder| {
                Box::pin(async move {
                    let first = s.log.first().cloned().expect("log is still empty");
                    s.log.push(first);
                })
            },
            true,
        )
        .await
        .expect_err("item panicked");
    assert!(matches!(err, MeshsimError::WorkAborted), "got {err:?}");

    // Later items run as usual.
    proxy
        .call(|s: &mut Recorder| Box::pin(async move { s.log.push("after".into()) }))
        .await?;
    assert!(!proxy.is_closed());

    cancel.cancel();
    let state = with_timeout(handle).await?;
    assert_eq!(state.log, vec!["after"]);
    Ok(())
}

#[tokio::test]
async fn vanishingly_slow_speed_keeps_the_executor_alive() -> TestResult {
    init_tracing();
    let cancel = CancellationToken::new();
    let (proxy, handle) = spawn_executor(Recorder::new(1.0), 8, cancel.clone());

    proxy.set_rate(1e-300).await?;
    let _reached = proxy.request_advance(Duration::MAX).await?;

    // The loop has to pace the pending step; it still answers.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(proxy.now().await?, Duration::ZERO);
    assert_eq!(proxy.rate().await?, 1e-300);

    cancel.cancel();
    with_timeout(handle).await?;
    Ok(())
}
