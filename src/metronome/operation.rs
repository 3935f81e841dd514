//! Recurring operation driven by a dedicated timer thread.
//!
//! The timer thread only decides *when* a tick is due. Ticks are handed to
//! the executing thread over a channel, guarded by a non-reentrant lock
//! flag: a tick that falls due while the previous invocation still holds
//! the lock is either dropped or, with strict timing, turned into a
//! [`DeadlineExceeded`] error.

use super::error::DeadlineExceeded;
use crate::core::FsmError;
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Decision returned by a periodic callback after each tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Keep the operation armed
    Continue,
    /// Disarm the operation after this tick
    Stop,
}

#[derive(Default)]
struct TimerState {
    rearm: bool,
    overrun: Option<DateTime<Utc>>,
}

struct Shared {
    step_nanos: AtomicU64,
    tet_nanos: AtomicU64,
    iterations: AtomicU64,
    dropped: AtomicU64,
    active: AtomicBool,
    lock: AtomicBool,
    strict_timing: AtomicBool,
    timer: Mutex<TimerState>,
    wake: Condvar,
    idle: Condvar,
}

impl Shared {
    fn step(&self) -> Duration {
        Duration::from_nanos(self.step_nanos.load(Ordering::Acquire))
    }

    fn tet(&self) -> Duration {
        Duration::from_nanos(self.tet_nanos.load(Ordering::Acquire))
    }

    fn arm(&self) -> Result<(), FsmError> {
        let mut timer = self.timer.lock();
        if self.active.load(Ordering::Acquire) {
            return Err(FsmError::InvalidArgument(
                "operation is already active".to_string(),
            ));
        }
        *timer = TimerState::default();
        self.iterations.store(0, Ordering::Release);
        self.dropped.store(0, Ordering::Release);
        self.lock.store(false, Ordering::Release);
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    fn disarm(&self) {
        let _timer = self.timer.lock();
        self.active.store(false, Ordering::Release);
        self.lock.store(false, Ordering::Release);
        self.wake.notify_all();
        self.idle.notify_all();
    }
}

/// Disarms on drop, so the ticker is released even if the callback panics.
struct Disarm<'a>(&'a Shared);

impl Drop for Disarm<'_> {
    fn drop(&mut self) {
        self.0.disarm();
    }
}

/// A recurring operation.
///
/// # Example
///
/// ```rust
/// use metronome_fsm::metronome::{Operation, Tick};
/// use std::time::Duration;
///
/// let op = Operation::new(Duration::from_millis(5)).unwrap();
/// let executed = op
///     .run(Some(3), |i, _previous_tet| {
///         println!("Ping {i}");
///         Ok(Tick::Continue)
///     })
///     .unwrap();
///
/// assert_eq!(executed, 3);
/// assert!(!op.is_active());
/// ```
pub struct Operation {
    shared: Arc<Shared>,
    handles: Mutex<Option<Handles>>,
}

struct Handles {
    ticker: JoinHandle<()>,
    worker: JoinHandle<Result<u64, FsmError>>,
}

impl Operation {
    pub fn new(step: Duration) -> Result<Self, FsmError> {
        check_step(step)?;
        Ok(Self {
            shared: Arc::new(Shared {
                step_nanos: AtomicU64::new(duration_nanos(step)),
                tet_nanos: AtomicU64::new(0),
                iterations: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                active: AtomicBool::new(false),
                lock: AtomicBool::new(false),
                strict_timing: AtomicBool::new(false),
                timer: Mutex::new(TimerState::default()),
                wake: Condvar::new(),
                idle: Condvar::new(),
            }),
            handles: Mutex::new(None),
        })
    }

    pub fn with_strict_timing(self, strict: bool) -> Self {
        self.set_strict_timing(strict);
        self
    }

    pub fn set_strict_timing(&self, strict: bool) {
        self.shared.strict_timing.store(strict, Ordering::Release);
    }

    pub fn strict_timing(&self) -> bool {
        self.shared.strict_timing.load(Ordering::Acquire)
    }

    pub fn step(&self) -> Duration {
        self.shared.step()
    }

    /// Set the step and reschedule the pending tick.
    ///
    /// On an active operation the next tick becomes due one full new step
    /// from now.
    pub fn set_interval(&self, step: Duration) -> Result<(), FsmError> {
        check_step(step)?;
        let mut timer = self.shared.timer.lock();
        self.shared
            .step_nanos
            .store(duration_nanos(step), Ordering::Release);
        if self.shared.active.load(Ordering::Acquire) {
            timer.rearm = true;
            self.shared.wake.notify_all();
        }
        Ok(())
    }

    /// Task execution time of the last invocation.
    pub fn tet(&self) -> Duration {
        self.shared.tet()
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Number of invocations executed by the current or last activation.
    pub fn iterations(&self) -> u64 {
        self.shared.iterations.load(Ordering::Acquire)
    }

    /// Number of ticks skipped because an invocation was still running.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Acquire)
    }

    /// Arm the timer and execute `callback` on the calling thread until the
    /// operation stops.
    ///
    /// The callback receives the iteration index and the previous TET. The
    /// operation stops when the callback returns [`Tick::Stop`] or an error,
    /// after `max_iterations` invocations, or when [`stop`](Self::stop) is
    /// called. Returns the number of executed invocations.
    pub fn run<F>(&self, max_iterations: Option<u64>, callback: F) -> Result<u64, FsmError>
    where
        F: FnMut(u64, Duration) -> Result<Tick, FsmError>,
    {
        self.shared.arm()?;
        let (ticks_tx, ticks_rx) = mpsc::sync_channel(1);
        let shared = &self.shared;

        thread::scope(|scope| {
            let ticker = thread::Builder::new()
                .name("metronome-ticker".to_string())
                .spawn_scoped(scope, move || tick_loop(shared, ticks_tx));
            let _disarm = Disarm(shared);
            if let Err(e) = ticker {
                return Err(FsmError::Spawn(e));
            }
            execute(shared, ticks_rx, max_iterations, callback)
        })
    }

    /// Arm the timer and execute `callback` on a worker thread.
    ///
    /// Returns immediately; use [`wait`](Self::wait) to block until the
    /// operation stops and [`join`](Self::join) to collect its result.
    pub fn start<F>(&self, max_iterations: Option<u64>, callback: F) -> Result<(), FsmError>
    where
        F: FnMut(u64, Duration) -> Result<Tick, FsmError> + Send + 'static,
    {
        let mut handles = self.handles.lock();
        if let Some(previous) = handles.take() {
            if !previous.worker.is_finished() {
                *handles = Some(previous);
                return Err(FsmError::InvalidArgument(
                    "operation is already active".to_string(),
                ));
            }
        }

        self.shared.arm()?;
        let (ticks_tx, ticks_rx) = mpsc::sync_channel(1);

        let shared = Arc::clone(&self.shared);
        let ticker = thread::Builder::new()
            .name("metronome-ticker".to_string())
            .spawn(move || tick_loop(&shared, ticks_tx));
        let ticker = match ticker {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.disarm();
                return Err(FsmError::Spawn(e));
            }
        };

        let shared = Arc::clone(&self.shared);
        let worker = thread::Builder::new()
            .name("metronome-worker".to_string())
            .spawn(move || {
                let _disarm = Disarm(&shared);
                execute(&shared, ticks_rx, max_iterations, callback)
            });
        let worker = match worker {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.disarm();
                let _ = ticker.join();
                return Err(FsmError::Spawn(e));
            }
        };

        *handles = Some(Handles { ticker, worker });
        Ok(())
    }

    /// Block until the operation is no longer active.
    pub fn wait(&self) {
        let mut timer = self.shared.timer.lock();
        while self.shared.active.load(Ordering::Acquire) {
            self.shared.idle.wait(&mut timer);
        }
    }

    /// Wait for an operation launched with [`start`](Self::start) and
    /// return its result.
    ///
    /// Returns `Ok(0)` when nothing was started. A panic inside the callback
    /// is resumed on the calling thread.
    pub fn join(&self) -> Result<u64, FsmError> {
        let Some(handles) = self.handles.lock().take() else {
            return Ok(0);
        };
        let result = match handles.worker.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        if let Err(panic) = handles.ticker.join() {
            std::panic::resume_unwind(panic);
        }
        result
    }

    /// Disarm the timer and release the lock. Idempotent.
    ///
    /// An invocation already in progress is allowed to finish.
    pub fn stop(&self) {
        self.shared.disarm();
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        self.shared.disarm();
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("step", &self.step())
            .field("active", &self.is_active())
            .field("strict_timing", &self.strict_timing())
            .field("tet", &self.tet())
            .finish()
    }
}

fn check_step(step: Duration) -> Result<(), FsmError> {
    if step.is_zero() {
        return Err(FsmError::InvalidArgument(
            "metronome step must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Timer side: wait for each deadline, then either hand a tick over or
/// handle the overrun.
fn tick_loop(shared: &Shared, ticks: SyncSender<u64>) {
    let mut timer = shared.timer.lock();
    let mut due = Instant::now() + shared.step();
    let mut fired: u64 = 0;

    loop {
        if !shared.active.load(Ordering::Acquire) {
            return;
        }
        if timer.rearm {
            timer.rearm = false;
            due = Instant::now() + shared.step();
            continue;
        }
        let now = Instant::now();
        if now < due {
            shared.wake.wait_until(&mut timer, due);
            continue;
        }

        due += shared.step();
        if due <= now {
            due = now + shared.step();
        }

        if shared
            .lock
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            if shared.strict_timing.load(Ordering::Acquire) {
                warn!(tick = fired, step = ?shared.step(), "metronome deadline missed");
                timer.overrun = Some(Utc::now());
                shared.active.store(false, Ordering::Release);
                shared.idle.notify_all();
                return;
            }
            shared.dropped.fetch_add(1, Ordering::AcqRel);
            trace!(tick = fired, "metronome tick dropped, previous invocation still running");
            fired += 1;
            continue;
        }

        if ticks.send(fired).is_err() {
            shared.lock.store(false, Ordering::Release);
            return;
        }
        fired += 1;
    }
}

/// Executing side: run the callback once per delivered tick.
fn execute<F>(
    shared: &Shared,
    ticks: Receiver<u64>,
    max_iterations: Option<u64>,
    mut callback: F,
) -> Result<u64, FsmError>
where
    F: FnMut(u64, Duration) -> Result<Tick, FsmError>,
{
    let mut iteration: u64 = 0;

    for tick in ticks.iter() {
        let started = Instant::now();
        let outcome = callback(iteration, shared.tet());
        let tet = started.elapsed();

        shared.tet_nanos.store(duration_nanos(tet), Ordering::Release);
        shared.lock.store(false, Ordering::Release);
        iteration += 1;
        shared.iterations.store(iteration, Ordering::Release);
        debug!(tick, iteration, tet = ?tet, "metronome tick executed");

        if let Some(timestamp) = shared.timer.lock().overrun.take() {
            return Err(DeadlineExceeded {
                tet,
                step: shared.step(),
                iteration: iteration - 1,
                timestamp,
            }
            .into());
        }

        match outcome {
            Err(e) => return Err(e),
            Ok(Tick::Stop) => break,
            Ok(Tick::Continue) => {}
        }
        if max_iterations.is_some_and(|max| iteration >= max) {
            break;
        }
    }

    Ok(iteration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn zero_step_is_rejected() {
        assert!(matches!(
            Operation::new(Duration::ZERO),
            Err(FsmError::InvalidArgument(_))
        ));

        let op = Operation::new(Duration::from_millis(1)).unwrap();
        assert!(op.set_interval(Duration::ZERO).is_err());
        assert_eq!(op.step(), Duration::from_millis(1));
    }

    #[test]
    fn run_stops_after_max_iterations() {
        let op = Operation::new(Duration::from_millis(2)).unwrap();
        let mut seen = Vec::new();

        let executed = op
            .run(Some(4), |i, _| {
                seen.push(i);
                Ok(Tick::Continue)
            })
            .unwrap();

        assert_eq!(executed, 4);
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(op.iterations(), 4);
        assert!(!op.is_active());
    }

    #[test]
    fn stop_sentinel_disarms() {
        let op = Operation::new(Duration::from_millis(2)).unwrap();

        let executed = op
            .run(None, |i, _| Ok(if i == 2 { Tick::Stop } else { Tick::Continue }))
            .unwrap();

        assert_eq!(executed, 3);
        assert!(!op.is_active());
    }

    #[test]
    fn callback_error_stops_and_propagates() {
        let op = Operation::new(Duration::from_millis(2)).unwrap();

        let err = op
            .run(None, |_, _| Err(FsmError::action("probe", "boom")))
            .unwrap_err();

        assert!(matches!(err, FsmError::ActionFailed { .. }));
        assert!(!op.is_active());
    }

    #[test]
    fn previous_tet_is_passed_to_callback() {
        let op = Operation::new(Duration::from_millis(20)).unwrap();
        let mut tets = Vec::new();

        op.run(Some(2), |_, previous| {
            tets.push(previous);
            thread::sleep(Duration::from_millis(3));
            Ok(Tick::Continue)
        })
        .unwrap();

        assert_eq!(tets[0], Duration::ZERO);
        assert!(tets[1] >= Duration::from_millis(3));
        assert!(op.tet() >= Duration::from_millis(3));
    }

    #[test]
    fn strict_overrun_raises_deadline_exceeded() {
        let op = Operation::new(Duration::from_millis(10))
            .unwrap()
            .with_strict_timing(true);

        let err = op
            .run(None, |_, _| {
                thread::sleep(Duration::from_millis(35));
                Ok(Tick::Continue)
            })
            .unwrap_err();

        match err {
            FsmError::DeadlineExceeded(report) => {
                assert!(report.tet >= report.step);
                assert_eq!(report.iteration, 0);
                assert!(report.ratio() >= 100.0);
            }
            other => panic!("expected DeadlineExceeded, got {other:?}"),
        }
        assert!(!op.is_active());
    }

    #[test]
    fn lenient_overrun_drops_ticks() {
        let op = Operation::new(Duration::from_millis(10)).unwrap();
        let started = Instant::now();

        let executed = op
            .run(Some(4), |_, _| {
                thread::sleep(Duration::from_millis(25));
                Ok(Tick::Continue)
            })
            .unwrap();

        let elapsed_intervals = started.elapsed().as_millis() / 10;
        assert_eq!(executed, 4);
        assert!((executed as u128) < elapsed_intervals);
        assert!(op.dropped() > 0);
    }

    #[test]
    fn invocations_never_overlap() {
        let op = Operation::new(Duration::from_millis(2)).unwrap();
        let in_flight = AtomicUsize::new(0);
        let mut peak = 0;

        op.run(Some(20), |i, _| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak = peak.max(now);
            if i % 3 == 0 {
                thread::sleep(Duration::from_millis(5));
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Tick::Continue)
        })
        .unwrap();

        assert_eq!(peak, 1);
    }

    #[test]
    fn start_runs_in_background_until_stopped() {
        let op = Operation::new(Duration::from_millis(2)).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        op.start(None, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Tick::Continue)
        })
        .unwrap();
        assert!(op.is_active());

        thread::sleep(Duration::from_millis(30));
        op.stop();
        op.stop();

        let executed = op.join().unwrap();
        assert!(!op.is_active());
        assert!(executed > 0);
        assert_eq!(executed as usize, count.load(Ordering::SeqCst));
    }

    #[test]
    fn wait_blocks_until_auto_stop() {
        let op = Operation::new(Duration::from_millis(2)).unwrap();

        op.start(Some(5), |_, _| Ok(Tick::Continue)).unwrap();
        op.wait();

        assert!(!op.is_active());
        assert_eq!(op.join().unwrap(), 5);
    }

    #[test]
    fn double_start_is_rejected() {
        let op = Operation::new(Duration::from_millis(50)).unwrap();

        op.start(None, |_, _| Ok(Tick::Continue)).unwrap();
        let second = op.start(None, |_, _| Ok(Tick::Continue));
        assert!(matches!(second, Err(FsmError::InvalidArgument(_))));

        op.stop();
        op.join().unwrap();
    }

    #[test]
    fn panicking_callback_unwinds_out_of_run() {
        let (done_tx, done_rx) = mpsc::channel();

        thread::spawn(move || {
            let op = Operation::new(Duration::from_millis(5)).unwrap();
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                op.run(None, |_, _| -> Result<Tick, FsmError> { panic!("sensor bug") })
            }));
            let _ = done_tx.send((outcome.is_err(), op.is_active()));
        });

        let (panicked, active) = done_rx
            .recv_timeout(Duration::from_secs(3))
            .expect("run did not return after the callback panicked");
        assert!(panicked);
        assert!(!active);
    }

    #[test]
    fn wait_returns_after_worker_panics() {
        let op = Operation::new(Duration::from_millis(5)).unwrap();

        op.start(None, |_, _| -> Result<Tick, FsmError> { panic!("sensor bug") })
            .unwrap();
        op.wait();

        assert!(!op.is_active());
        let joined = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| op.join()));
        assert!(joined.is_err());
    }

    #[test]
    fn set_interval_rearms_running_timer() {
        let op = Operation::new(Duration::from_secs(10)).unwrap();
        let started = Instant::now();

        op.start(Some(1), |_, _| Ok(Tick::Continue)).unwrap();
        op.set_interval(Duration::from_millis(5)).unwrap();
        op.wait();

        assert_eq!(op.join().unwrap(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(op.step(), Duration::from_millis(5));
    }
}
