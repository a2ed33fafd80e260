//! Fixed-rate worker threads with explicit start/stop lifecycle.
//!
//! Every independently clocked part of the rig (capture, detection, crop,
//! ranging, focus, voice) runs in its own [`ControlLoop`]. A loop sleeps
//! until its next absolute deadline, runs one bounded tick and repeats.
//! Errors and panics inside a tick are logged and contained; the loop
//! carries on at the next deadline.

use crate::{Error, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// View of the loop handed to every tick
pub struct LoopContext {
    running: Arc<AtomicBool>,
    stop_rx: Receiver<()>,
}

impl LoopContext {
    /// Whether the owning loop has been asked to stop
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Sleep for `duration` unless a stop request arrives first.
    ///
    /// Returns `false` if the loop was stopped while sleeping.
    pub fn sleep(&self, duration: Duration) -> bool {
        self.sleep_until(Instant::now() + duration)
    }

    /// Sleep until `deadline` unless a stop request arrives first
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        match self.stop_rx.recv_deadline(deadline) {
            Err(RecvTimeoutError::Timeout) => self.is_running(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

/// Convert a rate in Hz to a tick period
pub fn period_from_hz(hz: f64) -> Result<Duration> {
    if !hz.is_finite() || hz <= 0.0 {
        return Err(Error::InvalidInput(format!("Loop rate must be positive, got {hz}")));
    }
    Ok(Duration::from_secs_f64(1.0 / hz))
}

/// A named thread ticking at a fixed period
pub struct ControlLoop {
    name: String,
    period: Duration,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    stop_tx: Option<Sender<()>>,
    done_rx: Option<Receiver<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ControlLoop {
    /// Create a stopped loop
    #[must_use]
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            running: Arc::new(AtomicBool::new(false)),
            ticks: Arc::new(AtomicU64::new(0)),
            stop_tx: None,
            done_rx: None,
            handle: None,
        }
    }

    /// Loop name, also used as the thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tick period
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Whether the loop thread is active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of ticks executed so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Spawn the loop thread running `body` once per period
    pub fn start<F>(&mut self, mut body: F) -> Result<()>
    where
        F: FnMut(&LoopContext) -> Result<()> + Send + 'static,
    {
        if self.is_running() {
            return Err(Error::LoopError(format!("Loop '{}' is already running", self.name)));
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        self.running.store(true, Ordering::Release);
        let context = LoopContext {
            running: Arc::clone(&self.running),
            stop_rx,
        };
        let ticks = Arc::clone(&self.ticks);
        let period = self.period;
        let name = self.name.clone();

        let spawned = thread::Builder::new().name(self.name.clone()).spawn(move || {
            let _done = DoneSignal(done_tx);
            info!("Loop '{}' started ({:.1} Hz)", name, 1.0 / period.as_secs_f64());

            let mut next = Instant::now();
            while context.is_running() {
                match panic::catch_unwind(AssertUnwindSafe(|| body(&context))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Loop '{}' tick failed: {}", name, e),
                    Err(_) => error!("Loop '{}' tick panicked, continuing", name),
                }
                ticks.fetch_add(1, Ordering::Relaxed);

                next += period;
                let now = Instant::now();
                if next < now {
                    // Overran: skip the missed deadlines instead of bunching ticks
                    let behind = now.duration_since(next);
                    debug!("Loop '{}' behind schedule by {:?}", name, behind);
                    next = now + period;
                }
                if !context.sleep_until(next) {
                    break;
                }
            }

            info!("Loop '{}' stopped", name);
        });

        match spawned {
            Ok(handle) => {
                self.stop_tx = Some(stop_tx);
                self.done_rx = Some(done_rx);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(Error::LoopError(format!("Failed to spawn loop '{}': {e}", self.name)))
            }
        }
    }

    /// Signal the loop to stop and wait up to `timeout` for it to exit.
    ///
    /// An in-flight tick is allowed to finish. A thread that outlives the
    /// timeout is detached and `false` is returned.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.running.store(false, Ordering::Release);
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }

        let Some(handle) = self.handle.take() else {
            return true;
        };
        let exited = self
            .done_rx
            .take()
            .map_or(true, |done_rx| !matches!(done_rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout)));

        if exited {
            if handle.join().is_err() {
                error!("Loop '{}' thread terminated abnormally", self.name);
            }
        } else {
            warn!("Loop '{}' did not stop within {:?}, detaching", self.name, timeout);
        }
        exited
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop(Duration::from_millis(crate::constants::DEFAULT_JOIN_TIMEOUT_MS));
        }
    }
}

// Fires when the loop thread exits, including by unwinding
struct DoneSignal(Sender<()>);

impl Drop for DoneSignal {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_period_from_hz() {
        assert_eq!(period_from_hz(10.0).unwrap(), Duration::from_millis(100));
        assert!(period_from_hz(0.0).is_err());
        assert!(period_from_hz(-5.0).is_err());
        assert!(period_from_hz(f64::NAN).is_err());
    }

    #[test]
    fn test_loop_ticks_and_stops() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);

        let mut control = ControlLoop::new("test-ticks", Duration::from_millis(5));
        control
            .start(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert!(control.is_running());
        assert!(control.stop(Duration::from_secs(1)));
        assert!(!control.is_running());

        let count = counter.load(Ordering::SeqCst);
        assert!(count > 1, "expected several ticks, got {count}");

        thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::SeqCst), count);
    }

    #[test]
    fn test_stop_wakes_sleeping_loop() {
        let mut control = ControlLoop::new("test-slow", Duration::from_secs(60));
        control.start(|_| Ok(())).unwrap();
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        assert!(control.stop(Duration::from_secs(2)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_errors_and_panics_are_contained() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);

        let mut control = ControlLoop::new("test-faulty", Duration::from_millis(2));
        control
            .start(move |_| {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                match n % 3 {
                    0 => Err(Error::SensorError("transient".to_string())),
                    1 => panic!("tick blew up"),
                    _ => Ok(()),
                }
            })
            .unwrap();

        thread::sleep(Duration::from_millis(80));
        assert!(control.stop(Duration::from_secs(1)));
        assert!(counter.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_double_start_rejected() {
        let mut control = ControlLoop::new("test-double", Duration::from_millis(10));
        control.start(|_| Ok(())).unwrap();
        assert!(control.start(|_| Ok(())).is_err());
        control.stop(Duration::from_secs(1));
    }

    #[test]
    fn test_context_sleep_interrupted() {
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&interrupted);

        let mut control = ControlLoop::new("test-sleep", Duration::from_millis(1));
        control
            .start(move |ctx| {
                if !ctx.sleep(Duration::from_secs(30)) {
                    flag.store(true, Ordering::SeqCst);
                }
                Ok(())
            })
            .unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(control.stop(Duration::from_secs(2)));
        assert!(interrupted.load(Ordering::SeqCst));
    }
}
