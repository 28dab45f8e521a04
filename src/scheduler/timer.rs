//! Timer Primitive
//!
//! A re-armable alarm backed by a tokio task. When the alarm goes off the
//! callback is dispatched onto the runtime's blocking pool, so a slow callback
//! never holds up the driver and callbacks of different timers run in
//! parallel.
//!
//! The timer makes no promise about how many callbacks may be in flight at
//! once; callers that need mutual exclusion must provide it themselves.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::error::TimerError;

/// Shortest delay between two periodic fires.
pub const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Callback invoked each time the timer fires, with the generation of the
/// arm that produced the fire
pub type TimerCallback = Arc<dyn Fn(u64) + Send + Sync + 'static>;

/// Next firing plan of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Alarm {
    /// No firing scheduled
    Disarmed,
    /// Fire after `due`, then every `period`
    Armed {
        due: Duration,
        period: Duration,
        generation: u64,
    },
}

#[derive(Debug)]
struct Control {
    /// `None` once released
    sender: Option<watch::Sender<Alarm>>,
    /// Bumped by every arm and disarm
    generation: u64,
}

impl Control {
    fn send(&mut self, alarm: impl FnOnce(u64) -> Alarm) -> Result<(), TimerError> {
        let sender = self.sender.as_ref().ok_or(TimerError::Released)?;
        self.generation += 1;
        sender.send_replace(alarm(self.generation));
        Ok(())
    }
}

/// Re-armable timer owned by a single task record
pub struct Timer {
    control: Mutex<Control>,
}

impl Timer {
    /// Create a disarmed timer whose driver runs on `runtime`
    pub fn new(runtime: &Handle, callback: TimerCallback) -> Self {
        let (sender, alarms) = watch::channel(Alarm::Disarmed);
        runtime.spawn(drive(runtime.clone(), alarms, callback));

        Self {
            control: Mutex::new(Control {
                sender: Some(sender),
                generation: 0,
            }),
        }
    }

    /// Fire after `due`, then every `period` until disarmed
    pub fn arm(&self, due: Duration, period: Duration) -> Result<(), TimerError> {
        self.control.lock().send(|generation| Alarm::Armed {
            due,
            period,
            generation,
        })
    }

    /// Cancel any pending fire. Callbacks already dispatched still run, but
    /// carry a generation that is no longer current.
    pub fn disarm(&self) -> Result<(), TimerError> {
        self.control.lock().send(|_| Alarm::Disarmed)
    }

    /// Disarm only if `generation` is still current.
    ///
    /// Of several fires dispatched by the same arm, exactly one gets
    /// `Ok(true)`; the rest are stale and get `Ok(false)`.
    pub fn disarm_if_current(&self, generation: u64) -> Result<bool, TimerError> {
        let mut control = self.control.lock();
        if control.sender.is_none() {
            return Err(TimerError::Released);
        }
        if control.generation != generation {
            return Ok(false);
        }
        control.send(|_| Alarm::Disarmed)?;
        Ok(true)
    }

    /// Generation of the latest arm or disarm
    pub fn generation(&self) -> u64 {
        self.control.lock().generation
    }

    /// Stop the driver for good.
    ///
    /// Returns false if the timer was already released.
    pub fn release(&self) -> bool {
        self.control.lock().sender.take().is_some()
    }

    /// Whether [`release`](Self::release) has been called
    pub fn is_released(&self) -> bool {
        self.control.lock().sender.is_none()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let control = self.control.lock();
        let alarm = control.sender.as_ref().map(|sender| *sender.borrow());
        f.debug_struct("Timer")
            .field("alarm", &alarm)
            .field("generation", &control.generation)
            .finish()
    }
}

/// Driver loop. Exits once the sender side is dropped.
async fn drive(runtime: Handle, mut alarms: watch::Receiver<Alarm>, callback: TimerCallback) {
    let mut next = *alarms.borrow_and_update();

    loop {
        match next {
            Alarm::Disarmed => {
                if alarms.changed().await.is_err() {
                    break;
                }
                next = *alarms.borrow_and_update();
            }
            Alarm::Armed {
                due,
                period,
                generation,
            } => {
                tokio::select! {
                    biased;

                    changed = alarms.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        next = *alarms.borrow_and_update();
                    }
                    _ = tokio::time::sleep(due) => {
                        let callback = Arc::clone(&callback);
                        runtime.spawn_blocking(move || callback(generation));
                        next = Alarm::Armed {
                            due: period.max(MIN_TIMER_PERIOD),
                            period,
                            generation,
                        };
                    }
                }
            }
        }
    }

    tracing::trace!("Timer driver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_timer() -> (Timer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let timer = Timer::new(
            &Handle::current(),
            Arc::new(move |_: u64| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (timer, fired)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_new_timer_is_disarmed() {
        let (timer, fired) = counting_timer();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timer.is_released());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_armed_timer_fires_periodically() {
        let (timer, fired) = counting_timer();
        timer.arm(Duration::ZERO, Duration::from_millis(10)).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(fired.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disarm_stops_firing() {
        let (timer, fired) = counting_timer();
        timer.arm(Duration::from_millis(500), Duration::from_millis(500)).unwrap();
        timer.disarm().unwrap();

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rearm_replaces_pending_alarm() {
        let (timer, fired) = counting_timer();
        timer.arm(Duration::from_secs(3600), Duration::from_secs(3600)).unwrap();
        timer.arm(Duration::ZERO, Duration::from_secs(3600)).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_released_timer_rejects_changes() {
        let (timer, fired) = counting_timer();
        timer.arm(Duration::from_millis(100), Duration::from_millis(100)).unwrap();

        assert!(timer.release());
        assert!(timer.is_released());
        assert_eq!(timer.arm(Duration::ZERO, Duration::ZERO), Err(TimerError::Released));
        assert_eq!(timer.disarm(), Err(TimerError::Released));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_release_is_idempotent() {
        let (timer, _fired) = counting_timer();
        assert!(timer.release());
        assert!(!timer.release());
        assert!(!timer.release());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_arm_and_disarm_bump_generation() {
        let (timer, _fired) = counting_timer();
        assert_eq!(timer.generation(), 0);

        timer.arm(Duration::from_secs(3600), Duration::from_secs(3600)).unwrap();
        assert_eq!(timer.generation(), 1);
        timer.disarm().unwrap();
        assert_eq!(timer.generation(), 2);

        timer.release();
        assert_eq!(timer.disarm_if_current(2), Err(TimerError::Released));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_only_one_fire_per_generation_disarms() {
        let (timer, _fired) = counting_timer();
        timer.arm(Duration::from_secs(3600), Duration::from_secs(3600)).unwrap();
        let armed = timer.generation();

        assert_eq!(timer.disarm_if_current(armed), Ok(true));
        assert_eq!(timer.disarm_if_current(armed), Ok(false));
        assert_eq!(timer.generation(), armed + 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fires_carry_arm_generation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let timer = Timer::new(
            &Handle::current(),
            Arc::new(move |generation: u64| sink.lock().push(generation)),
        );

        timer.arm(Duration::ZERO, Duration::from_secs(3600)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        timer.arm(Duration::ZERO, Duration::from_secs(3600)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(*seen.lock(), vec![1u64, 2]);
    }
}
