//! Host event-loop services.
//!
//! Plugins need three things from the host event loop: a clock, one-shot
//! timers and "after the next render" callbacks. [`Scheduler`] abstracts
//! them so the crate never assumes a particular runtime.
//!
//! [`ManualScheduler`] is a virtual-clock implementation. The host drives it
//! from its own loop (`run_ticks` after each render, `advance` as time
//! passes); tests drive it explicitly.

use futures::future::{select, Either};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

/// Handle returned by [`Scheduler::set_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// Timer and tick callback.
pub type Task = Box<dyn FnOnce()>;

/// Clock, timers and render ticks of the host event loop.
pub trait Scheduler {
    /// Time elapsed since the scheduler's origin.
    fn now(&self) -> Duration;

    /// Run `task` once `delay` has elapsed.
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancel a pending timer; returns `false` if it already fired or never existed.
    fn clear_timeout(&self, id: TimerId) -> bool;

    /// Run `task` after the next render tick.
    fn next_tick(&self, task: Task);
}

// ============================================================================
// ManualScheduler
// ============================================================================

/// Virtual-clock scheduler driven by explicit calls.
///
/// # Example
///
/// ```
/// use navigator_plugins::scheduler::{ManualScheduler, Scheduler};
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let scheduler = ManualScheduler::new();
/// let fired = Rc::new(Cell::new(false));
/// let flag = fired.clone();
/// scheduler.set_timeout(Duration::from_secs(1), Box::new(move || flag.set(true)));
///
/// scheduler.advance(Duration::from_millis(999));
/// assert!(!fired.get());
/// scheduler.advance(Duration::from_millis(1));
/// assert!(fired.get());
/// ```
#[derive(Clone, Default)]
pub struct ManualScheduler {
    inner: Rc<ManualInner>,
}

#[derive(Default)]
struct ManualInner {
    now: Cell<Duration>,
    next_id: Cell<u64>,
    timers: RefCell<BTreeMap<(Duration, TimerId), Task>>,
    ticks: RefCell<Vec<Task>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.inner.now.get())
            .field("pending_timers", &self.pending_timers())
            .field("pending_ticks", &self.inner.ticks.borrow().len())
            .finish()
    }
}

impl ManualScheduler {
    /// Create a scheduler at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers waiting to fire.
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    /// Run queued tick callbacks, including ones queued while running.
    ///
    /// Returns how many ran.
    pub fn run_ticks(&self) -> usize {
        let mut ran = 0;
        loop {
            let batch = std::mem::take(&mut *self.inner.ticks.borrow_mut());
            if batch.is_empty() {
                return ran;
            }
            for task in batch {
                task();
                ran += 1;
            }
        }
    }

    /// Move the clock forward, firing due timers in deadline order.
    ///
    /// A timer re-armed from inside a timer callback fires in the same call
    /// if its new deadline is also due.
    pub fn advance(&self, by: Duration) {
        let target = self.inner.now.get() + by;
        loop {
            let due = {
                let mut timers = self.inner.timers.borrow_mut();
                match timers.first_key_value() {
                    Some((&(deadline, id), _)) if deadline <= target => timers
                        .remove(&(deadline, id))
                        .map(|task| (deadline, task)),
                    _ => None,
                }
            };
            let Some((deadline, task)) = due else {
                break;
            };
            self.inner.now.set(deadline);
            task();
        }
        self.inner.now.set(target);
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Duration {
        self.inner.now.get()
    }

    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        let deadline = self.inner.now.get() + delay;
        self.inner.timers.borrow_mut().insert((deadline, id), task);
        id
    }

    fn clear_timeout(&self, id: TimerId) -> bool {
        let mut timers = self.inner.timers.borrow_mut();
        let key = timers.keys().find(|(_, tid)| *tid == id).copied();
        key.and_then(|key| timers.remove(&key)).is_some()
    }

    fn next_tick(&self, task: Task) {
        self.inner.ticks.borrow_mut().push(task);
    }
}

// ============================================================================
// Timeouts
// ============================================================================

/// Await `future`, resolving to `fallback` if `timeout` elapses first.
pub async fn with_timeout<T, F>(
    scheduler: &dyn Scheduler,
    timeout: Duration,
    future: F,
    fallback: T,
) -> T
where
    F: Future<Output = T>,
{
    let (tx, rx) = futures::channel::oneshot::channel::<()>();
    let timer = scheduler.set_timeout(
        timeout,
        Box::new(move || {
            let _ = tx.send(());
        }),
    );

    let future = Box::pin(future);
    match select(future, rx).await {
        Either::Left((value, _)) => {
            scheduler.clear_timeout(timer);
            value
        }
        Either::Right(_) => {
            crate::warn_log!("Predicate timed out after {:?}", timeout);
            fallback
        }
    }
}

/// Like [`with_timeout`], but waits indefinitely when `timeout` is `None`.
pub async fn maybe_with_timeout<T, F>(
    scheduler: &dyn Scheduler,
    timeout: Option<Duration>,
    future: F,
    fallback: T,
) -> T
where
    F: Future<Output = T>,
{
    match timeout {
        Some(timeout) => with_timeout(scheduler, timeout, future, fallback).await,
        None => future.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn test_timers_fire_in_order() {
        let scheduler = ManualScheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (delay, label) in [(30, "c"), (10, "a"), (20, "b")] {
            let order = order.clone();
            scheduler.set_timeout(
                Duration::from_millis(delay),
                Box::new(move || order.borrow_mut().push(label)),
            );
        }

        scheduler.advance(Duration::from_millis(25));
        assert_eq!(*order.borrow(), vec!["a", "b"]);
        assert_eq!(scheduler.pending_timers(), 1);
        assert_eq!(scheduler.now(), Duration::from_millis(25));
    }

    #[test]
    fn test_clear_timeout() {
        let scheduler = ManualScheduler::new();
        let id = scheduler.set_timeout(Duration::from_secs(1), Box::new(|| panic!("cleared")));
        assert!(scheduler.clear_timeout(id));
        assert!(!scheduler.clear_timeout(id));
        scheduler.advance(Duration::from_secs(2));
    }

    #[test]
    fn test_rearming_timer() {
        fn arm(scheduler: ManualScheduler, count: Rc<Cell<u32>>) {
            let next = scheduler.clone();
            scheduler.set_timeout(
                Duration::from_secs(1),
                Box::new(move || {
                    count.set(count.get() + 1);
                    arm(next, count);
                }),
            );
        }

        let scheduler = ManualScheduler::new();
        let count = Rc::new(Cell::new(0));
        arm(scheduler.clone(), count.clone());

        scheduler.advance(Duration::from_millis(3500));
        assert_eq!(count.get(), 3);
        assert_eq!(scheduler.pending_timers(), 1);
    }

    #[test]
    fn test_ticks_run_nested() {
        let scheduler = ManualScheduler::new();
        let hits = Rc::new(Cell::new(0));
        {
            let hits = hits.clone();
            let inner = scheduler.clone();
            scheduler.next_tick(Box::new(move || {
                hits.set(hits.get() + 1);
                let hits = hits.clone();
                inner.next_tick(Box::new(move || hits.set(hits.get() + 1)));
            }));
        }
        assert_eq!(scheduler.run_ticks(), 2);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_with_timeout_completes() {
        let scheduler = ManualScheduler::new();
        let value = pollster::block_on(with_timeout(
            &scheduler,
            Duration::from_secs(1),
            async { 7 },
            0,
        ));
        assert_eq!(value, 7);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_with_timeout_falls_back() {
        let scheduler = ManualScheduler::new();
        let mut future = Box::pin(with_timeout(
            &scheduler,
            Duration::from_secs(1),
            futures::future::pending::<bool>(),
            false,
        ));

        assert!(future.as_mut().now_or_never().is_none());
        scheduler.advance(Duration::from_secs(1));
        assert_eq!(future.as_mut().now_or_never(), Some(false));
    }
}
