//! Periodic and one-shot timers
//!
//! Timers never touch state themselves: they post an event into the agent's
//! queue, and the agent applies it at its serialization point.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Handle to one scheduled one-shot action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskToken(u64);

impl fmt::Display for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Timer source that delivers events of type `E`
pub struct Scheduler<E> {
    tx: mpsc::UnboundedSender<E>,
    next_token: AtomicU64,
    once: Mutex<HashMap<TaskToken, JoinHandle<()>>>,
    periodic: Mutex<Vec<JoinHandle<()>>>,
}

impl<E: Send + 'static> Scheduler<E> {
    pub fn new(tx: mpsc::UnboundedSender<E>) -> Self {
        Self {
            tx,
            next_token: AtomicU64::new(1),
            once: Mutex::new(HashMap::new()),
            periodic: Mutex::new(Vec::new()),
        }
    }

    /// Post `make()` every `interval`, starting immediately.
    ///
    /// Ticks missed under load are skipped rather than bunched up.
    pub fn schedule_periodic<F>(&self, interval: Duration, make: F)
    where
        F: Fn() -> E + Send + 'static,
    {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tx.send(make()).is_err() {
                    break;
                }
            }
        });

        lock(&self.periodic).push(handle);
    }

    /// Post `make(token)` once after `delay`
    pub fn schedule_once<F>(&self, delay: Duration, make: F) -> TaskToken
    where
        F: FnOnce(TaskToken) -> E + Send + 'static,
    {
        let token = TaskToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(make(token));
        });

        lock(&self.once).insert(token, handle);
        debug!(token = %token, delay_ms = delay.as_millis() as u64, "One-shot scheduled");
        token
    }

    /// Cancel a one-shot.
    ///
    /// Returns false if the token already completed or was cancelled. An
    /// event that was posted before cancellation is left in the queue; the
    /// receiver must call [`Scheduler::complete`] and drop it when that
    /// returns false.
    pub fn cancel(&self, token: TaskToken) -> bool {
        match lock(&self.once).remove(&token) {
            Some(handle) => {
                handle.abort();
                debug!(token = %token, "One-shot cancelled");
                true
            }
            None => false,
        }
    }

    /// Claim a fired one-shot. Only the first of `cancel`/`complete` wins.
    pub fn complete(&self, token: TaskToken) -> bool {
        lock(&self.once).remove(&token).is_some()
    }

    /// Number of one-shots neither completed nor cancelled
    pub fn pending(&self) -> usize {
        lock(&self.once).len()
    }
}

impl<E> Scheduler<E> {
    /// Stop every timer without firing it
    pub fn shutdown(&self) {
        for handle in lock(&self.periodic).drain(..) {
            handle.abort();
        }
        for (_, handle) in lock(&self.once).drain() {
            handle.abort();
        }
    }
}

impl<E> Drop for Scheduler<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Timer bookkeeping stays usable even if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Ev {
        Tick,
        Fired(TaskToken),
    }

    fn scheduler() -> (Scheduler<Ev>, mpsc::UnboundedReceiver<Ev>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Scheduler::new(tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_ticks_at_fixed_cadence() {
        let (scheduler, mut rx) = scheduler();
        scheduler.schedule_periodic(Duration::from_secs(5), || Ev::Tick);

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        let mut ticks = 0;
        while let Ok(ev) = rx.try_recv() {
            assert_eq!(ev, Ev::Tick);
            ticks += 1;
        }
        // t = 0, 5, 10
        assert_eq!(ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn once_fires_after_delay() {
        let (scheduler, mut rx) = scheduler();
        let token = scheduler.schedule_once(Duration::from_secs(3), Ev::Fired);

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert!(rx.try_recv().is_err());

        assert_eq!(rx.recv().await, Some(Ev::Fired(token)));
        assert!(scheduler.complete(token));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_fire_prevents_event() {
        let (scheduler, mut rx) = scheduler();
        let token = scheduler.schedule_once(Duration::from_secs(3), Ev::Fired);

        assert!(scheduler.cancel(token));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_fire_is_noop_and_wins_the_claim() {
        let (scheduler, mut rx) = scheduler();
        let token = scheduler.schedule_once(Duration::from_secs(3), Ev::Fired);

        // The event is already queued when cancellation happens
        let event = rx.recv().await;
        assert_eq!(event, Some(Ev::Fired(token)));

        assert!(scheduler.cancel(token));
        assert!(!scheduler.complete(token));
        assert!(!scheduler.cancel(token));
    }

    #[tokio::test(start_paused = true)]
    async fn complete_then_cancel_is_noop() {
        let (scheduler, mut rx) = scheduler();
        let token = scheduler.schedule_once(Duration::from_secs(1), Ev::Fired);

        rx.recv().await;
        assert!(scheduler.complete(token));
        assert!(!scheduler.cancel(token));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_everything_without_firing() {
        let (scheduler, mut rx) = scheduler();
        scheduler.schedule_periodic(Duration::from_secs(5), || Ev::Tick);
        scheduler.schedule_once(Duration::from_secs(3), Ev::Fired);

        // Let the immediate first tick through
        assert_eq!(rx.recv().await, Some(Ev::Tick));

        scheduler.shutdown();
        assert_eq!(scheduler.pending(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn tokens_are_distinct() {
        let (scheduler, _rx) = scheduler();
        let a = scheduler.schedule_once(Duration::from_secs(1), Ev::Fired);
        let b = scheduler.schedule_once(Duration::from_secs(1), Ev::Fired);
        assert_ne!(a, b);
        assert_eq!(scheduler.pending(), 2);
    }
}
