//! Per-user dispensation timers
//!
//! Each present user has at most one pending dispensation. Arming spawns a
//! task that sleeps for the dispense interval and then reports the user as due
//! on a channel drained by the engine. The task handle is kept in a map so a
//! disconnecting user's timer can be aborted instead of leaking.
//!
//! An entry stays in the map until its due tick is consumed with `complete`,
//! so a gain arriving between the tick firing and the engine handling it
//! cannot replace the timer. Every armed timer carries a sequence number; a
//! due tick only counts if its sequence still matches the map entry, so ticks
//! from cancelled timers are ignored.
//!
//! Once shut down the scheduler arms nothing, including re-arms requested by
//! dispensations that were already running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

/// A dispensation that has come due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueDispense {
    pub user_id: Uuid,
    pub seq: u64,
}

struct PendingDispense {
    seq: u64,
    handle: JoinHandle<()>,
}

/// Map of pending per-user dispensation timers
pub struct DispenseScheduler {
    interval: Duration,
    due_tx: mpsc::UnboundedSender<DueDispense>,
    pending: Mutex<HashMap<Uuid, PendingDispense>>,
    next_seq: AtomicU64,
    closed: AtomicBool,
}

impl DispenseScheduler {
    pub fn new(interval: Duration, due_tx: mpsc::UnboundedSender<DueDispense>) -> Self {
        Self {
            interval,
            due_tx,
            pending: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Scheduler plus the receiving end of its due channel
    pub fn channel(interval: Duration) -> (Self, mpsc::UnboundedReceiver<DueDispense>) {
        let (due_tx, due_rx) = mpsc::unbounded_channel();
        (Self::new(interval, due_tx), due_rx)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Schedule the next dispensation for `user_id`
    ///
    /// Returns false if a timer is already pending for the user (including
    /// one that fired but whose tick has not been completed yet) or the
    /// scheduler has been shut down.
    pub fn arm(&self, user_id: Uuid) -> bool {
        let mut pending = self.lock_pending();

        if self.closed.load(Ordering::SeqCst) {
            trace!("Scheduler stopped, not arming {}", user_id);
            return false;
        }

        if pending.contains_key(&user_id) {
            trace!("Dispensation already pending for {}", user_id);
            return false;
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let due_tx = self.due_tx.clone();
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            // Receiver gone means the engine shut down
            let _ = due_tx.send(DueDispense { user_id, seq });
        });

        pending.insert(user_id, PendingDispense { seq, handle });
        debug!(
            "Armed dispensation for {} in {}s (seq {})",
            user_id,
            interval.as_secs(),
            seq
        );
        true
    }

    /// Abort the pending dispensation for `user_id`
    ///
    /// Returns true if a timer was pending.
    pub fn cancel(&self, user_id: Uuid) -> bool {
        match self.lock_pending().remove(&user_id) {
            Some(entry) => {
                entry.handle.abort();
                debug!("Cancelled pending dispensation for {}", user_id);
                true
            }
            None => false,
        }
    }

    /// Retire the timer that produced `due`
    ///
    /// Returns true if `due` is the user's current timer; false for stale ticks.
    pub fn complete(&self, due: &DueDispense) -> bool {
        let mut pending = self.lock_pending();
        match pending.get(&due.user_id) {
            Some(entry) if entry.seq == due.seq => {
                pending.remove(&due.user_id);
                true
            }
            _ => false,
        }
    }

    /// Whether a dispensation is armed and not yet completed for `user_id`
    pub fn is_pending(&self, user_id: Uuid) -> bool {
        self.lock_pending().contains_key(&user_id)
    }

    /// Number of users with a timer entry
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Abort every pending timer and refuse further arming
    pub fn shutdown(&self) {
        let mut pending = self.lock_pending();
        self.closed.store(true, Ordering::SeqCst);
        let count = pending.len();
        for (_, entry) in pending.drain() {
            entry.handle.abort();
        }
        debug!("Dispense scheduler stopped ({} timers aborted)", count);
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, PendingDispense>> {
        // Map operations cannot leave it inconsistent, so a poisoned lock is still usable
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for DispenseScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_armed_timer_fires_after_interval() {
        let (scheduler, mut due_rx) = DispenseScheduler::channel(Duration::from_secs(300));
        let user = Uuid::new_v4();

        let start = tokio::time::Instant::now();
        assert!(scheduler.arm(user));
        assert!(scheduler.is_pending(user));

        let due = due_rx.recv().await.unwrap();
        assert_eq!(due.user_id, user);
        assert!(start.elapsed() >= Duration::from_secs(300));
        assert!(scheduler.complete(&due));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_is_idempotent_while_pending() {
        let (scheduler, mut due_rx) = DispenseScheduler::channel(Duration::from_secs(300));
        let user = Uuid::new_v4();

        assert!(scheduler.arm(user));
        assert!(!scheduler.arm(user));
        assert!(!scheduler.arm(user));
        assert_eq!(scheduler.pending_count(), 1);

        let due = due_rx.recv().await.unwrap();
        assert!(scheduler.complete(&due));

        // Only one tick was produced
        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert!(due_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_pending_timer() {
        let (scheduler, mut due_rx) = DispenseScheduler::channel(Duration::from_secs(300));
        let user = Uuid::new_v4();

        scheduler.arm(user);
        assert!(scheduler.cancel(user));
        assert!(!scheduler.cancel(user));
        assert!(!scheduler.is_pending(user));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(due_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fired_timer_blocks_rearm_until_completed() {
        let (scheduler, mut due_rx) = DispenseScheduler::channel(Duration::from_secs(60));
        let user = Uuid::new_v4();

        scheduler.arm(user);
        let due = due_rx.recv().await.unwrap();

        // Timer task has finished but its tick is not handled yet
        tokio::task::yield_now().await;
        assert!(!scheduler.arm(user));
        assert!(scheduler.is_pending(user));

        // The original tick still counts
        assert!(scheduler.complete(&due));
        assert!(!scheduler.is_pending(user));
        assert!(scheduler.arm(user));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_tick_is_ignored_after_cancel_and_rearm() {
        let (scheduler, mut due_rx) = DispenseScheduler::channel(Duration::from_secs(60));
        let user = Uuid::new_v4();

        scheduler.arm(user);
        let first = due_rx.recv().await.unwrap();

        // User left and came back before the tick was handled
        assert!(scheduler.cancel(user));
        assert!(scheduler.arm(user));
        assert!(!scheduler.complete(&first));
        assert!(scheduler.is_pending(user));
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_are_independent() {
        let (scheduler, mut due_rx) = DispenseScheduler::channel(Duration::from_secs(60));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(scheduler.arm(a));
        assert!(scheduler.arm(b));
        scheduler.cancel(a);

        let due = due_rx.recv().await.unwrap();
        assert_eq!(due.user_id, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_everything() {
        let (scheduler, mut due_rx) = DispenseScheduler::channel(Duration::from_secs(60));
        for _ in 0..5 {
            scheduler.arm(Uuid::new_v4());
        }
        assert_eq!(scheduler.pending_count(), 5);

        scheduler.shutdown();
        assert_eq!(scheduler.pending_count(), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(due_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_after_shutdown_is_refused() {
        let (scheduler, mut due_rx) = DispenseScheduler::channel(Duration::from_secs(60));
        let user = Uuid::new_v4();

        scheduler.shutdown();
        assert!(!scheduler.arm(user));
        assert!(!scheduler.is_pending(user));
        assert_eq!(scheduler.pending_count(), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(due_rx.try_recv().is_err());
    }
}
