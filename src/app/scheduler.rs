//! Admission control and the refresh signal queue.
//!
//! Every chart recomputation issues several aggregate queries, so a single
//! process-wide ceiling bounds how many run at once across all chart types
//! and entities.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};

use crate::domain::{ChartKey, RefreshRequest};

/// Default ceiling of concurrently running refreshes
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Default poll interval while waiting for an admission slot
pub const DEFAULT_ADMISSION_POLL: Duration = Duration::from_millis(50);

/// Default capacity of the refresh signal queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Counter-based gate limiting concurrently executing refreshes.
#[derive(Debug)]
pub struct AdmissionController {
    in_flight: AtomicUsize,
    ceiling: usize,
    poll_interval: Duration,
    idle: Notify,
}

impl AdmissionController {
    #[must_use]
    pub fn new(ceiling: usize, poll_interval: Duration) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            ceiling: ceiling.max(1),
            poll_interval,
            idle: Notify::new(),
        }
    }

    #[must_use]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(self: &Arc<Self>) -> Option<AdmissionPermit> {
        let mut current = self.in_flight.load(Ordering::Acquire);
        loop {
            if current >= self.ceiling {
                return None;
            }
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(AdmissionPermit {
                        controller: Arc::clone(self),
                    });
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Wait for a slot, backing off by the poll interval between attempts.
    pub async fn acquire(self: &Arc<Self>) -> AdmissionPermit {
        loop {
            if let Some(permit) = self.try_acquire() {
                return permit;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Resolve once no permit is outstanding.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn release(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT, DEFAULT_ADMISSION_POLL)
    }
}

/// Slot held by one running refresh; dropping it frees the slot, including
/// on error and on panic unwinding.
#[derive(Debug)]
pub struct AdmissionPermit {
    controller: Arc<AdmissionController>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.controller.release();
    }
}

/// Sending side of the fixed-capacity refresh signal queue.
///
/// Readers never wait on it: when the queue is full the signal is dropped,
/// on the assumption that the key is already queued or will be covered by
/// the next periodic sweep.
#[derive(Debug, Clone)]
pub struct RefreshQueue {
    sender: mpsc::Sender<RefreshRequest>,
    dropped: Arc<AtomicU64>,
}

impl RefreshQueue {
    /// Create the queue and the receiver the refresh worker consumes.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<RefreshRequest>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// Non-blocking enqueue of a refresh signal. Returns `false` when dropped.
    pub fn request(&self, key: ChartKey) -> bool {
        match self.sender.try_send(RefreshRequest::start(key)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Refresh queue full, dropping request");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, "Refresh worker is not running, dropping request");
                false
            }
        }
    }

    /// Tell the worker a refresh for `key` has finished.
    ///
    /// Waits for capacity so the in-flight marker is always cleared while the
    /// worker is alive.
    pub async fn report_done(&self, key: ChartKey) {
        if self.sender.send(RefreshRequest::done(key)).await.is_err() {
            debug!(key = %key, "Refresh worker stopped before completion was reported");
        }
    }

    /// Signals dropped since startup
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChartType, RefreshCommand};

    #[test]
    fn test_try_acquire_respects_ceiling() {
        let controller = Arc::new(AdmissionController::new(2, Duration::from_millis(1)));
        let first = controller.try_acquire().unwrap();
        let _second = controller.try_acquire().unwrap();
        assert!(controller.try_acquire().is_none());
        assert_eq!(controller.in_flight(), 2);

        drop(first);
        assert_eq!(controller.in_flight(), 1);
        assert!(controller.try_acquire().is_some());
    }

    #[test]
    fn test_zero_ceiling_is_raised_to_one() {
        let controller = Arc::new(AdmissionController::new(0, Duration::from_millis(1)));
        assert_eq!(controller.ceiling(), 1);
        assert!(controller.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_permit_released_when_task_panics() {
        let controller = Arc::new(AdmissionController::new(1, Duration::from_millis(1)));
        let inner = Arc::clone(&controller);
        let result = tokio::spawn(async move {
            let _permit = inner.acquire().await;
            panic!("refresh blew up");
        })
        .await;
        assert!(result.is_err());
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let controller = Arc::new(AdmissionController::new(1, Duration::from_millis(5)));
        let held = controller.acquire().await;

        let waiter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                let _permit = controller.acquire().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap();
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_after_last_release() {
        let controller = Arc::new(AdmissionController::new(4, Duration::from_millis(1)));
        controller.wait_idle().await;

        let permits: Vec<_> = (0..3).map(|_| controller.try_acquire().unwrap()).collect();
        let idle = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.wait_idle().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!idle.is_finished());

        drop(permits);
        idle.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_drops_requests() {
        let (queue, mut receiver) = RefreshQueue::bounded(2);
        let key = |id| ChartKey::new(ChartType::Activity, id);

        assert!(queue.request(key(1)));
        assert!(queue.request(key(2)));
        assert!(!queue.request(key(3)));
        assert_eq!(queue.dropped(), 1);

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.key, key(1));
        assert_eq!(first.command, RefreshCommand::Start);
        assert!(queue.request(key(4)));
    }

    #[tokio::test]
    async fn test_request_after_worker_gone_is_dropped() {
        let (queue, receiver) = RefreshQueue::bounded(4);
        drop(receiver);
        assert!(!queue.request(ChartKey::new(ChartType::Holdings, 1)));
        queue.report_done(ChartKey::new(ChartType::Holdings, 1)).await;
        assert_eq!(queue.dropped(), 1);
    }
}
