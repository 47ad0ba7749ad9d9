//! One-shot timers backing the neighbor and interface state machines.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// A cancelable, resettable one-shot alarm.
///
/// The callback runs once on its own spawned task when the deadline elapses.
/// Dropping the handle cancels a pending firing; a callback that already
/// started running is never interrupted. A fired handle is spent, arming a
/// fresh `Timer` is required to schedule the same logical timer again.
pub struct Timer {
    deadline: watch::Sender<Instant>,
    cancel: CancellationToken,
}

impl Timer {
    /// Schedule `callback` to run once after `delay`.
    pub fn arm<F, Fut>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (deadline, mut watcher) = watch::channel(Instant::now() + delay);
        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();
        tokio::spawn(async move {
            loop {
                let deadline = *watcher.borrow_and_update();
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => return,
                    res = watcher.changed() => {
                        // The sender is dropped together with the cancellation
                        // token, so a closed channel also means we are done.
                        if res.is_err() {
                            return;
                        }
                    }
                    _ = time::sleep_until(deadline) => break,
                }
            }
            callback().await;
        });
        Timer { deadline, cancel }
    }

    /// Replace the pending deadline with `delay` from now.
    ///
    /// A timer whose callback is already executing ignores the reset; callers
    /// must tolerate the extra firing.
    pub fn reset(&self, delay: Duration) {
        let _ = self.deadline.send(Instant::now() + delay);
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::Timer;

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = tokio::time::Instant::now();
        let _timer = Timer::arm(Duration::from_secs(5), move || async move {
            tx.send(()).unwrap();
        });

        rx.recv().await.expect("timer fires");
        assert_eq!(start.elapsed(), Duration::from_secs(5));

        // One-shot: nothing else ever arrives.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_replaces_pending_deadline() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = tokio::time::Instant::now();
        let timer = Timer::arm(Duration::from_secs(5), move || async move {
            tx.send(()).unwrap();
        });

        tokio::time::advance(Duration::from_secs(3)).await;
        timer.reset(Duration::from_secs(10));

        rx.recv().await.expect("timer fires");
        assert_eq!(start.elapsed(), Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_pending_firing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = Timer::arm(Duration::from_secs(5), move || async move {
            tx.send(()).unwrap();
        });

        drop(timer);
        tokio::time::advance(Duration::from_secs(60)).await;
        // The sender was dropped together with the cancelled task.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_fires_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _timer = Timer::arm(Duration::ZERO, move || async move {
            tx.send(()).unwrap();
        });

        rx.recv().await.expect("timer fires");
    }
}
