//! Level-triggered wake-up signal between a runtime callback and a role loop.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A sticky flag that async code can wait on.
///
/// [`notify`](Notification::notify) may be called from any thread, including
/// from inside a runtime's receive handler. The flag stays set until
/// [`reset`](Notification::reset), so a signal raised before anyone waits is
/// not lost.
#[derive(Debug, Default)]
pub struct Notification {
    flag: AtomicBool,
    notify: Notify,
}

impl Notification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Wait until the flag is set. Returns immediately if it already is.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent notify is seen.
            notified.as_mut().enable();
            if self.flag.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_when_already_set() {
        let notification = Notification::new();
        notification.notify();
        notification.wait().await;
        assert!(notification.is_set());

        notification.reset();
        assert!(!notification.is_set());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_notify_from_thread() {
        let notification = Arc::new(Notification::new());
        let remote = Arc::clone(&notification);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.notify();
        });

        tokio::time::timeout(Duration::from_secs(5), notification.wait())
            .await
            .expect("notification should arrive");
        handle.join().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_blocks_while_reset() {
        let notification = Notification::new();
        let waited = tokio::time::timeout(Duration::from_millis(50), notification.wait()).await;
        assert!(waited.is_err());
    }
}
