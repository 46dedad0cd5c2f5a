//! How the receiver loop decides it is time to drain.

use super::notification::Notification;
use crate::ipc::EventProxy;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Wake-up policy of the receiver loop.
#[async_trait]
pub trait WakeStrategy: Send {
    /// Hook into the proxy before it subscribes.
    fn attach(&mut self, proxy: &mut dyn EventProxy);

    /// Suspend until the next drain should happen.
    async fn wait(&mut self);

    /// Whether every wake-up promises at least one new sample.
    fn expects_samples(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Pick the strategy for a receiver cadence: `None` is push mode.
pub fn strategy_for(cadence: Option<Duration>) -> Box<dyn WakeStrategy> {
    match cadence {
        Some(cadence) => Box::new(PollingWake::new(cadence)),
        None => Box::new(NotifiedWake::new()),
    }
}

/// Drain on a fixed cadence.
#[derive(Debug, Clone)]
pub struct PollingWake {
    cadence: Duration,
}

impl PollingWake {
    pub fn new(cadence: Duration) -> Self {
        Self { cadence }
    }
}

#[async_trait]
impl WakeStrategy for PollingWake {
    fn attach(&mut self, _proxy: &mut dyn EventProxy) {}

    async fn wait(&mut self) {
        tokio::time::sleep(self.cadence).await;
    }

    fn expects_samples(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "polling"
    }
}

/// Drain whenever the runtime reports new samples.
///
/// Every wake-up must find at least one sample, otherwise the receiver fails
/// with `NotifiedWithoutSamples`. That holds only while the receive handler
/// cannot fire after its samples were already drained. `LocalRuntime` queues a
/// sample under its lock and invokes handlers after releasing it, so sender
/// and receiver must share one thread (a current-thread tokio runtime, or
/// `join!`/`select!` on one task). On a multi-threaded executor a drain can
/// slip in between queueing and signalling and leave a stale notification.
#[derive(Debug, Default)]
pub struct NotifiedWake {
    notification: Arc<Notification>,
}

impl NotifiedWake {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WakeStrategy for NotifiedWake {
    fn attach(&mut self, proxy: &mut dyn EventProxy) {
        let notification = Arc::clone(&self.notification);
        proxy.set_receive_handler(Box::new(move || notification.notify()));
        debug!("Installed receive handler");
    }

    async fn wait(&mut self) {
        self.notification.wait().await;
        // Reset before draining: samples arriving during the drain re-arm it.
        self.notification.reset();
    }

    fn expects_samples(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "push"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::{
        InstanceSpecifier, IpcRuntime, LocalRuntime, ReceiveHandler, RuntimeError, SampleRecord,
    };

    #[derive(Default)]
    struct HandlerSlot {
        handler: Option<ReceiveHandler>,
    }

    impl EventProxy for HandlerSlot {
        fn set_receive_handler(&mut self, handler: ReceiveHandler) {
            self.handler = Some(handler);
        }

        fn subscribe(&mut self, _max: usize) -> Result<(), RuntimeError> {
            Ok(())
        }

        fn get_new_samples(
            &mut self,
            _receiver: &mut dyn FnMut(SampleRecord),
            _max: usize,
        ) -> Result<usize, RuntimeError> {
            Ok(0)
        }

        fn unsubscribe(&mut self) {}
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(strategy_for(None).name(), "push");
        assert!(strategy_for(None).expects_samples());

        let polling = strategy_for(Some(Duration::from_millis(5)));
        assert_eq!(polling.name(), "polling");
        assert!(!polling.expects_samples());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_sleeps_for_cadence() {
        let mut wake = PollingWake::new(Duration::from_millis(30));
        let start = tokio::time::Instant::now();
        wake.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_notified_wake_resets_after_wait() {
        let mut proxy = HandlerSlot::default();
        let mut wake = NotifiedWake::new();
        wake.attach(&mut proxy);

        let handler = proxy.handler.take().expect("handler installed");
        handler();
        assert!(wake.notification.is_set());

        wake.wait().await;
        assert!(!wake.notification.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn test_notified_wake_always_finds_samples_on_one_thread() {
        let runtime = LocalRuntime::new();
        let specifier = InstanceSpecifier::new("bridge/map").unwrap();
        let mut skeleton = runtime.create_skeleton(&specifier).unwrap();
        skeleton.offer().unwrap();
        let handle = runtime.find_service(&specifier).unwrap().remove(0);
        let mut proxy = runtime.create_proxy(handle).unwrap();

        let mut wake = NotifiedWake::new();
        wake.attach(proxy.as_mut());
        proxy.subscribe(2).unwrap();

        let mut received = Vec::new();
        let mut next = 1u32;
        for burst in [1, 2, 1, 2] {
            for _ in 0..burst {
                skeleton.send(SampleRecord::new(next, "x")).unwrap();
                next += 1;
            }
            wake.wait().await;
            let count = proxy
                .get_new_samples(&mut |s: SampleRecord| received.push(s.sequence), 2)
                .unwrap();
            assert!(count >= 1, "a wake-up must find samples");
            assert!(!wake.notification.is_set(), "no stale notification after drain");
        }
        assert_eq!(received, vec![1, 2, 3, 4, 5, 6]);
    }
}
