//! Skeleton role: offer a service and publish samples at a fixed cadence.

use super::producer::SampleProducer;
use crate::config::{CycleBudget, SenderConfig};
use crate::error::{GatewayError, Result};
use crate::ipc::{EventSkeleton, InstanceSpecifier, IpcRuntime};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Stops offering when dropped.
struct OfferGuard<'a> {
    skeleton: Box<dyn EventSkeleton>,
    specifier: &'a InstanceSpecifier,
}

impl Drop for OfferGuard<'_> {
    fn drop(&mut self) {
        info!("{}: Stop offering service", self.specifier);
        self.skeleton.stop_offer();
    }
}

/// Offers one service instance and sends what a [`SampleProducer`] makes.
pub struct SampleSender<P> {
    runtime: Arc<dyn IpcRuntime>,
    specifier: InstanceSpecifier,
    producer: P,
}

impl<P: SampleProducer> SampleSender<P> {
    pub fn new(runtime: Arc<dyn IpcRuntime>, specifier: InstanceSpecifier, producer: P) -> Self {
        Self {
            runtime,
            specifier,
            producer,
        }
    }

    pub fn specifier(&self) -> &InstanceSpecifier {
        &self.specifier
    }

    /// Send one sample per cycle, sleeping `budget.cadence` after each send.
    ///
    /// Without a cadence [`SenderConfig::DEFAULT_CYCLE_TIME`] is used. A cycle
    /// count of 0 sends until the future is dropped. Returns the number of
    /// samples sent.
    pub async fn run(&mut self, budget: CycleBudget) -> Result<usize> {
        let spec = &self.specifier;
        let cadence = budget.cadence.unwrap_or(SenderConfig::DEFAULT_CYCLE_TIME);

        let mut skeleton = self.runtime.create_skeleton(spec).map_err(|source| {
            GatewayError::SkeletonConstruction {
                specifier: spec.to_string(),
                source,
            }
        })?;

        info!("{}: Offering service", spec);
        skeleton.offer().map_err(|source| GatewayError::Offer {
            specifier: spec.to_string(),
            source,
        })?;
        let mut guard = OfferGuard {
            skeleton,
            specifier: spec,
        };

        let mut cycle = 0usize;
        while budget.allows(cycle) {
            let Some(sample) = self.producer.produce(cycle) else {
                let err = GatewayError::SampleExhausted {
                    specifier: spec.to_string(),
                    cycle,
                };
                error!("{}", err);
                return Err(err);
            };

            let sequence = sample.sequence;
            guard
                .skeleton
                .send(sample)
                .map_err(|source| GatewayError::SendFailed {
                    specifier: spec.to_string(),
                    sequence,
                    source,
                })?;
            debug!("{}: Sent sample {} in cycle {}", spec, sequence, cycle);

            cycle += 1;
            tokio::time::sleep(cadence).await;
        }

        drop(guard);
        info!("{}: Sent {} samples", spec, cycle);
        Ok(cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::producer::{ScriptedProducer, SequenceProducer};
    use crate::ipc::{EventProxy, LocalRuntime, RuntimeError, SampleRecord, ServiceHandle};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn spec() -> InstanceSpecifier {
        InstanceSpecifier::new("bridge/map").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_budgeted_samples() {
        let runtime = LocalRuntime::new();
        let mut sender = SampleSender::new(Arc::new(runtime.clone()), spec(), SequenceProducer::new());

        let start = tokio::time::Instant::now();
        let sent = sender
            .run(CycleBudget::every(Duration::from_millis(10), 3))
            .await
            .unwrap();

        assert_eq!(sent, 3);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(runtime.provider_count(&spec()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_producer_stops_offer() {
        let runtime = LocalRuntime::new();
        let mut sender = SampleSender::new(
            Arc::new(runtime.clone()),
            spec(),
            ScriptedProducer::new([1, 2]),
        );

        let err = sender
            .run(CycleBudget::every(Duration::from_millis(10), 4))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::SampleExhausted { cycle: 2, .. }));
        assert_eq!(err.exit_code(), 7);
        assert_eq!(runtime.provider_count(&spec()), 0);
    }

    struct FailingSkeleton {
        fail_offer: bool,
        stopped: Arc<AtomicBool>,
    }

    impl EventSkeleton for FailingSkeleton {
        fn offer(&mut self) -> std::result::Result<(), RuntimeError> {
            if self.fail_offer {
                Err(RuntimeError::Other("offer rejected".into()))
            } else {
                Ok(())
            }
        }

        fn send(&mut self, _sample: SampleRecord) -> std::result::Result<(), RuntimeError> {
            Err(RuntimeError::Other("transport down".into()))
        }

        fn stop_offer(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct SkeletonRuntime {
        fail_offer: bool,
        stopped: Arc<AtomicBool>,
    }

    impl IpcRuntime for SkeletonRuntime {
        fn find_service(
            &self,
            _specifier: &InstanceSpecifier,
        ) -> std::result::Result<Vec<ServiceHandle>, RuntimeError> {
            Ok(Vec::new())
        }

        fn create_proxy(
            &self,
            _handle: ServiceHandle,
        ) -> std::result::Result<Box<dyn EventProxy>, RuntimeError> {
            Err(RuntimeError::Other("unused".into()))
        }

        fn create_skeleton(
            &self,
            _specifier: &InstanceSpecifier,
        ) -> std::result::Result<Box<dyn EventSkeleton>, RuntimeError> {
            Ok(Box::new(FailingSkeleton {
                fail_offer: self.fail_offer,
                stopped: Arc::clone(&self.stopped),
            }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_stops_offer() {
        let stopped = Arc::new(AtomicBool::new(false));
        let runtime = Arc::new(SkeletonRuntime {
            fail_offer: false,
            stopped: Arc::clone(&stopped),
        });
        let mut sender = SampleSender::new(runtime, spec(), SequenceProducer::new());

        let err = sender.run(CycleBudget::default()).await.unwrap_err();
        assert!(matches!(err, GatewayError::SendFailed { sequence: 1, .. }));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_offer_failure() {
        let stopped = Arc::new(AtomicBool::new(false));
        let runtime = Arc::new(SkeletonRuntime {
            fail_offer: true,
            stopped: Arc::clone(&stopped),
        });
        let mut sender = SampleSender::new(runtime, spec(), SequenceProducer::new());

        let err = sender.run(CycleBudget::default()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Offer { .. }));
        assert!(!stopped.load(Ordering::SeqCst));
    }
}
