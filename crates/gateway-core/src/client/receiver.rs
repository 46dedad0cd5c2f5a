//! Proxy role: subscribe to an event and verify what arrives.
//!
//! # Loop
//!
//! Every iteration waits per the [`WakeStrategy`], drains up to
//! [`ReceiverConfig::SAMPLES_PER_CYCLE`] samples and then reconciles the count
//! the runtime reported against the samples accepted in that drain. Any
//! disagreement is fatal. An out-of-order sample is rejected and logged at the
//! record level, and because it is not accepted the drain that carried it
//! fails reconciliation.

use super::wake::{strategy_for, WakeStrategy};
use crate::config::{CycleBudget, ReceiverConfig};
use crate::discovery::{RetryConfig, ServiceLocator};
use crate::error::{ConsistencyViolation, GatewayError, OutOfOrderSample, Result};
use crate::ipc::{EventProxy, InstanceSpecifier, IpcRuntime, SampleRecord};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Running result of a receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceptionTally {
    pub accepted: usize,
    pub rejected: usize,
    pub last_accepted: Option<u32>,
}

impl ReceptionTally {
    /// Accept `sample` if its sequence is above the last accepted one.
    ///
    /// A rejected sample leaves `last_accepted` untouched.
    pub fn accept(&mut self, sample: &SampleRecord) -> std::result::Result<(), OutOfOrderSample> {
        if let Some(last_accepted) = self.last_accepted {
            if sample.sequence <= last_accepted {
                self.rejected += 1;
                return Err(OutOfOrderSample {
                    sequence: sample.sequence,
                    last_accepted,
                });
            }
        }
        self.accepted += 1;
        self.last_accepted = Some(sample.sequence);
        Ok(())
    }
}

/// Unsubscribes when dropped.
struct SubscriptionGuard<'a> {
    proxy: Box<dyn EventProxy>,
    specifier: &'a InstanceSpecifier,
}

impl Drop for SubscriptionGuard<'_> {
    fn drop(&mut self) {
        info!("{}: Unsubscribing", self.specifier);
        self.proxy.unsubscribe();
    }
}

/// Subscribes to one service instance and checks the samples it delivers.
pub struct SampleReceiver {
    runtime: Arc<dyn IpcRuntime>,
    specifier: InstanceSpecifier,
    locator: ServiceLocator,
}

impl SampleReceiver {
    pub fn new(runtime: Arc<dyn IpcRuntime>, specifier: InstanceSpecifier) -> Self {
        let locator = ServiceLocator::new(Arc::clone(&runtime));
        Self {
            runtime,
            specifier,
            locator,
        }
    }

    /// Replace the discovery retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.locator = ServiceLocator::with_retry(Arc::clone(&self.runtime), retry);
        self
    }

    pub fn specifier(&self) -> &InstanceSpecifier {
        &self.specifier
    }

    /// Receive until `budget.cycles` samples have arrived.
    ///
    /// `budget.cadence` selects polling; `None` waits for the runtime's
    /// receive notification. A cycle count of 0 receives until the future is
    /// dropped or a check fails.
    pub async fn run(&self, budget: CycleBudget) -> Result<ReceptionTally> {
        let spec = &self.specifier;

        let handle = self.locator.find(spec).await?;
        info!("{}: Found service, instantiating proxy", spec);

        let mut proxy =
            self.runtime
                .create_proxy(handle)
                .map_err(|source| GatewayError::ProxyConstruction {
                    specifier: spec.to_string(),
                    source,
                })?;

        let mut wake = strategy_for(budget.cadence);
        wake.attach(proxy.as_mut());

        info!("{}: Subscribing to service ({} mode)", spec, wake.name());
        proxy
            .subscribe(ReceiverConfig::SAMPLES_PER_CYCLE)
            .map_err(|source| GatewayError::Subscription {
                specifier: spec.to_string(),
                source,
            })?;
        let mut guard = SubscriptionGuard {
            proxy,
            specifier: spec,
        };

        let tally = receive_loop(spec, guard.proxy.as_mut(), wake.as_mut(), budget).await?;

        drop(guard);
        info!(
            "{}: Terminating after {} accepted and {} rejected samples",
            spec, tally.accepted, tally.rejected
        );
        Ok(tally)
    }
}

async fn receive_loop(
    spec: &InstanceSpecifier,
    proxy: &mut dyn EventProxy,
    wake: &mut dyn WakeStrategy,
    budget: CycleBudget,
) -> Result<ReceptionTally> {
    let mut tally = ReceptionTally::default();
    let mut cycle = 0usize;

    while budget.allows(cycle) {
        let cycle_start = Instant::now();
        wake.wait().await;

        let accepted_before = tally.accepted;
        let mut on_sample = |sample: SampleRecord| {
            if let Err(e) = tally.accept(&sample) {
                warn!("{}: {}", spec, e);
            }
        };
        let reported = proxy.get_new_samples(&mut on_sample, ReceiverConfig::SAMPLES_PER_CYCLE);
        let accepted = tally.accepted - accepted_before;

        let reported = match check_cycle(reported, accepted, wake.expects_samples()) {
            Ok(reported) => reported,
            Err(violation) => {
                let err = GatewayError::ReceptionConsistency {
                    specifier: spec.to_string(),
                    cycle,
                    violation,
                };
                error!("{}, terminating", err);
                return Err(err);
            }
        };

        if reported >= 1 {
            info!("{}: Proxy received valid data", spec);
            cycle += reported;
        }

        debug!("{}: Cycle duration {:?}", spec, cycle_start.elapsed());
    }

    Ok(tally)
}

/// Reconcile one drain: the reported count must equal the samples accepted.
fn check_cycle(
    reported: std::result::Result<usize, crate::ipc::RuntimeError>,
    accepted: usize,
    expects_samples: bool,
) -> std::result::Result<usize, ConsistencyViolation> {
    match reported {
        Err(e) => Err(ConsistencyViolation::Api(e)),
        Ok(reported) if reported != accepted => Err(ConsistencyViolation::CountMismatch {
            reported,
            accepted,
        }),
        Ok(0) if expects_samples => Err(ConsistencyViolation::NotifiedWithoutSamples),
        Ok(reported) => Ok(reported),
    }
}
