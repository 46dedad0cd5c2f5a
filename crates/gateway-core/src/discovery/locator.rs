//! Resolve an instance specifier to a concrete provider.

use super::retry::{retry_until_found, RetryConfig, RetryError};
use crate::error::{GatewayError, Result};
use crate::ipc::{InstanceSpecifier, IpcRuntime, ServiceHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Waits until a service is offered and hands back its first provider.
#[derive(Clone)]
pub struct ServiceLocator {
    runtime: Arc<dyn IpcRuntime>,
    retry: RetryConfig,
}

impl ServiceLocator {
    /// Locator with the default policy: fixed interval, unbounded.
    pub fn new(runtime: Arc<dyn IpcRuntime>) -> Self {
        Self::with_retry(runtime, RetryConfig::default())
    }

    pub fn with_retry(runtime: Arc<dyn IpcRuntime>, retry: RetryConfig) -> Self {
        Self { runtime, retry }
    }

    /// Find a provider of `specifier`, retrying while none is offered.
    ///
    /// A failing discovery query is not retried.
    pub async fn find(&self, specifier: &InstanceSpecifier) -> Result<ServiceHandle> {
        debug!("Looking for a provider of {}", specifier);

        let (result, stats) = retry_until_found(&self.retry, || {
            self.runtime
                .find_service(specifier)
                .map(|handles| handles.into_iter().next())
        })
        .await;

        match result {
            Ok(handle) => {
                info!(
                    "Found {} after {} queries ({:?} waiting)",
                    handle, stats.attempts, stats.total_delay
                );
                Ok(handle)
            }
            Err(RetryError::Failed(source)) => Err(GatewayError::DiscoveryQuery {
                specifier: specifier.to_string(),
                source,
            }),
            Err(RetryError::Exhausted { attempts }) => Err(GatewayError::DiscoveryExhausted {
                specifier: specifier.to_string(),
                attempts,
            }),
        }
    }
}
