//! In-process implementation of the IPC runtime contracts.
//!
//! All providers and subscriptions live in one registry behind a mutex.
//! Receive handlers are always invoked after the registry lock is released,
//! so a handler may call back into the runtime.

use super::{
    EventProxy, EventSkeleton, InstanceSpecifier, IpcRuntime, ReceiveHandler, RuntimeError,
    SampleRecord, ServiceHandle,
};
use crate::config::RuntimeConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

type SharedHandler = Arc<dyn Fn() + Send + Sync + 'static>;

#[derive(Default)]
struct Registry {
    next_provider_id: u64,
    next_subscription_id: u64,
    /// Offered providers, in offer order.
    providers: Vec<Provider>,
    subscriptions: HashMap<u64, Subscription>,
}

struct Provider {
    id: u64,
    specifier: InstanceSpecifier,
    /// Most recent samples, oldest first.
    history: VecDeque<SampleRecord>,
}

struct Subscription {
    provider_id: u64,
    capacity: usize,
    queue: VecDeque<SampleRecord>,
    handler: Option<SharedHandler>,
}

impl Subscription {
    fn push(&mut self, sample: SampleRecord) {
        if self.queue.len() == self.capacity {
            self.queue.pop_front();
        }
        self.queue.push_back(sample);
    }
}

impl Registry {
    fn provider_mut(&mut self, id: u64) -> Option<&mut Provider> {
        self.providers.iter_mut().find(|p| p.id == id)
    }
}

fn lock(registry: &Mutex<Registry>) -> Result<MutexGuard<'_, Registry>, RuntimeError> {
    registry.lock().map_err(|_| RuntimeError::Poisoned)
}

/// Process-local publish/subscribe runtime.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone, Default)]
pub struct LocalRuntime {
    registry: Arc<Mutex<Registry>>,
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently offered providers of `specifier`.
    pub fn provider_count(&self, specifier: &InstanceSpecifier) -> usize {
        lock(&self.registry)
            .map(|r| {
                r.providers
                    .iter()
                    .filter(|p| &p.specifier == specifier)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of live subscriptions across all providers.
    pub fn subscription_count(&self) -> usize {
        lock(&self.registry)
            .map(|r| r.subscriptions.len())
            .unwrap_or(0)
    }
}

impl IpcRuntime for LocalRuntime {
    fn find_service(
        &self,
        specifier: &InstanceSpecifier,
    ) -> Result<Vec<ServiceHandle>, RuntimeError> {
        let registry = lock(&self.registry)?;
        Ok(registry
            .providers
            .iter()
            .filter(|p| &p.specifier == specifier)
            .map(|p| ServiceHandle::new(p.specifier.clone(), p.id))
            .collect())
    }

    fn create_proxy(&self, handle: ServiceHandle) -> Result<Box<dyn EventProxy>, RuntimeError> {
        let registry = lock(&self.registry)?;
        if !registry.providers.iter().any(|p| p.id == handle.provider_id()) {
            return Err(RuntimeError::ProviderUnavailable {
                specifier: handle.specifier().to_string(),
                provider_id: handle.provider_id(),
            });
        }
        drop(registry);

        debug!("Created proxy for {}", handle);
        Ok(Box::new(LocalProxy {
            registry: Arc::clone(&self.registry),
            handle,
            handler: None,
            subscription_id: None,
        }))
    }

    fn create_skeleton(
        &self,
        specifier: &InstanceSpecifier,
    ) -> Result<Box<dyn EventSkeleton>, RuntimeError> {
        Ok(Box::new(LocalSkeleton {
            registry: Arc::clone(&self.registry),
            specifier: specifier.clone(),
            provider_id: None,
        }))
    }
}

struct LocalProxy {
    registry: Arc<Mutex<Registry>>,
    handle: ServiceHandle,
    handler: Option<SharedHandler>,
    subscription_id: Option<u64>,
}

impl EventProxy for LocalProxy {
    fn set_receive_handler(&mut self, handler: ReceiveHandler) {
        self.handler = Some(Arc::from(handler));
    }

    fn subscribe(&mut self, max_sample_count: usize) -> Result<(), RuntimeError> {
        if max_sample_count == 0 {
            return Err(RuntimeError::InvalidQueueDepth(max_sample_count));
        }
        self.unsubscribe();

        let mut registry = lock(&self.registry)?;
        let provider_id = self.handle.provider_id();
        let seed: VecDeque<SampleRecord> = match registry.provider_mut(provider_id) {
            Some(provider) => {
                let skip = provider.history.len().saturating_sub(max_sample_count);
                provider.history.iter().skip(skip).cloned().collect()
            }
            None => {
                return Err(RuntimeError::ProviderUnavailable {
                    specifier: self.handle.specifier().to_string(),
                    provider_id,
                })
            }
        };

        let id = registry.next_subscription_id;
        registry.next_subscription_id += 1;
        let seeded = seed.len();
        registry.subscriptions.insert(
            id,
            Subscription {
                provider_id,
                capacity: max_sample_count,
                queue: seed,
                handler: self.handler.clone(),
            },
        );
        drop(registry);

        self.subscription_id = Some(id);
        debug!(
            "Subscribed to {} with queue depth {} ({} samples pending)",
            self.handle, max_sample_count, seeded
        );

        if seeded > 0 {
            if let Some(handler) = &self.handler {
                handler();
            }
        }
        Ok(())
    }

    fn get_new_samples(
        &mut self,
        receiver: &mut dyn FnMut(SampleRecord),
        max_samples: usize,
    ) -> Result<usize, RuntimeError> {
        let id = self.subscription_id.ok_or(RuntimeError::NotSubscribed)?;

        let mut registry = lock(&self.registry)?;
        let subscription = registry
            .subscriptions
            .get_mut(&id)
            .ok_or(RuntimeError::NotSubscribed)?;
        let take = max_samples.min(subscription.queue.len());
        let samples: Vec<SampleRecord> = subscription.queue.drain(..take).collect();
        drop(registry);

        let count = samples.len();
        for sample in samples {
            receiver(sample);
        }
        Ok(count)
    }

    fn unsubscribe(&mut self) {
        if let Some(id) = self.subscription_id.take() {
            if let Ok(mut registry) = lock(&self.registry) {
                registry.subscriptions.remove(&id);
            }
            debug!("Unsubscribed from {}", self.handle);
        }
    }
}

impl Drop for LocalProxy {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

struct LocalSkeleton {
    registry: Arc<Mutex<Registry>>,
    specifier: InstanceSpecifier,
    provider_id: Option<u64>,
}

impl EventSkeleton for LocalSkeleton {
    fn offer(&mut self) -> Result<(), RuntimeError> {
        if self.provider_id.is_some() {
            return Err(RuntimeError::AlreadyOffered(self.specifier.to_string()));
        }

        let mut registry = lock(&self.registry)?;
        let id = registry.next_provider_id;
        registry.next_provider_id += 1;
        registry.providers.push(Provider {
            id,
            specifier: self.specifier.clone(),
            history: VecDeque::with_capacity(RuntimeConfig::SAMPLE_HISTORY_DEPTH),
        });
        drop(registry);

        self.provider_id = Some(id);
        debug!("Offered {}#{}", self.specifier, id);
        Ok(())
    }

    fn send(&mut self, sample: SampleRecord) -> Result<(), RuntimeError> {
        let id = self
            .provider_id
            .ok_or_else(|| RuntimeError::NotOffered(self.specifier.to_string()))?;

        let mut registry = lock(&self.registry)?;
        let provider = registry
            .provider_mut(id)
            .ok_or_else(|| RuntimeError::NotOffered(self.specifier.to_string()))?;
        if provider.history.len() == RuntimeConfig::SAMPLE_HISTORY_DEPTH {
            provider.history.pop_front();
        }
        provider.history.push_back(sample.clone());

        let mut handlers = Vec::new();
        for subscription in registry
            .subscriptions
            .values_mut()
            .filter(|s| s.provider_id == id)
        {
            subscription.push(sample.clone());
            if let Some(handler) = &subscription.handler {
                handlers.push(Arc::clone(handler));
            }
        }
        drop(registry);

        trace!(
            "Sent sample {} on {} to {} handlers",
            sample.sequence,
            self.specifier,
            handlers.len()
        );
        for handler in handlers {
            handler();
        }
        Ok(())
    }

    fn stop_offer(&mut self) {
        if let Some(id) = self.provider_id.take() {
            if let Ok(mut registry) = lock(&self.registry) {
                registry.providers.retain(|p| p.id != id);
            }
            debug!("Stopped offering {}#{}", self.specifier, id);
        }
    }
}

impl Drop for LocalSkeleton {
    fn drop(&mut self) {
        self.stop_offer();
    }
}
