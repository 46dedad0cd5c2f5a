//! Contracts of the process-local publish/subscribe IPC runtime.
//!
//! The gateway and the sample-exchange roles never talk to a concrete runtime
//! directly. They go through [`IpcRuntime`], [`EventProxy`] and
//! [`EventSkeleton`], which a production runtime binding implements.
//! [`LocalRuntime`] is the in-process implementation used by the binaries and
//! the tests.
//!
//! # Thread Safety
//!
//! A runtime is shared as `Arc<dyn IpcRuntime>` and must synchronize
//! internally. Proxies and skeletons are owned by a single role loop.

pub mod local;

pub use local::LocalRuntime;

use crate::error::{GatewayError, Result};
use std::fmt;
use thiserror::Error;

/// Errors reported by an IPC runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("provider {provider_id} of {specifier} is no longer available")]
    ProviderUnavailable { specifier: String, provider_id: u64 },

    #[error("service {0} is already offered by this skeleton")]
    AlreadyOffered(String),

    #[error("service {0} is not offered")]
    NotOffered(String),

    #[error("event is not subscribed")]
    NotSubscribed,

    #[error("invalid subscription queue depth {0}")]
    InvalidQueueDepth(usize),

    #[error("runtime state lock poisoned")]
    Poisoned,

    #[error("{0}")]
    Other(String),
}

/// Logical name of a service instance, e.g. `gateway/ipc_bridge/map_api_lanes`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceSpecifier(String);

impl InstanceSpecifier {
    /// Validate and wrap a specifier.
    ///
    /// Allowed characters are ASCII alphanumerics, `_`, `-`, `.` and `/`.
    /// Path segments separated by `/` must not be empty.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let invalid = |reason: &str| GatewayError::InvalidSpecifier {
            value: value.clone(),
            reason: reason.to_string(),
        };

        if value.is_empty() {
            return Err(invalid("specifier is empty"));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/')))
        {
            return Err(invalid(&format!("character '{}' is not allowed", c)));
        }
        if value.split('/').any(str::is_empty) {
            return Err(invalid("path segments must not be empty"));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A discovered provider of a service instance.
///
/// Handles are produced by [`IpcRuntime::find_service`] and consumed by
/// [`IpcRuntime::create_proxy`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceHandle {
    specifier: InstanceSpecifier,
    provider_id: u64,
}

impl ServiceHandle {
    pub fn new(specifier: InstanceSpecifier, provider_id: u64) -> Self {
        Self {
            specifier,
            provider_id,
        }
    }

    pub fn specifier(&self) -> &InstanceSpecifier {
        &self.specifier
    }

    pub fn provider_id(&self) -> u64 {
        self.provider_id
    }
}

impl fmt::Display for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.specifier, self.provider_id)
    }
}

/// One event sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    /// Monotonically increasing per sender.
    pub sequence: u32,
    pub payload: String,
}

impl SampleRecord {
    pub fn new(sequence: u32, payload: impl Into<String>) -> Self {
        Self {
            sequence,
            payload: payload.into(),
        }
    }
}

/// Callback invoked by the runtime when new samples are available.
pub type ReceiveHandler = Box<dyn Fn() + Send + Sync + 'static>;

/// The process-wide IPC runtime.
pub trait IpcRuntime: Send + Sync {
    /// List the current providers of `specifier`, in discovery order.
    ///
    /// An empty list is not an error.
    fn find_service(
        &self,
        specifier: &InstanceSpecifier,
    ) -> std::result::Result<Vec<ServiceHandle>, RuntimeError>;

    /// Bind a proxy to a discovered provider.
    fn create_proxy(
        &self,
        handle: ServiceHandle,
    ) -> std::result::Result<Box<dyn EventProxy>, RuntimeError>;

    /// Create an (initially unoffered) skeleton for `specifier`.
    fn create_skeleton(
        &self,
        specifier: &InstanceSpecifier,
    ) -> std::result::Result<Box<dyn EventSkeleton>, RuntimeError>;
}

/// Consumer side of an event.
pub trait EventProxy: Send {
    /// Register the callback fired when new samples arrive.
    ///
    /// Must be called before [`EventProxy::subscribe`] to take effect.
    fn set_receive_handler(&mut self, handler: ReceiveHandler);

    /// Subscribe with a queue holding at most `max_sample_count` samples.
    fn subscribe(&mut self, max_sample_count: usize) -> std::result::Result<(), RuntimeError>;

    /// Hand up to `max_samples` new samples to `receiver`, oldest first.
    ///
    /// Returns the number of samples handed over.
    fn get_new_samples(
        &mut self,
        receiver: &mut dyn FnMut(SampleRecord),
        max_samples: usize,
    ) -> std::result::Result<usize, RuntimeError>;

    fn unsubscribe(&mut self);
}

/// Provider side of an event.
pub trait EventSkeleton: Send {
    fn offer(&mut self) -> std::result::Result<(), RuntimeError>;

    fn send(&mut self, sample: SampleRecord) -> std::result::Result<(), RuntimeError>;

    fn stop_offer(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_specifiers() {
        for value in ["bridge", "gateway/ipc_bridge/map-v1.2", "a/b/c"] {
            let spec = InstanceSpecifier::new(value).expect("should be valid");
            assert_eq!(spec.as_str(), value);
        }
    }

    #[test]
    fn test_invalid_specifiers() {
        for value in ["", "/leading", "trailing/", "double//slash", "white space", "ümlaut"] {
            let err = InstanceSpecifier::new(value).unwrap_err();
            assert!(
                matches!(err, GatewayError::InvalidSpecifier { .. }),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_handle_display() {
        let spec = InstanceSpecifier::new("bridge/map").unwrap();
        let handle = ServiceHandle::new(spec, 7);
        assert_eq!(handle.to_string(), "bridge/map#7");
        assert_eq!(handle.provider_id(), 7);
    }
}
