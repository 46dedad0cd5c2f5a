//! Ownership of constructed plugin instances and the modules they came from.
//!
//! Handles declare the instance before the module, so the instance is always
//! destroyed while its code is still mapped.

#![allow(unsafe_code)]

use super::abi::{
    DestroyFn, FactoryArgs, PollFn, PollStatus, RawPayloadTransformation, RawTransport,
    RuntimeContext, TransportBinding, TransportFactoryFn, PAYLOAD_TRANSFORMATION_FACTORY_NAME,
    PLUGIN_FACTORY_NAME,
};
use super::module::PluginModule;
use crate::error::{GatewayError, Result};
use crate::ipc::IpcRuntime;
use std::ffi::c_void;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A live transport instance created by a plugin factory.
///
/// Destroyed through the plugin's `destroy` entry point on drop.
pub struct TransportInstance {
    instance: *mut c_void,
    poll: PollFn,
    destroy: DestroyFn,
}

// SAFETY: the instance is only touched through `&mut self` (poll) or on drop,
// and plugin transports are required to be `Send`.
unsafe impl Send for TransportInstance {}

impl TransportInstance {
    /// Validate what a factory returned.
    ///
    /// # Safety
    ///
    /// `raw` must come straight from a plugin factory whose module is still
    /// mapped, and must not be used again by the caller.
    unsafe fn from_raw(raw: RawTransport, module: &str) -> Result<Self> {
        match (raw.instance.is_null(), raw.poll, raw.destroy) {
            (false, Some(poll), Some(destroy)) => Ok(Self {
                instance: raw.instance,
                poll,
                destroy,
            }),
            (true, _, _) => Err(GatewayError::PluginConstruction {
                module: module.to_string(),
                reason: "factory returned a null instance".into(),
            }),
            (false, _, destroy) => {
                if let Some(destroy) = destroy {
                    // SAFETY: instance is non-null and owned by us per the
                    // caller contract.
                    unsafe { destroy(raw.instance) };
                }
                Err(GatewayError::PluginConstruction {
                    module: module.to_string(),
                    reason: "instance is missing its poll or destroy entry point".into(),
                })
            }
        }
    }

    /// Run one transport poll.
    pub fn poll(&mut self) -> Result<()> {
        // SAFETY: instance is valid until drop and we hold it exclusively.
        let status = unsafe { (self.poll)(self.instance) };
        if status == PollStatus::OK {
            Ok(())
        } else {
            Err(GatewayError::PluginPanicked)
        }
    }
}

impl Drop for TransportInstance {
    fn drop(&mut self) {
        // SAFETY: instance was created by the factory and is destroyed once.
        unsafe { (self.destroy)(self.instance) };
    }
}

/// A mapped module whose factory symbol has been resolved, not yet invoked.
pub struct ResolvedPlugin {
    name: String,
    factory: TransportFactoryFn,
    module: Box<dyn PluginModule>,
}

impl ResolvedPlugin {
    /// Resolve [`PLUGIN_FACTORY_NAME`] in `module`.
    pub fn resolve(module: Box<dyn PluginModule>) -> Result<Self> {
        let name = module.describe();
        let factory = module.resolve_factory(PLUGIN_FACTORY_NAME)?;
        debug!("Resolved {} in {}", PLUGIN_FACTORY_NAME, name);
        Ok(Self {
            name,
            factory,
            module,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the factory once and validate the result.
    ///
    /// On failure the module is released before returning.
    pub fn instantiate(
        self,
        runtime: &Arc<dyn IpcRuntime>,
        binding: &TransportBinding,
    ) -> Result<PluginHandle> {
        let Self {
            name,
            factory,
            module,
        } = self;

        let context = RuntimeContext {
            runtime: Arc::clone(runtime),
        };
        let args = FactoryArgs::new(binding);
        debug!(
            "Invoking {} from {} (interface {}, address {}, {} manifests)",
            PLUGIN_FACTORY_NAME,
            name,
            binding.network_interface,
            binding.ip_address,
            binding.manifests.len()
        );

        // SAFETY: factory was resolved from `module`, which is alive, and
        // `context` and `args` outlive the call.
        let raw = unsafe {
            factory(
                (&context as *const RuntimeContext).cast::<c_void>(),
                args.network_interface(),
                args.ip_address(),
                args.manifests(),
            )
        };
        // SAFETY: raw came straight from the factory and is consumed here.
        let instance = unsafe { TransportInstance::from_raw(raw, &name) }?;

        info!("Constructed transport from {}", name);
        Ok(PluginHandle {
            name,
            instance,
            _module: module,
        })
    }
}

/// A plugin module together with the transport it produced.
///
/// Fields drop in declaration order: the transport is destroyed before the
/// module is unmapped.
pub struct PluginHandle {
    name: String,
    instance: TransportInstance,
    _module: Box<dyn PluginModule>,
}

impl PluginHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn poll(&mut self) -> Result<()> {
        self.instance.poll()
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        debug!("Releasing transport and module {}", self.name);
    }
}

/// A payload transformation instance, destroyed through its bound deleter.
struct TransformationInstance {
    instance: *mut c_void,
    destroy: DestroyFn,
}

// SAFETY: the instance is only touched on drop, and plugin transformations are
// required to be `Send`.
unsafe impl Send for TransformationInstance {}

impl Drop for TransformationInstance {
    fn drop(&mut self) {
        // SAFETY: instance was created by the factory and is destroyed once.
        unsafe { (self.destroy)(self.instance) };
    }
}

/// A payload transformation together with the module it came from.
///
/// Fields drop in declaration order: the transformation is destroyed before
/// the module is unmapped.
pub struct PayloadTransformationHandle {
    name: String,
    _instance: TransformationInstance,
    _module: Box<dyn PluginModule>,
}

impl PayloadTransformationHandle {
    /// Resolve [`PAYLOAD_TRANSFORMATION_FACTORY_NAME`] in `module` and invoke it
    /// once with `runtime`.
    ///
    /// On failure the module is released before returning.
    pub fn load(module: Box<dyn PluginModule>, runtime: &Arc<dyn IpcRuntime>) -> Result<Self> {
        let name = module.describe();
        let factory = module.resolve_transformation_factory(PAYLOAD_TRANSFORMATION_FACTORY_NAME)?;
        debug!("Resolved {} in {}", PAYLOAD_TRANSFORMATION_FACTORY_NAME, name);

        let context = RuntimeContext {
            runtime: Arc::clone(runtime),
        };
        // SAFETY: factory was resolved from `module`, which is alive, and
        // `context` outlives the call.
        let raw = unsafe { factory((&context as *const RuntimeContext).cast::<c_void>()) };

        let instance = match raw {
            RawPayloadTransformation {
                instance,
                destroy: Some(destroy),
            } if !instance.is_null() => TransformationInstance { instance, destroy },
            RawPayloadTransformation { instance, .. } => {
                if !instance.is_null() {
                    warn!("Payload transformation from {} has no deleter, leaking it", name);
                }
                return Err(GatewayError::PluginConstruction {
                    module: name,
                    reason: "payload transformation factory returned an invalid instance".into(),
                });
            }
        };

        info!("Constructed payload transformation from {}", name);
        Ok(Self {
            name,
            _instance: instance,
            _module: module,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for PayloadTransformationHandle {
    fn drop(&mut self) {
        debug!("Releasing payload transformation and module {}", self.name);
    }
}
