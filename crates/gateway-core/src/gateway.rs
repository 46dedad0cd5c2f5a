//! The gateway: one IPC runtime bridged to one transport plugin.
//!
//! # Lifecycle
//!
//! 1. Map the plugin module and resolve its factory
//! 2. Bring up the IPC runtime
//! 3. Invoke the factory once to construct the transport
//! 4. Optionally load payload transformation plugins against the same runtime
//! 5. Poll the transport at a fixed cadence
//! 6. Tear down: transformations, transport, transport module, then runtime

use crate::error::Result;
use crate::ipc::{IpcRuntime, LocalRuntime};
use crate::plugin::{
    DynamicModule, PayloadTransformationHandle, PluginHandle, PluginModule, ResolvedPlugin,
    TransportBinding,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A running gateway.
///
/// Fields drop in declaration order, so every plugin is released before the
/// runtime it was bound to.
pub struct Gateway {
    transformations: Vec<PayloadTransformationHandle>,
    plugin: PluginHandle,
    runtime: Arc<dyn IpcRuntime>,
}

impl Gateway {
    /// Build a gateway from a plugin shared library.
    ///
    /// The module is mapped and its factory resolved before the runtime is
    /// created, so a bad plugin never brings up a runtime.
    pub fn create(
        plugin_path: impl AsRef<Path>,
        network_interface: &str,
        ip_address: &str,
        manifests: &[PathBuf],
    ) -> Result<Self> {
        let module = DynamicModule::open(plugin_path)?;
        let resolved = ResolvedPlugin::resolve(Box::new(module))?;
        let runtime: Arc<dyn IpcRuntime> = Arc::new(LocalRuntime::new());
        let binding = TransportBinding {
            network_interface: network_interface.to_string(),
            ip_address: ip_address.to_string(),
            manifests: manifests.to_vec(),
        };
        Self::instantiate(resolved, runtime, &binding)
    }

    /// Build a gateway from an already mapped module and a runtime.
    pub fn with_module(
        module: Box<dyn PluginModule>,
        runtime: Arc<dyn IpcRuntime>,
        binding: TransportBinding,
    ) -> Result<Self> {
        let resolved = ResolvedPlugin::resolve(module)?;
        Self::instantiate(resolved, runtime, &binding)
    }

    fn instantiate(
        resolved: ResolvedPlugin,
        runtime: Arc<dyn IpcRuntime>,
        binding: &TransportBinding,
    ) -> Result<Self> {
        let plugin = resolved.instantiate(&runtime, binding)?;
        info!("Gateway ready with transport {}", plugin.name());
        Ok(Self {
            transformations: Vec::new(),
            plugin,
            runtime,
        })
    }

    /// The runtime the transport is bound to.
    pub fn runtime(&self) -> &Arc<dyn IpcRuntime> {
        &self.runtime
    }

    /// Map a payload transformation plugin and bind it to the gateway runtime.
    pub fn load_transformation(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let module = DynamicModule::open(path)?;
        self.add_transformation(Box::new(module))
    }

    /// Bind the payload transformation exported by an already mapped module.
    pub fn add_transformation(&mut self, module: Box<dyn PluginModule>) -> Result<()> {
        let transformation = PayloadTransformationHandle::load(module, &self.runtime)?;
        info!("Gateway bound payload transformation {}", transformation.name());
        self.transformations.push(transformation);
        Ok(())
    }

    pub fn transformation_count(&self) -> usize {
        self.transformations.len()
    }

    /// Poll the transport once every `cycle_time`, `num_cycles` times.
    ///
    /// `num_cycles == 0` polls until the future is dropped. Returns the number
    /// of completed polls. A transport panic ends the loop with
    /// [`GatewayError::PluginPanicked`](crate::error::GatewayError::PluginPanicked).
    pub async fn run(&mut self, cycle_time: Duration, num_cycles: usize) -> Result<u64> {
        let mut polls: u64 = 0;
        info!(
            "Polling transport every {:?} ({})",
            cycle_time,
            if num_cycles == 0 {
                "until stopped".to_string()
            } else {
                format!("{} cycles", num_cycles)
            }
        );

        while num_cycles == 0 || polls < num_cycles as u64 {
            tokio::time::sleep(cycle_time).await;
            self.plugin.poll()?;
            polls += 1;
        }

        debug!("Completed {} transport polls", polls);
        Ok(polls)
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        debug!(
            "Shutting down gateway: {} transformations, transport {}",
            self.transformations.len(),
            self.plugin.name()
        );
    }
}
