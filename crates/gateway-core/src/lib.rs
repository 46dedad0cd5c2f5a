//! Gateway Core - dynamic transport-plugin gateway for a local pub/sub IPC runtime.
//!
//! A [`Gateway`] maps a transport plugin (a shared library exporting
//! `create_plugin`), hands it an IPC runtime plus its network binding, and
//! drives the resulting transport's `poll()` at a fixed cadence. The
//! [`client`] roles exercise the same runtime from the application side: a
//! [`SampleSender`] offers a service and publishes, a [`SampleReceiver`]
//! subscribes and verifies ordering and sample accounting.
//!
//! # Example
//!
//! ```rust,ignore
//! use gateway_core::{Gateway, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> gateway_core::Result<()> {
//!     let mut gateway = Gateway::create(
//!         "/opt/gateway/libsomeip_transport.so",
//!         "eth0",
//!         "192.168.1.10",
//!         &["/etc/gateway/someip.json".into()],
//!     )?;
//!
//!     // Poll every 10 ms until stopped
//!     gateway.run(GatewayConfig::DEFAULT_CYCLE_TIME, 0).await?;
//!     Ok(())
//! }
//! ```
//!
//! Plugin authors implement [`TransportPlugin`] (or
//! [`PayloadTransformationPlugin`]) and export it with [`export_plugin!`].

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod ipc;
pub mod plugin;
pub mod settings;

// Re-export commonly used types
pub use client::{
    ReceptionTally, SampleProducer, SampleReceiver, SampleSender, ScriptedProducer,
    SequenceProducer,
};
pub use config::{
    CycleBudget, DiscoveryConfig, GatewayConfig, ReceiverConfig, RuntimeConfig, SenderConfig,
    DEFAULT_INSTANCE_SPECIFIER,
};
pub use discovery::{RetryConfig, ServiceLocator};
pub use error::{ConsistencyViolation, GatewayError, OutOfOrderSample, Result};
pub use gateway::Gateway;
pub use ipc::{
    EventProxy, EventSkeleton, InstanceSpecifier, IpcRuntime, LocalRuntime, RuntimeError,
    SampleRecord, ServiceHandle,
};
pub use plugin::{
    DynamicModule, PayloadTransformationHandle, PayloadTransformationPlugin, PluginBinding,
    PluginModule, TransportBinding, TransportPlugin, PAYLOAD_TRANSFORMATION_FACTORY_NAME,
    PLUGIN_FACTORY_NAME,
};
pub use settings::GatewaySettings;
