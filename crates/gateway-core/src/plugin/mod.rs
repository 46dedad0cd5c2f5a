//! Plugin hosting.
//!
//! - [`abi`]: the C ABI and the export macro for plugin authors
//! - [`module`]: mapping plugin modules and resolving factories
//! - [`handle`]: owning constructed plugin instances and their modules

pub mod abi;
pub mod handle;
pub mod module;

pub use abi::{
    PayloadTransformationFactoryFn, PayloadTransformationPlugin, PluginBinding, PollStatus,
    RawPayloadTransformation, RawTransport, TransportBinding, TransportFactoryFn, TransportPlugin,
    PAYLOAD_TRANSFORMATION_FACTORY_NAME, PLUGIN_FACTORY_NAME,
};
pub use handle::{PayloadTransformationHandle, PluginHandle, ResolvedPlugin, TransportInstance};
pub use module::{DynamicModule, PluginModule};
