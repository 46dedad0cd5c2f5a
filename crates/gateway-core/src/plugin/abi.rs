//! C ABI shared by the gateway host and its plugins.
//!
//! Two plugin contracts exist:
//!
//! - A transport plugin exports [`PLUGIN_FACTORY_NAME`] with the
//!   [`TransportFactoryFn`] signature. The host calls it exactly once and gets
//!   back a [`RawTransport`]: an opaque instance pointer plus `poll` and
//!   `destroy` entry points.
//! - A payload transformation plugin exports
//!   [`PAYLOAD_TRANSFORMATION_FACTORY_NAME`] with the
//!   [`PayloadTransformationFactoryFn`] signature. It only receives the
//!   runtime and hands back a [`RawPayloadTransformation`] with its bound
//!   `destroy`.
//!
//! Plugin authors should not write factories by hand;
//! [`export_plugin!`](crate::export_plugin) generates them from safe Rust
//! constructors.
//!
//! The runtime reference passed to a factory is a pointer to a
//! [`RuntimeContext`], so host and plugin must be built against the same
//! version of this crate with the same compiler.

#![allow(unsafe_code)]

use crate::ipc::IpcRuntime;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the factory symbol every transport plugin exports.
pub const PLUGIN_FACTORY_NAME: &str = "create_plugin";

/// Name of the factory symbol a payload transformation plugin exports.
pub const PAYLOAD_TRANSFORMATION_FACTORY_NAME: &str = "create_payload_transformation";

/// Borrowed UTF-8 string.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl RawStr {
    pub fn borrowed(value: &str) -> Self {
        Self {
            ptr: value.as_ptr(),
            len: value.len(),
        }
    }

    /// Copy into an owned string, replacing invalid UTF-8.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to `len` readable bytes.
    pub unsafe fn to_string_lossy(&self) -> String {
        if self.ptr.is_null() || self.len == 0 {
            return String::new();
        }
        // SAFETY: guaranteed by the caller.
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Borrowed list of [`RawStr`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawStrList {
    pub ptr: *const RawStr,
    pub len: usize,
}

impl RawStrList {
    pub fn borrowed(items: &[RawStr]) -> Self {
        Self {
            ptr: items.as_ptr(),
            len: items.len(),
        }
    }

    /// # Safety
    ///
    /// `ptr` must be null or point to `len` valid [`RawStr`] values, each
    /// satisfying the contract of [`RawStr::to_string_lossy`].
    pub unsafe fn to_vec(&self) -> Vec<String> {
        if self.ptr.is_null() || self.len == 0 {
            return Vec::new();
        }
        // SAFETY: guaranteed by the caller.
        let items = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
        items
            .iter()
            // SAFETY: each item is valid per the caller contract.
            .map(|item| unsafe { item.to_string_lossy() })
            .collect()
    }
}

/// Outcome of one `poll` call.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollStatus(pub u32);

impl PollStatus {
    pub const OK: PollStatus = PollStatus(0);
    /// The transport panicked; the panic was caught at the ABI boundary.
    pub const PANICKED: PollStatus = PollStatus(1);
}

pub type PollFn = unsafe extern "C" fn(instance: *mut c_void) -> PollStatus;
pub type DestroyFn = unsafe extern "C" fn(instance: *mut c_void);

/// Transport instance as returned by the plugin factory.
///
/// A null `instance` means construction failed.
#[repr(C)]
#[derive(Debug)]
pub struct RawTransport {
    pub instance: *mut c_void,
    pub poll: Option<PollFn>,
    pub destroy: Option<DestroyFn>,
}

impl RawTransport {
    pub const fn null() -> Self {
        Self {
            instance: std::ptr::null_mut(),
            poll: None,
            destroy: None,
        }
    }
}

/// Signature of [`PLUGIN_FACTORY_NAME`].
///
/// `runtime` points to a [`RuntimeContext`] that is only valid for the
/// duration of the call.
pub type TransportFactoryFn = unsafe extern "C" fn(
    runtime: *const c_void,
    network_interface: RawStr,
    ip_address: RawStr,
    manifests: RawStrList,
) -> RawTransport;

/// Payload transformation instance as returned by its factory.
///
/// A null `instance` or a missing `destroy` means construction failed.
#[repr(C)]
#[derive(Debug)]
pub struct RawPayloadTransformation {
    pub instance: *mut c_void,
    pub destroy: Option<DestroyFn>,
}

impl RawPayloadTransformation {
    pub const fn null() -> Self {
        Self {
            instance: std::ptr::null_mut(),
            destroy: None,
        }
    }
}

/// Signature of [`PAYLOAD_TRANSFORMATION_FACTORY_NAME`].
///
/// `runtime` points to a [`RuntimeContext`] valid for the duration of the call.
pub type PayloadTransformationFactoryFn =
    unsafe extern "C" fn(runtime: *const c_void) -> RawPayloadTransformation;

/// What a factory's `runtime` pointer refers to.
pub struct RuntimeContext {
    pub runtime: Arc<dyn IpcRuntime>,
}

/// Host-side transport configuration handed to the plugin factory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportBinding {
    pub network_interface: String,
    pub ip_address: String,
    pub manifests: Vec<PathBuf>,
}

/// Owns the marshaled factory arguments while the factory runs.
pub(crate) struct FactoryArgs {
    network_interface: String,
    ip_address: String,
    manifests: Vec<String>,
    manifest_refs: Vec<RawStr>,
}

impl FactoryArgs {
    pub(crate) fn new(binding: &TransportBinding) -> Self {
        let manifests: Vec<String> = binding
            .manifests
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        let manifest_refs = manifests.iter().map(|m| RawStr::borrowed(m)).collect();
        Self {
            network_interface: binding.network_interface.clone(),
            ip_address: binding.ip_address.clone(),
            manifests,
            manifest_refs,
        }
    }

    pub(crate) fn network_interface(&self) -> RawStr {
        RawStr::borrowed(&self.network_interface)
    }

    pub(crate) fn ip_address(&self) -> RawStr {
        RawStr::borrowed(&self.ip_address)
    }

    pub(crate) fn manifests(&self) -> RawStrList {
        debug_assert_eq!(self.manifests.len(), self.manifest_refs.len());
        RawStrList::borrowed(&self.manifest_refs)
    }
}

/// Everything a transport needs at construction, as seen by the plugin.
#[derive(Clone)]
pub struct PluginBinding {
    pub runtime: Arc<dyn IpcRuntime>,
    pub network_interface: String,
    pub ip_address: String,
    pub manifests: Vec<PathBuf>,
}

/// A transport implementation living inside a plugin module.
pub trait TransportPlugin: Send {
    /// Run one slice of transport work. Must not block.
    fn poll(&mut self);
}

/// A payload transformation living inside a plugin module.
///
/// The contract has no operations of its own yet. The host owns the instance
/// for as long as the gateway runs and releases it before the module and the
/// runtime go away.
pub trait PayloadTransformationPlugin: Send {}

/// Borrow the runtime behind a factory's `runtime` pointer.
///
/// # Safety
///
/// `runtime` must be null or point to a live [`RuntimeContext`].
unsafe fn runtime_from_context(runtime: *const c_void) -> Option<Arc<dyn IpcRuntime>> {
    if runtime.is_null() {
        return None;
    }
    // SAFETY: the host passes a RuntimeContext that outlives this call.
    let context = unsafe { &*runtime.cast::<RuntimeContext>() };
    Some(Arc::clone(&context.runtime))
}

/// Body of the generated transport factory. Use [`export_plugin!`](crate::export_plugin).
///
/// # Safety
///
/// `runtime` must be null or point to a live [`RuntimeContext`]. The string
/// arguments must satisfy the contracts of [`RawStr`] and [`RawStrList`].
#[doc(hidden)]
pub unsafe fn export_transport<T, F>(
    runtime: *const c_void,
    network_interface: RawStr,
    ip_address: RawStr,
    manifests: RawStrList,
    factory: F,
) -> RawTransport
where
    T: TransportPlugin + 'static,
    F: FnOnce(PluginBinding) -> Option<T>,
{
    // SAFETY: the runtime contract is upheld by the caller.
    let Some(runtime) = (unsafe { runtime_from_context(runtime) }) else {
        return RawTransport::null();
    };
    // SAFETY: string contracts are upheld by the caller.
    let binding = unsafe {
        PluginBinding {
            runtime,
            network_interface: network_interface.to_string_lossy(),
            ip_address: ip_address.to_string_lossy(),
            manifests: manifests.to_vec().into_iter().map(PathBuf::from).collect(),
        }
    };

    match panic::catch_unwind(AssertUnwindSafe(|| factory(binding))) {
        Ok(Some(transport)) => RawTransport {
            instance: Box::into_raw(Box::new(transport)).cast::<c_void>(),
            poll: Some(poll_transport::<T>),
            destroy: Some(destroy_boxed::<T>),
        },
        Ok(None) | Err(_) => RawTransport::null(),
    }
}

/// Body of the generated payload transformation factory. Use
/// [`export_plugin!`](crate::export_plugin).
///
/// # Safety
///
/// `runtime` must be null or point to a live [`RuntimeContext`].
#[doc(hidden)]
pub unsafe fn export_payload_transformation<T, F>(
    runtime: *const c_void,
    factory: F,
) -> RawPayloadTransformation
where
    T: PayloadTransformationPlugin + 'static,
    F: FnOnce(Arc<dyn IpcRuntime>) -> Option<T>,
{
    // SAFETY: the runtime contract is upheld by the caller.
    let Some(runtime) = (unsafe { runtime_from_context(runtime) }) else {
        return RawPayloadTransformation::null();
    };

    match panic::catch_unwind(AssertUnwindSafe(|| factory(runtime))) {
        Ok(Some(transformation)) => RawPayloadTransformation {
            instance: Box::into_raw(Box::new(transformation)).cast::<c_void>(),
            destroy: Some(destroy_boxed::<T>),
        },
        Ok(None) | Err(_) => RawPayloadTransformation::null(),
    }
}

unsafe extern "C" fn poll_transport<T: TransportPlugin>(instance: *mut c_void) -> PollStatus {
    if instance.is_null() {
        return PollStatus::PANICKED;
    }
    // SAFETY: instance came from Box::into_raw::<T> in export_transport and
    // the host holds it exclusively.
    let transport = unsafe { &mut *instance.cast::<T>() };
    match panic::catch_unwind(AssertUnwindSafe(|| transport.poll())) {
        Ok(()) => PollStatus::OK,
        Err(_) => PollStatus::PANICKED,
    }
}

unsafe extern "C" fn destroy_boxed<T>(instance: *mut c_void) {
    if instance.is_null() {
        return;
    }
    // SAFETY: instance came from Box::into_raw::<T> and is destroyed once.
    let transport = unsafe { Box::from_raw(instance.cast::<T>()) };
    let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(transport)));
}

/// Export a plugin factory from a safe constructor.
///
/// - `transport: f` where `f: fn(PluginBinding) -> Option<T>` and
///   `T: TransportPlugin` exports [`PLUGIN_FACTORY_NAME`].
/// - `payload_transformation: f` where `f: fn(Arc<dyn IpcRuntime>) -> Option<T>`
///   and `T: PayloadTransformationPlugin` exports
///   [`PAYLOAD_TRANSFORMATION_FACTORY_NAME`].
///
/// Returning `None` reports a construction failure to the host. A module may
/// export both.
///
/// ```ignore
/// fn create(binding: PluginBinding) -> Option<MyTransport> {
///     MyTransport::connect(binding).ok()
/// }
/// gateway_core::export_plugin!(transport: create);
/// ```
#[macro_export]
macro_rules! export_plugin {
    (transport: $factory:path) => {
        #[allow(unsafe_code)]
        #[no_mangle]
        pub unsafe extern "C" fn create_plugin(
            runtime: *const ::std::ffi::c_void,
            network_interface: $crate::plugin::abi::RawStr,
            ip_address: $crate::plugin::abi::RawStr,
            manifests: $crate::plugin::abi::RawStrList,
        ) -> $crate::plugin::abi::RawTransport {
            // SAFETY: arguments follow the factory contract upheld by the host.
            unsafe {
                $crate::plugin::abi::export_transport(
                    runtime,
                    network_interface,
                    ip_address,
                    manifests,
                    $factory,
                )
            }
        }
    };
    (payload_transformation: $factory:path) => {
        #[allow(unsafe_code)]
        #[no_mangle]
        pub unsafe extern "C" fn create_payload_transformation(
            runtime: *const ::std::ffi::c_void,
        ) -> $crate::plugin::abi::RawPayloadTransformation {
            // SAFETY: the runtime pointer follows the factory contract upheld by the host.
            unsafe { $crate::plugin::abi::export_payload_transformation(runtime, $factory) }
        }
    };
}
