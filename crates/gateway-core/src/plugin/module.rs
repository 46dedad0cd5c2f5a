//! Plugin module loading.
//!
//! [`PluginModule`] abstracts "a mapped code module that can resolve a
//! factory symbol". [`DynamicModule`] is the shared-library implementation.
//! Tests substitute in-process modules.

#![allow(unsafe_code)]

use super::abi::{PayloadTransformationFactoryFn, TransportFactoryFn};
use crate::error::{GatewayError, Result};
use libloading::{Library, Symbol};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A loaded code module exporting a transport factory.
///
/// Dropping the module unmaps its code. Any transport created from it must
/// be destroyed first.
pub trait PluginModule: Send {
    /// Human-readable identity used in logs and errors.
    fn describe(&self) -> String;

    /// Resolve the transport factory symbol.
    ///
    /// The returned function pointer is only valid while `self` is alive.
    fn resolve_factory(&self, symbol: &str) -> Result<TransportFactoryFn>;

    /// Resolve the payload transformation factory symbol.
    ///
    /// Modules that only carry a transport keep the default.
    fn resolve_transformation_factory(
        &self,
        symbol: &str,
    ) -> Result<PayloadTransformationFactoryFn> {
        Err(GatewayError::SymbolResolution {
            module: self.describe(),
            symbol: symbol.to_string(),
            message: "module exports no payload transformation".into(),
        })
    }
}

/// A shared library opened with the platform loader.
pub struct DynamicModule {
    path: PathBuf,
    library: Library,
}

impl DynamicModule {
    /// Map the shared library at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening plugin module {}", path.display());

        // SAFETY: loading a library runs its initializers. The gateway trusts
        // the plugin it was pointed at.
        let library = unsafe { Library::new(path) }.map_err(|e| GatewayError::PluginLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        info!("Loaded plugin module {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PluginModule for DynamicModule {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn resolve_factory(&self, symbol: &str) -> Result<TransportFactoryFn> {
        // SAFETY: the symbol type is fixed by the plugin ABI.
        let factory: Symbol<TransportFactoryFn> = unsafe { self.library.get(symbol.as_bytes()) }
            .map_err(|e| GatewayError::SymbolResolution {
                module: self.describe(),
                symbol: symbol.to_string(),
                message: e.to_string(),
            })?;
        Ok(*factory)
    }

    fn resolve_transformation_factory(
        &self,
        symbol: &str,
    ) -> Result<PayloadTransformationFactoryFn> {
        // SAFETY: the symbol type is fixed by the plugin ABI.
        let factory: Symbol<PayloadTransformationFactoryFn> =
            unsafe { self.library.get(symbol.as_bytes()) }.map_err(|e| {
                GatewayError::SymbolResolution {
                    module: self.describe(),
                    symbol: symbol.to_string(),
                    message: e.to_string(),
                }
            })?;
        Ok(*factory)
    }
}

impl Drop for DynamicModule {
    fn drop(&mut self) {
        debug!("Unloading plugin module {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_missing_library() {
        let err = DynamicModule::open("/nonexistent/libtransport.so")
            .err()
            .expect("open should fail");
        match err {
            GatewayError::PluginLoad { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/libtransport.so"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_open_invalid_library() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"definitely not an ELF image").unwrap();

        let err = DynamicModule::open(file.path()).err().expect("open should fail");
        assert!(matches!(err, GatewayError::PluginLoad { .. }));
        assert_eq!(err.exit_code(), 2);
    }
}
