//! Error types for the gateway and the sample-exchange roles.
//!
//! Every fatal condition surfaces as a single [`GatewayError`] value at the
//! role entry point. Binaries turn it into a process exit code with
//! [`GatewayError::exit_code`].

use crate::ipc::RuntimeError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gateway-core.
#[derive(Debug, Error)]
pub enum GatewayError {
    // Plugin setup errors
    #[error("Failed to load plugin module {path:?}: {message}")]
    PluginLoad { path: PathBuf, message: String },

    #[error("Plugin module {module} does not export `{symbol}`: {message}")]
    SymbolResolution {
        module: String,
        symbol: String,
        message: String,
    },

    #[error("Plugin factory in {module} returned an invalid transport instance: {reason}")]
    PluginConstruction { module: String, reason: String },

    #[error("Transport plugin panicked during poll")]
    PluginPanicked,

    // Discovery errors
    #[error("Service discovery for {specifier} failed: {source}")]
    DiscoveryQuery {
        specifier: String,
        #[source]
        source: RuntimeError,
    },

    #[error("No provider for {specifier} found after {attempts} attempts")]
    DiscoveryExhausted { specifier: String, attempts: u32 },

    // Proxy / skeleton errors
    #[error("Unable to construct proxy for {specifier}: {source}")]
    ProxyConstruction {
        specifier: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Unable to subscribe to {specifier}: {source}")]
    Subscription {
        specifier: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Unable to construct skeleton for {specifier}: {source}")]
    SkeletonConstruction {
        specifier: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Unable to offer service {specifier}: {source}")]
    Offer {
        specifier: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Failed to send sample {sequence} on {specifier}: {source}")]
    SendFailed {
        specifier: String,
        sequence: u32,
        #[source]
        source: RuntimeError,
    },

    // Reception errors
    #[error("{specifier}: error in cycle {cycle} during sample reception: {violation}")]
    ReceptionConsistency {
        specifier: String,
        cycle: usize,
        violation: ConsistencyViolation,
    },

    #[error("No sample produced for cycle {cycle} on {specifier}")]
    SampleExhausted { specifier: String, cycle: usize },

    // Configuration errors
    #[error("Invalid instance specifier '{value}': {reason}")]
    InvalidSpecifier { value: String, reason: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Why a reception cycle was declared inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyViolation {
    #[error("{0}")]
    Api(RuntimeError),

    #[error("number of received samples doesn't match to what IPC claims: {reported} vs {accepted}")]
    CountMismatch { reported: usize, accepted: usize },

    #[error(
        "expected at least one new sample, since event-notifier has been called, \
         but no new sample was provided"
    )]
    NotifiedWithoutSamples,
}

/// A sample that arrived with a sequence not above the last accepted one.
///
/// Record-level only: the sample is rejected and logged. The drain that
/// carried it then fails reconciliation, since it was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("The received sample is out of order. Expected that {sequence} > {last_accepted}")]
pub struct OutOfOrderSample {
    pub sequence: u32,
    pub last_accepted: u32,
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        GatewayError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Convert to a process exit code.
    ///
    /// - 2: plugin load / symbol / construction failure
    /// - 3: plugin panicked during poll
    /// - 4: service discovery failure
    /// - 5: proxy, skeleton, subscribe, offer or send failure
    /// - 6: reception consistency violation
    /// - 7: sample production exhausted
    /// - 8: configuration, IO or JSON error
    pub fn exit_code(&self) -> u8 {
        match self {
            GatewayError::PluginLoad { .. }
            | GatewayError::SymbolResolution { .. }
            | GatewayError::PluginConstruction { .. } => 2,

            GatewayError::PluginPanicked => 3,

            GatewayError::DiscoveryQuery { .. } | GatewayError::DiscoveryExhausted { .. } => 4,

            GatewayError::ProxyConstruction { .. }
            | GatewayError::Subscription { .. }
            | GatewayError::SkeletonConstruction { .. }
            | GatewayError::Offer { .. }
            | GatewayError::SendFailed { .. } => 5,

            GatewayError::ReceptionConsistency { .. } => 6,

            GatewayError::SampleExhausted { .. } => 7,

            GatewayError::InvalidSpecifier { .. }
            | GatewayError::Config { .. }
            | GatewayError::Io { .. }
            | GatewayError::Json { .. } => 8,
        }
    }

    /// Whether this error happened while setting up the plugin, before any
    /// transport instance existed.
    pub fn is_plugin_setup(&self) -> bool {
        matches!(
            self,
            GatewayError::PluginLoad { .. }
                | GatewayError::SymbolResolution { .. }
                | GatewayError::PluginConstruction { .. }
        )
    }
}
