//! Gateway daemon - bridges the local IPC runtime to a transport plugin.
//!
//! Settings come from an optional JSON file and are overridden by flags.
//! The process exit code reflects the failure category, see
//! [`GatewayError::exit_code`].

use anyhow::{Context, Result};
use clap::Parser;
use gateway_core::{Gateway, GatewayError, GatewaySettings};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "someip-gateway")]
#[command(about = "Load a transport plugin and bridge it to the local IPC runtime")]
struct Args {
    /// Transport plugin shared library
    #[arg(long)]
    plugin: Option<PathBuf>,

    /// Network interface the transport binds to [default: lo]
    #[arg(long)]
    network_interface: Option<String>,

    /// IP address the transport binds to [default: 127.0.0.1]
    #[arg(long)]
    ip_address: Option<String>,

    /// Transport manifest passed to the plugin (repeatable)
    #[arg(long = "manifest")]
    manifests: Vec<PathBuf>,

    /// Payload transformation plugin bound to the runtime (repeatable)
    #[arg(long = "transformation")]
    transformations: Vec<PathBuf>,

    /// Poll period in milliseconds [default: 10]
    #[arg(long)]
    cycle_time_ms: Option<u64>,

    /// Number of polls, 0 = until interrupted [default: 0]
    #[arg(long)]
    num_cycles: Option<usize>,

    /// JSON settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    /// Settings file (or defaults) with flags applied on top.
    fn settings(&self) -> gateway_core::Result<GatewaySettings> {
        let mut settings = match &self.config {
            Some(path) => GatewaySettings::load(path)?,
            None => GatewaySettings::default(),
        };

        if let Some(plugin) = &self.plugin {
            settings.plugin = Some(plugin.clone());
        }
        if let Some(network_interface) = &self.network_interface {
            settings.network_interface = network_interface.clone();
        }
        if let Some(ip_address) = &self.ip_address {
            settings.ip_address = ip_address.clone();
        }
        if !self.manifests.is_empty() {
            settings.manifests = self.manifests.clone();
        }
        if !self.transformations.is_empty() {
            settings.transformations = self.transformations.clone();
        }
        if let Some(cycle_time_ms) = self.cycle_time_ms {
            settings.cycle_time_ms = cycle_time_ms;
        }
        if let Some(num_cycles) = self.num_cycles {
            settings.num_cycles = num_cycles;
        }

        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = args.settings()?;
    settings.validate()?;

    let plugin = settings.plugin.clone().ok_or_else(|| GatewayError::Config {
        message: "no transport plugin configured".into(),
    })?;
    info!(
        "Starting gateway with {} on {} ({})",
        plugin.display(),
        settings.network_interface,
        settings.ip_address
    );

    let mut gateway = Gateway::create(
        &plugin,
        &settings.network_interface,
        &settings.ip_address,
        &settings.manifests,
    )
    .with_context(|| format!("Unable to start gateway with {}", plugin.display()))?;

    for transformation in &settings.transformations {
        gateway
            .load_transformation(transformation)
            .with_context(|| {
                format!(
                    "Unable to load payload transformation {}",
                    transformation.display()
                )
            })?;
    }

    tokio::select! {
        result = gateway.run(settings.cycle_time(), settings.num_cycles) => {
            let polls = result?;
            info!("Transport polled {} times", polls);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping gateway");
        }
    }

    drop(gateway);
    info!("Gateway stopped");
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<GatewayError>()
        .map(GatewayError::exit_code)
        .unwrap_or(1)
}
