//! IPC test client - sends or receives samples to verify the gateway.
//!
//! Runs on a single-threaded runtime so a role is never interleaved with
//! another role between its wake-up and its drain.
//!
//! The runtime is the process-local `LocalRuntime`: `send` and `recv` only
//! meet peers in the same process, so on their own they are useful as smoke
//! tests of one role. `loopback` runs a complete exchange.

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use gateway_core::{
    CycleBudget, GatewayError, InstanceSpecifier, IpcRuntime, LocalRuntime, ReceptionTally,
    SampleReceiver, SampleSender, SequenceProducer, DEFAULT_INSTANCE_SPECIFIER,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Offer the service and publish samples (no receiver in this process)
    Send,
    /// Subscribe and verify samples; waits forever without a sender in this process
    Recv,
    /// Sender and receiver on one runtime
    Loopback,
}

#[derive(Parser, Debug)]
#[command(name = "ipc-test-client")]
#[command(about = "Send or receive samples over the IPC runtime")]
#[command(
    long_about = "Send or receive samples over the process-local IPC runtime. \
                  Only `loopback` pairs a sender with a receiver; `send` and `recv` \
                  exercise one role in isolation."
)]
struct Args {
    /// Role to run
    #[arg(short, long, value_enum)]
    mode: Mode,

    /// Service instance to offer or subscribe to
    #[arg(short = 's', long, default_value = DEFAULT_INSTANCE_SPECIFIER)]
    instance_specifier: String,

    /// Sender period / receiver polling period in ms; the receiver waits for
    /// notifications when absent
    #[arg(short = 't', long)]
    cycle_time_ms: Option<u64>,

    /// Samples to send or receive, 0 = until interrupted
    #[arg(short, long, default_value_t = 0)]
    num_cycles: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn budget(&self) -> CycleBudget {
        CycleBudget {
            cadence: self.cycle_time_ms.map(Duration::from_millis),
            cycles: self.num_cycles,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
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

    let outcome = tokio::select! {
        result = run(&args) => Outcome::Finished(result),
        _ = tokio::signal::ctrl_c() => Outcome::Interrupted,
    };

    match &outcome {
        Outcome::Finished(Ok(())) => {}
        Outcome::Finished(Err(e)) => error!("{:#}", e),
        Outcome::Interrupted => warn!("Interrupted before {:?} finished its cycles", args.mode),
    }
    ExitCode::from(outcome.exit_code())
}

/// Exit status when Ctrl-C ends a role before its cycle budget is done.
const INTERRUPTED_EXIT_CODE: u8 = 130;

enum Outcome {
    Finished(Result<()>),
    Interrupted,
}

impl Outcome {
    fn exit_code(&self) -> u8 {
        match self {
            Outcome::Finished(Ok(())) => 0,
            Outcome::Finished(Err(e)) => exit_code(e),
            Outcome::Interrupted => INTERRUPTED_EXIT_CODE,
        }
    }
}

async fn run(args: &Args) -> Result<()> {
    let specifier = InstanceSpecifier::new(args.instance_specifier.as_str())?;
    let runtime: Arc<dyn IpcRuntime> = Arc::new(LocalRuntime::new());
    let budget = args.budget();

    match args.mode {
        Mode::Send => {
            let mut sender = SampleSender::new(runtime, specifier, SequenceProducer::new());
            let sent = sender.run(budget).await?;
            info!("Sent {} samples", sent);
        }
        Mode::Recv => {
            let receiver = SampleReceiver::new(runtime, specifier);
            report(&receiver.run(budget).await?);
        }
        Mode::Loopback => {
            let receiver = SampleReceiver::new(Arc::clone(&runtime), specifier.clone());
            let mut sender = SampleSender::new(runtime, specifier, SequenceProducer::new());
            let sender_budget = CycleBudget {
                cadence: budget.cadence,
                cycles: 0,
            };

            tokio::select! {
                tally = receiver.run(budget) => report(&tally?),
                sent = sender.run(sender_budget) => {
                    let sent = sent?;
                    return Err(anyhow!("sender stopped after {} samples before the receiver finished", sent));
                }
            }
        }
    }

    Ok(())
}

fn report(tally: &ReceptionTally) {
    info!(
        "Received {} valid samples, rejected {} (last sequence {:?})",
        tally.accepted, tally.rejected, tally.last_accepted
    );
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<GatewayError>()
        .map(GatewayError::exit_code)
        .unwrap_or(1)
}
