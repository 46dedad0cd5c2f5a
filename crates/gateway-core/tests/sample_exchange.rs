//! Sender and receiver exchanging samples over one local runtime.

use gateway_core::{
    ConsistencyViolation, CycleBudget, GatewayError, InstanceSpecifier, IpcRuntime, LocalRuntime,
    ReceptionTally, SampleReceiver, SampleSender, ScriptedProducer, SequenceProducer,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const SENDER_CYCLE: Duration = Duration::from_millis(10);

fn spec() -> InstanceSpecifier {
    InstanceSpecifier::new("gateway/ipc_bridge/map_api_lanes_stamped").unwrap()
}

/// Fail instead of hanging if a role never finishes.
async fn bounded<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("exchange did not finish")
}

async fn exchange(
    sequences: Vec<u32>,
    receiver_budget: CycleBudget,
) -> (gateway_core::Result<ReceptionTally>, gateway_core::Result<usize>) {
    let local = LocalRuntime::new();
    let runtime: Arc<dyn IpcRuntime> = Arc::new(local.clone());

    let receiver = SampleReceiver::new(Arc::clone(&runtime), spec());
    let cycles = sequences.len();
    let mut sender = SampleSender::new(runtime, spec(), ScriptedProducer::new(sequences));

    let outcome = bounded(async {
        tokio::join!(
            receiver.run(receiver_budget),
            sender.run(CycleBudget::every(SENDER_CYCLE, cycles))
        )
    })
    .await;

    assert_eq!(local.provider_count(&spec()), 0, "offer must be withdrawn");
    assert_eq!(local.subscription_count(), 0, "subscription must be released");
    outcome
}

#[tokio::test(start_paused = true)]
async fn test_in_order_samples_push_mode() {
    let (received, sent) = exchange(vec![1, 2, 3], CycleBudget::event_driven(3)).await;

    assert_eq!(sent.unwrap(), 3);
    let tally = received.unwrap();
    assert_eq!(tally.accepted, 3);
    assert_eq!(tally.rejected, 0);
    assert_eq!(tally.last_accepted, Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_in_order_samples_polling_mode() {
    let (received, sent) = exchange(
        vec![1, 2, 3],
        CycleBudget::every(Duration::from_millis(5), 3),
    )
    .await;

    assert_eq!(sent.unwrap(), 3);
    let tally = received.unwrap();
    assert_eq!(tally.accepted, 3);
    assert_eq!(tally.last_accepted, Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_out_of_order_sample_fails_reconciliation() {
    let (received, sent) = exchange(vec![1, 3, 2], CycleBudget::event_driven(3)).await;

    assert_eq!(sent.unwrap(), 3);
    let err = received.unwrap_err();
    match &err {
        GatewayError::ReceptionConsistency {
            violation: ConsistencyViolation::CountMismatch { reported, accepted },
            ..
        } => assert_eq!(*reported, accepted + 1),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_receiver_waits_for_late_sender() {
    let local = LocalRuntime::new();
    let runtime: Arc<dyn IpcRuntime> = Arc::new(local.clone());

    let receiver = SampleReceiver::new(Arc::clone(&runtime), spec());
    let mut sender = SampleSender::new(runtime, spec(), SequenceProducer::new());

    let late_sender = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        sender.run(CycleBudget::every(SENDER_CYCLE, 2)).await
    };

    let (received, sent) = bounded(async {
        tokio::join!(receiver.run(CycleBudget::event_driven(2)), late_sender)
    })
    .await;

    assert_eq!(sent.unwrap(), 2);
    assert_eq!(received.unwrap().accepted, 2);
}

#[tokio::test(start_paused = true)]
async fn test_sender_fails_when_producer_runs_dry() {
    let runtime: Arc<dyn IpcRuntime> = Arc::new(LocalRuntime::new());
    let mut sender = SampleSender::new(runtime, spec(), ScriptedProducer::new([1]));

    let err = sender
        .run(CycleBudget::every(SENDER_CYCLE, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::SampleExhausted { cycle: 1, .. }));
}
