//! Inference transport behavior against the in-process mock worker:
//! correlation, worker errors, protocol violations, and the
//! reconnect-with-loss contract.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use scribe_pipeline::VoiceSegment;
use scribe_transport::{InferenceClient, InferenceEvent};

use crate::fixtures::mock_worker::{MockWorker, ReplyMode};

fn segment(index: u32) -> VoiceSegment {
    VoiceSegment {
        participant_id: "speaker".into(),
        index,
        started_ts: 10.0 + index as f64,
        captured_ts: 11.0 + index as f64,
        duration_ms: 1000,
        pcm: vec![100i16; 1600],
        prompt: None,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<InferenceEvent>, wait: Duration) -> InferenceEvent {
    timeout(wait, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn wait_connected(rx: &mut mpsc::Receiver<InferenceEvent>) {
    // Generous window: a reconnect may burn a failed attempt plus the
    // fixed 3s backoff before it lands.
    loop {
        if matches!(
            next_event(rx, Duration::from_secs(15)).await,
            InferenceEvent::Connected
        ) {
            return;
        }
    }
}

#[tokio::test]
async fn transcriptions_come_back_in_send_order() {
    let worker = MockWorker::start(ReplyMode::Transcribe).await;
    let (client, mut events) = InferenceClient::connect(worker.url());
    wait_connected(&mut events).await;

    for index in 0..3 {
        client.send_segment(&segment(index));
    }

    for index in 0..3 {
        match next_event(&mut events, Duration::from_secs(5)).await {
            InferenceEvent::Transcription(t) => {
                assert_eq!(t.id, "speaker");
                assert_eq!(t.text, format!("utterance {index} from speaker"));
                assert_eq!(t.end_ts, t.capture_ts + 0.5);
            }
            other => panic!("expected transcription, got {other:?}"),
        }
    }

    client.stop();
}

#[tokio::test]
async fn worker_errors_surface_without_dropping_the_link() {
    let worker = MockWorker::start(ReplyMode::Fail).await;
    let (client, mut events) = InferenceClient::connect(worker.url());
    wait_connected(&mut events).await;

    client.send_segment(&segment(0));
    match next_event(&mut events, Duration::from_secs(5)).await {
        InferenceEvent::WorkerError(e) => {
            assert_eq!(e.code, "decode_failed");
        }
        other => panic!("expected worker error, got {other:?}"),
    }

    // The link is still up: a worker error is per-job, not fatal.
    assert!(client.is_connected());
    client.stop();
}

#[tokio::test]
async fn protocol_violation_forces_a_reconnect() {
    let worker = MockWorker::start(ReplyMode::Garbage).await;
    let (client, mut events) = InferenceClient::connect(worker.url());
    wait_connected(&mut events).await;

    client.send_segment(&segment(0));

    // The unknown message type closes the connection...
    match next_event(&mut events, Duration::from_secs(5)).await {
        InferenceEvent::Disconnected => {}
        other => panic!("expected disconnect, got {other:?}"),
    }
    // ...and the fixed backoff brings it back.
    wait_connected(&mut events).await;
    client.stop();
}

#[tokio::test]
async fn segments_sent_while_down_are_lost_not_duplicated() {
    let worker = MockWorker::start(ReplyMode::Transcribe).await;
    let port = worker.port();
    let (client, mut events) = InferenceClient::connect(worker.url());
    wait_connected(&mut events).await;

    let mut received = Vec::new();

    for index in 0..3 {
        client.send_segment(&segment(index));
    }
    for _ in 0..3 {
        if let InferenceEvent::Transcription(t) =
            next_event(&mut events, Duration::from_secs(5)).await
        {
            received.push(t.text);
        }
    }

    // Kill the worker between send 3 and send 4.
    worker.kill();
    match next_event(&mut events, Duration::from_secs(5)).await {
        InferenceEvent::Disconnected => {}
        other => panic!("expected disconnect, got {other:?}"),
    }

    // These go nowhere: the link is down and nothing is resubmitted.
    client.send_segment(&segment(3));
    client.send_segment(&segment(4));

    let revived = MockWorker::start_on(port, ReplyMode::Transcribe).await;
    wait_connected(&mut events).await;

    client.send_segment(&segment(5));
    match next_event(&mut events, Duration::from_secs(5)).await {
        InferenceEvent::Transcription(t) => received.push(t.text),
        other => panic!("expected transcription, got {other:?}"),
    }

    assert_eq!(
        received,
        vec![
            "utterance 0 from speaker",
            "utterance 1 from speaker",
            "utterance 2 from speaker",
            "utterance 5 from speaker",
        ]
    );

    client.stop();
    drop(revived);
}
