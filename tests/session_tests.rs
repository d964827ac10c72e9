use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose;
use s2s_rt::audio::memory::{self as audio_memory, CaptureFeed, PlaybackProbe};
use s2s_rt::protocol::codec::decode_audio;
use s2s_rt::session::{LoopSide, SessionEvent};
use s2s_rt::transport::memory::{self, MemoryPeer};
use s2s_rt::{
    EndReason, Error, LoopOutcome, NegotiationError, SessionConfig, SessionReport, SessionSupervisor, SpeechSession,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    peer: MemoryPeer,
    feed: CaptureFeed,
    probe: PlaybackProbe,
    run: tokio::task::JoinHandle<s2s_rt::Result<SessionReport>>,
}

/// Start a supervisor over in-memory doubles after `script` has been queued
/// on the server side.
async fn start(supervisor: SessionSupervisor, script: &[Value]) -> Harness {
    let (client, peer) = memory::channel(64);
    let (capture, feed) = audio_memory::capture(64);
    let (playback, probe) = audio_memory::playback();
    for message in script {
        peer.push_json(message).await.unwrap();
    }
    let run = tokio::spawn(supervisor.run(Box::new(client), Box::new(capture), Box::new(playback)));
    Harness { peer, feed, probe, run }
}

async fn finish(harness: &mut Harness) -> s2s_rt::Result<SessionReport> {
    tokio::time::timeout(TEST_TIMEOUT, &mut harness.run)
        .await
        .expect("session did not finish in time")
        .expect("session task panicked")
}

fn supervisor() -> SessionSupervisor {
    SessionSupervisor::new(SessionConfig::default()).with_pacing(Duration::ZERO)
}

fn created(id: &str) -> Value {
    json!({ "type": "session.created", "session": { "id": id } })
}

fn audio_delta(pcm: &[u8]) -> Value {
    json!({ "type": "response.audio.delta", "delta": general_purpose::STANDARD.encode(pcm) })
}

fn drain_sent(peer: &mut MemoryPeer) -> Vec<Value> {
    let mut sent = Vec::new();
    while let Ok(text) = peer.sent.try_recv() {
        sent.push(serde_json::from_str(&text).unwrap());
    }
    sent
}

fn assert_released_once(harness: &Harness) {
    assert_eq!(harness.feed.close_count(), 1, "capture closed once");
    assert_eq!(harness.probe.close_count(), 1, "playback closed once");
    assert_eq!(harness.peer.close_count(), 1, "channel closed once");
}

#[tokio::test]
async fn test_terminated_session_plays_audio_and_cancels_uplink() {
    let pcm = [0x10u8, 0x00, 0x20, 0x00];
    let mut harness = start(
        supervisor(),
        &[created("sess_1"), audio_delta(&pcm), json!({ "type": "session.terminated", "reason": "done" })],
    )
    .await;

    let report = finish(&mut harness).await.unwrap();
    assert_eq!(report.session_id.as_deref(), Some("sess_1"));
    assert_eq!(report.reason, EndReason::Terminated(Some("done".to_string())));
    assert_eq!(report.first, LoopSide::Downlink);
    assert_eq!(report.uplink, LoopOutcome::Cancelled);
    assert!(report.ended_by_service());
    assert_eq!(harness.probe.writes(), vec![pcm.to_vec()]);
    assert_released_once(&harness);
}

#[tokio::test]
async fn test_rejected_negotiation_never_starts_loops() {
    let mut harness = start(supervisor(), &[json!({ "type": "error", "message": "bad config" })]).await;
    // May race with the capture being released; either way nothing is streamed.
    let _ = harness.feed.frame(vec![1u8; 8]).await;

    let err = finish(&mut harness).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Negotiation(NegotiationError::Rejected { ref message }) if message == "bad config"
    ));
    assert!(err.to_string().contains("bad config"));

    let sent = drain_sent(&mut harness.peer);
    assert_eq!(sent.len(), 1, "only the session.update goes out");
    assert_eq!(sent[0]["type"], "session.update");
    assert_released_once(&harness);
}

#[tokio::test]
async fn test_unexpected_first_reply_fails_negotiation() {
    let mut harness = start(supervisor(), &[audio_delta(&[0, 0])]).await;
    let err = finish(&mut harness).await.unwrap_err();
    assert!(matches!(err, Error::Negotiation(NegotiationError::Unexpected { .. })));
    assert!(harness.probe.writes().is_empty());
    assert_released_once(&harness);
}

#[tokio::test]
async fn test_capture_fault_ends_session_after_sending_frames_in_order() {
    let mut harness = start(supervisor(), &[created("sess_2")]).await;
    for i in 0..4u8 {
        harness.feed.frame(vec![i; 16]).await.unwrap();
    }
    harness.feed.fault("microphone unplugged").await.unwrap();

    let report = finish(&mut harness).await.unwrap();
    assert!(matches!(report.reason, EndReason::DeviceFault(ref m) if m.contains("microphone unplugged")));
    assert_eq!(report.first, LoopSide::Uplink);
    assert_eq!(report.downlink, LoopOutcome::Cancelled);
    assert!(!report.ended_by_service());

    let sent = drain_sent(&mut harness.peer);
    assert_eq!(sent[0]["type"], "session.update");
    let frames: Vec<Vec<u8>> = sent[1..]
        .iter()
        .map(|msg| {
            assert_eq!(msg["type"], "input_audio_buffer.append");
            decode_audio(msg["audio"].as_str().unwrap()).unwrap()
        })
        .collect();
    assert_eq!(frames, (0..4u8).map(|i| vec![i; 16]).collect::<Vec<_>>());
    assert_released_once(&harness);
}

#[tokio::test]
async fn test_malformed_messages_do_not_abort_downlink() {
    let mut harness = start(
        supervisor(),
        &[
            created("sess_3"),
            json!({ "type": "response.audio.delta", "delta": "%%%" }),
            json!({ "no_type": true }),
            audio_delta(&[1, 0]),
            json!({ "type": "rate_limits.updated", "rate_limits": [] }),
            audio_delta(&[2, 0]),
            json!({ "type": "response.text" }),
            audio_delta(&[3, 0]),
        ],
    )
    .await;
    harness.peer.push("this is not json").await.unwrap();
    harness.peer.close();

    let report = finish(&mut harness).await.unwrap();
    assert_eq!(report.reason, EndReason::ChannelClosed);
    assert_eq!(harness.probe.writes(), vec![vec![1, 0], vec![2, 0], vec![3, 0]]);
    assert_released_once(&harness);
}

#[tokio::test]
async fn test_remote_error_mid_session_is_terminal() {
    let mut harness = start(
        supervisor(),
        &[
            created("sess_4"),
            json!({ "type": "error", "error": { "message": "server overloaded" } }),
            audio_delta(&[9, 9]),
        ],
    )
    .await;
    let report = finish(&mut harness).await.unwrap();
    assert_eq!(report.reason, EndReason::RemoteError("server overloaded".to_string()));
    assert!(harness.probe.writes().is_empty(), "nothing after the terminal event is consumed");
    assert_released_once(&harness);
}

#[tokio::test]
async fn test_playback_fault_ends_session() {
    let mut harness = start(supervisor(), &[created("sess_5")]).await;
    harness.probe.fail_writes();
    harness.peer.push_json(&audio_delta(&[0, 1])).await.unwrap();

    let report = finish(&mut harness).await.unwrap();
    assert!(matches!(report.reason, EndReason::DeviceFault(_)));
    assert_eq!(report.first, LoopSide::Downlink);
    assert_released_once(&harness);
}

#[tokio::test]
async fn test_transport_failure_is_distinguished_from_close() {
    let mut harness = start(supervisor(), &[created("sess_6")]).await;
    harness.peer.abort("connection reset by peer").await.unwrap();
    let report = finish(&mut harness).await.unwrap();
    assert_eq!(report.reason, EndReason::ChannelError("connection reset by peer".to_string()));
    assert_released_once(&harness);
}

#[tokio::test]
async fn test_shutdown_interrupts_active_session() {
    let shutdown = CancellationToken::new();
    let mut harness = start(supervisor().with_shutdown(shutdown.clone()), &[created("sess_7")]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();

    let report = finish(&mut harness).await.unwrap();
    assert_eq!(report.reason, EndReason::Interrupted);
    assert_eq!(report.uplink, LoopOutcome::Cancelled);
    assert_eq!(report.downlink, LoopOutcome::Cancelled);
    assert_released_once(&harness);
}

#[tokio::test]
async fn test_shutdown_during_negotiation() {
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let mut harness = start(supervisor().with_shutdown(shutdown), &[]).await;
    let err = finish(&mut harness).await.unwrap_err();
    assert!(matches!(err, Error::Interrupted));
    assert_released_once(&harness);
}

#[tokio::test]
async fn test_observer_sees_lifecycle_in_order() {
    let (events_tx, mut events) = mpsc::channel(16);
    let mut harness = start(
        supervisor().with_observer(events_tx),
        &[
            created("sess_8"),
            json!({ "type": "response.transcript", "transcript": "Hi", "is_final": false }),
            json!({
                "type": "response.done",
                "response": { "id": "resp_1", "output": [{ "content": [{ "type": "audio", "transcript": "Hi there" }] }] }
            }),
            json!({ "type": "session.terminated" }),
        ],
    )
    .await;
    finish(&mut harness).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            SessionEvent::Created { session_id: "sess_8".to_string() },
            SessionEvent::Transcript { text: "Hi".to_string(), is_final: false },
            SessionEvent::ResponseDone {
                response_id: Some("resp_1".to_string()),
                transcript: Some("Hi there".to_string()),
            },
            SessionEvent::Terminated { reason: None },
            SessionEvent::Ended(EndReason::Terminated(None)),
        ]
    );
}

#[tokio::test]
async fn test_stalled_observer_does_not_block_teardown() {
    // Room for the created notification and one text; the next one blocks.
    let (events_tx, _events) = mpsc::channel(2);
    let mut harness = start(
        supervisor().with_observer(events_tx),
        &[
            created("sess_9"),
            json!({ "type": "response.text", "text": "one" }),
            json!({ "type": "response.text", "text": "two" }),
            json!({ "type": "response.text", "text": "three" }),
        ],
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.feed.fault("microphone unplugged").await.unwrap();

    let report = finish(&mut harness).await.unwrap();
    assert!(matches!(report.reason, EndReason::DeviceFault(_)));
    assert_eq!(report.first, LoopSide::Uplink);
    assert_eq!(report.downlink, LoopOutcome::Cancelled);
    assert_released_once(&harness);
}

#[tokio::test]
async fn test_shutdown_with_stalled_observer() {
    let (events_tx, _events) = mpsc::channel(1);
    let shutdown = CancellationToken::new();
    let mut harness = start(
        supervisor().with_observer(events_tx).with_shutdown(shutdown.clone()),
        &[created("sess_10"), json!({ "type": "response.text", "text": "one" })],
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();

    let report = finish(&mut harness).await.unwrap();
    assert_eq!(report.reason, EndReason::Interrupted);
    assert_released_once(&harness);
}

#[tokio::test]
async fn test_builder_event_id_is_sent_with_update() {
    let supervisor = SpeechSession::builder()
        .event_id("event_123")
        .pacing(Duration::ZERO)
        .supervisor()
        .unwrap();
    let mut harness = start(supervisor, &[created("sess_11"), json!({ "type": "session.terminated" })]).await;
    finish(&mut harness).await.unwrap();

    let sent = drain_sent(&mut harness.peer);
    assert_eq!(sent[0]["type"], "session.update");
    assert_eq!(sent[0]["event_id"], "event_123");
}
