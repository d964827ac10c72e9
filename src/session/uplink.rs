//! Capture -> channel loop.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::outcome::{EndReason, LoopOutcome};
use crate::audio::AudioCapture;
use crate::protocol::codec::Codec;
use crate::transport::ChannelSender;

/// Delay after each sent frame, bounding the outbound message rate.
pub const DEFAULT_PACING: Duration = Duration::from_millis(10);

/// Stream captured frames as `input_audio_buffer.append` messages until the
/// device or channel fails or `cancel` fires.
///
/// Cancellation is observed at every suspension point (frame read, send,
/// pacing sleep); the in-flight operation is abandoned, not completed.
pub async fn run(
    capture: &mut dyn AudioCapture,
    sender: &mut dyn ChannelSender,
    codec: &Codec,
    pacing: Duration,
    cancel: &CancellationToken,
) -> LoopOutcome {
    let mut frames: u64 = 0;

    let outcome = loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break LoopOutcome::Cancelled,
            frame = capture.read_frame() => frame,
        };
        let pcm = match frame {
            Ok(pcm) => pcm,
            Err(err) => {
                tracing::warn!("Capture device failed: {err}");
                break LoopOutcome::Ended(EndReason::DeviceFault(err.to_string()));
            }
        };

        let text = match codec.encode_audio(&pcm) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(len = pcm.len(), "Dropping audio frame: {err}");
                continue;
            }
        };

        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => break LoopOutcome::Cancelled,
            sent = sender.send(text) => sent,
        };
        if let Err(err) = sent {
            tracing::warn!("Uplink send failed: {err}");
            break LoopOutcome::Ended(err.into());
        }
        frames += 1;

        if !pacing.is_zero() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break LoopOutcome::Cancelled,
                () = tokio::time::sleep(pacing) => {}
            }
        }
    };

    tracing::debug!(frames, ?outcome, "Uplink stopped");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::memory as audio_memory;
    use crate::protocol::codec::decode_audio;
    use crate::transport::MessageChannel;
    use crate::transport::memory;

    fn audio_of(text: &str) -> Vec<u8> {
        let value: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(value["type"], "input_audio_buffer.append");
        decode_audio(value["audio"].as_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn frames_are_sent_in_capture_order() {
        let (client, mut peer) = memory::channel(16);
        let (mut tx, _rx) = Box::new(client).split();
        let (mut capture, feed) = audio_memory::capture(16);
        for i in 0..5u8 {
            feed.frame(vec![i; 4]).await.unwrap();
        }
        feed.fault("unplugged").await.unwrap();

        let outcome = run(&mut capture, tx.as_mut(), &Codec::new(), Duration::ZERO, &CancellationToken::new()).await;
        assert!(matches!(outcome, LoopOutcome::Ended(EndReason::DeviceFault(_))));

        for i in 0..5u8 {
            assert_eq!(audio_of(&peer.sent.recv().await.unwrap()), vec![i; 4]);
        }
    }

    #[tokio::test]
    async fn closed_channel_ends_loop() {
        let (client, peer) = memory::channel(4);
        let (mut tx, _rx) = Box::new(client).split();
        drop(peer);
        let (mut capture, feed) = audio_memory::capture(4);
        feed.frame(vec![0u8; 8]).await.unwrap();

        let outcome = run(&mut capture, tx.as_mut(), &Codec::new(), DEFAULT_PACING, &CancellationToken::new()).await;
        assert_eq!(outcome, LoopOutcome::Ended(EndReason::ChannelClosed));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_read() {
        let (client, _peer) = memory::channel(4);
        let (mut tx, _rx) = Box::new(client).split();
        let (mut capture, _feed) = audio_memory::capture(4);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let outcome = run(&mut capture, tx.as_mut(), &Codec::new(), DEFAULT_PACING, &cancel).await;
        assert_eq!(outcome, LoopOutcome::Cancelled);
    }

    #[tokio::test]
    async fn oversize_frame_is_skipped() {
        let (client, mut peer) = memory::channel(4);
        let (mut tx, _rx) = Box::new(client).split();
        let (mut capture, feed) = audio_memory::capture(4);
        feed.frame(vec![1u8; 64]).await.unwrap();
        feed.frame(vec![2u8; 8]).await.unwrap();
        drop(feed);

        let codec = Codec::new().with_max_audio_chunk_bytes(16);
        let outcome = run(&mut capture, tx.as_mut(), &codec, Duration::ZERO, &CancellationToken::new()).await;
        assert_eq!(outcome, LoopOutcome::Ended(EndReason::DeviceFault("audio device closed".to_string())));
        assert_eq!(audio_of(&peer.sent.recv().await.unwrap()), vec![2u8; 8]);
    }
}
