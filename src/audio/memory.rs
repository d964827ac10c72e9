use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use super::{AudioCapture, AudioPlayback, PcmFrame};
use crate::error::DeviceError;

/// Capture device fed by a [`CaptureFeed`]. Reads suspend until the feed
/// supplies a frame; dropping the feed closes the device.
pub struct MemoryCapture {
    frames: mpsc::Receiver<Result<PcmFrame, DeviceError>>,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

#[derive(Clone)]
pub struct CaptureFeed {
    frames: mpsc::Sender<Result<PcmFrame, DeviceError>>,
    closes: Arc<AtomicUsize>,
}

#[must_use]
pub fn capture(capacity: usize) -> (MemoryCapture, CaptureFeed) {
    let (tx, rx) = mpsc::channel(capacity);
    let closes = Arc::new(AtomicUsize::new(0));
    (
        MemoryCapture { frames: rx, closes: Arc::clone(&closes), closed: false },
        CaptureFeed { frames: tx, closes },
    )
}

impl CaptureFeed {
    /// Queue one frame for the capture side.
    ///
    /// # Errors
    /// Returns `DeviceError::Closed` once the capture side is gone.
    pub async fn frame(&self, pcm: impl Into<PcmFrame>) -> Result<(), DeviceError> {
        self.frames.send(Ok(pcm.into())).await.map_err(|_| DeviceError::Closed)
    }

    /// Make the next read fail.
    ///
    /// # Errors
    /// Returns `DeviceError::Closed` once the capture side is gone.
    pub async fn fault(&self, reason: impl Into<String>) -> Result<(), DeviceError> {
        self.frames
            .send(Err(DeviceError::Stream(reason.into())))
            .await
            .map_err(|_| DeviceError::Closed)
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AudioCapture for MemoryCapture {
    async fn read_frame(&mut self) -> Result<PcmFrame, DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        self.frames.recv().await.unwrap_or(Err(DeviceError::Closed))
    }

    async fn close(&mut self) {
        if !std::mem::replace(&mut self.closed, true) {
            self.frames.close();
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Playback device that records every write for later inspection.
pub struct MemoryPlayback {
    probe: PlaybackProbe,
    closed: bool,
}

#[derive(Clone, Default)]
pub struct PlaybackProbe {
    writes: Arc<Mutex<Vec<PcmFrame>>>,
    closes: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

#[must_use]
pub fn playback() -> (MemoryPlayback, PlaybackProbe) {
    let probe = PlaybackProbe::default();
    (MemoryPlayback { probe: probe.clone(), closed: false }, probe)
}

impl PlaybackProbe {
    #[must_use]
    pub fn writes(&self) -> Vec<PcmFrame> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Make every following write fail as if the device faulted.
    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl AudioPlayback for MemoryPlayback {
    async fn write(&mut self, pcm: &[u8]) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        if self.probe.failing.load(Ordering::SeqCst) {
            return Err(DeviceError::Stream("playback device unplugged".to_string()));
        }
        self.probe
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pcm.to_vec());
        Ok(())
    }

    async fn close(&mut self) {
        if !std::mem::replace(&mut self.closed, true) {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capture_yields_frames_then_closed() {
        let (mut cap, feed) = capture(4);
        feed.frame(vec![1u8, 2]).await.unwrap();
        feed.fault("overrun").await.unwrap();
        drop(feed);

        assert_eq!(cap.read_frame().await.unwrap(), vec![1, 2]);
        assert!(matches!(cap.read_frame().await, Err(DeviceError::Stream(msg)) if msg == "overrun"));
        assert_eq!(cap.read_frame().await, Err(DeviceError::Closed));
    }

    #[tokio::test]
    async fn playback_records_and_counts_close() {
        let (mut out, probe) = playback();
        out.write(&[9, 9]).await.unwrap();
        out.close().await;
        out.close().await;
        assert_eq!(probe.writes(), vec![vec![9, 9]]);
        assert_eq!(probe.close_count(), 1);
        assert_eq!(out.write(&[1]).await, Err(DeviceError::Closed));
    }
}
