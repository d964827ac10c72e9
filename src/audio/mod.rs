//! Audio device capability: a capture source producing fixed-size PCM16
//! frames and a playback sink accepting raw PCM16 bytes.
//!
//! Backends:
//! - `memory`: in-process doubles fed and inspected by the caller
//! - `cpal_backend`: the default host's microphone and speaker (feature `backend-cpal`)

pub mod memory;

#[cfg(feature = "backend-cpal")]
pub mod cpal_backend;

use crate::error::DeviceError;

/// Raw little-endian PCM16 bytes.
pub type PcmFrame = Vec<u8>;

/// Shape of the PCM stream in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSpec {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Samples per channel in one captured frame
    pub frame_samples: usize,
}

impl Default for PcmSpec {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            channels: 1,
            frame_samples: 1024,
        }
    }
}

impl PcmSpec {
    /// Size in bytes of one captured frame.
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        self.frame_samples * self.channels as usize * 2
    }
}

/// Capture side of an audio device.
#[async_trait::async_trait]
pub trait AudioCapture: Send {
    /// Wait for the next full frame. An error means the device faulted or
    /// was closed; the caller stops reading.
    async fn read_frame(&mut self) -> Result<PcmFrame, DeviceError>;

    /// Release the device. Idempotent.
    async fn close(&mut self);
}

/// Playback side of an audio device.
#[async_trait::async_trait]
pub trait AudioPlayback: Send {
    async fn write(&mut self, pcm: &[u8]) -> Result<(), DeviceError>;

    /// Release the device. Idempotent.
    async fn close(&mut self);
}

/// Convert raw little-endian PCM16 bytes into samples; a trailing odd byte is dropped.
#[must_use]
pub fn pcm16_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_frame_is_1024_mono_samples() {
        assert_eq!(PcmSpec::default().frame_bytes(), 2048);
    }

    #[test]
    fn samples_are_little_endian() {
        assert_eq!(pcm16_samples(&[0x01, 0x00, 0xff, 0xff, 0x7f]), vec![1, -1]);
    }
}
