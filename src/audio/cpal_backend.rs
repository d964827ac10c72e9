//! Default-host microphone and speaker via `cpal`.
//!
//! `cpal::Stream` is not `Send`, so each device owns a dedicated OS thread that
//! builds the stream, keeps it alive, and drops it when told to stop. Frames
//! cross into async code through a tokio channel; playback samples go the other
//! way through a shared queue drained by the output callback.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;

use super::{AudioCapture, AudioPlayback, PcmFrame, PcmSpec, pcm16_samples};
use crate::error::DeviceError;

const CAPTURE_QUEUE_FRAMES: usize = 64;

type FrameResult = Result<PcmFrame, DeviceError>;

/// Keeps a stream-owning thread alive until stopped.
struct StreamWorker {
    stop: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StreamWorker {
    fn spawn<F>(name: &str, build: F) -> Result<Self, DeviceError>
    where
        F: FnOnce() -> Result<cpal::Stream, DeviceError> + Send + 'static,
    {
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), DeviceError>>();

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Returns on an explicit stop or when the owner is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| DeviceError::Stream(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| DeviceError::Stream(format!("{name} thread exited during setup")))??;

        Ok(Self { stop: Some(stop_tx), thread: Some(thread) })
    }

    async fn stop(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => tracing::warn!("audio thread panicked"),
                Err(err) => tracing::warn!("failed to join audio thread: {err}"),
            }
        }
    }
}

/// First error reported by a stream's error callback, surfaced to the next
/// device call.
#[derive(Clone, Default)]
struct StreamFault(Arc<Mutex<Option<String>>>);

impl StreamFault {
    fn record(&self, message: String) {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(message);
        }
    }

    fn check(&self) -> Result<(), DeviceError> {
        match self.0.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(message) => Err(DeviceError::Stream(message.clone())),
            None => Ok(()),
        }
    }
}

fn stream_config(spec: PcmSpec) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: spec.channels,
        sample_rate: cpal::SampleRate(spec.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Microphone capture producing `spec.frame_bytes()`-sized frames.
pub struct CpalCapture {
    frames: mpsc::Receiver<FrameResult>,
    worker: StreamWorker,
}

impl CpalCapture {
    /// Open the default input device.
    ///
    /// # Errors
    /// Returns an error if there is no input device or the stream cannot be started.
    pub fn open(spec: PcmSpec) -> Result<Self, DeviceError> {
        let (tx, rx) = mpsc::channel(CAPTURE_QUEUE_FRAMES);
        let worker = StreamWorker::spawn("s2s-capture", move || build_input(spec, tx))?;
        tracing::info!(sample_rate = spec.sample_rate, channels = spec.channels, "Microphone opened");
        Ok(Self { frames: rx, worker })
    }
}

fn build_input(spec: PcmSpec, tx: mpsc::Sender<FrameResult>) -> Result<cpal::Stream, DeviceError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or(DeviceError::Unavailable("input"))?;

    let frame_bytes = spec.frame_bytes();
    let mut pending: Vec<u8> = Vec::with_capacity(frame_bytes);
    let err_tx = tx.clone();

    let stream = device
        .build_input_stream(
            &stream_config(spec),
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                for sample in data {
                    pending.extend_from_slice(&sample.to_le_bytes());
                    if pending.len() >= frame_bytes {
                        let frame = std::mem::replace(&mut pending, Vec::with_capacity(frame_bytes));
                        if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(Ok(frame)) {
                            tracing::warn!("capture queue full, dropping frame");
                        }
                    }
                }
            },
            move |err| {
                let _ = err_tx.try_send(Err(DeviceError::Stream(err.to_string())));
            },
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))?;
    stream.play().map_err(|e| DeviceError::Stream(e.to_string()))?;
    Ok(stream)
}

#[async_trait::async_trait]
impl AudioCapture for CpalCapture {
    async fn read_frame(&mut self) -> Result<PcmFrame, DeviceError> {
        self.frames.recv().await.unwrap_or(Err(DeviceError::Closed))
    }

    async fn close(&mut self) {
        self.frames.close();
        self.worker.stop().await;
    }
}

/// Speaker playback; writes enqueue samples and return immediately.
pub struct CpalPlayback {
    queue: Arc<Mutex<VecDeque<i16>>>,
    fault: StreamFault,
    worker: StreamWorker,
    closed: bool,
}

impl CpalPlayback {
    /// Open the default output device.
    ///
    /// # Errors
    /// Returns an error if there is no output device or the stream cannot be started.
    pub fn open(spec: PcmSpec) -> Result<Self, DeviceError> {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let fault = StreamFault::default();
        let (shared, on_fault) = (Arc::clone(&queue), fault.clone());
        let worker = StreamWorker::spawn("s2s-playback", move || build_output(spec, shared, on_fault))?;
        tracing::info!(sample_rate = spec.sample_rate, channels = spec.channels, "Speaker opened");
        Ok(Self { queue, fault, worker, closed: false })
    }
}

fn build_output(
    spec: PcmSpec,
    queue: Arc<Mutex<VecDeque<i16>>>,
    fault: StreamFault,
) -> Result<cpal::Stream, DeviceError> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or(DeviceError::Unavailable("output"))?;

    let stream = device
        .build_output_stream(
            &stream_config(spec),
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
                for slot in data.iter_mut() {
                    *slot = queue.pop_front().unwrap_or(0);
                }
            },
            move |err| {
                tracing::warn!("playback stream error: {err}");
                fault.record(err.to_string());
            },
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))?;
    stream.play().map_err(|e| DeviceError::Stream(e.to_string()))?;
    Ok(stream)
}

#[async_trait::async_trait]
impl AudioPlayback for CpalPlayback {
    async fn write(&mut self, pcm: &[u8]) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        self.fault.check()?;
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(pcm16_samples(pcm));
        Ok(())
    }

    async fn close(&mut self) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        self.worker.stop().await;
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_stream_fault_is_kept() {
        let fault = StreamFault::default();
        assert!(fault.check().is_ok());
        let callback = fault.clone();
        callback.record("device unplugged".to_string());
        callback.record("buffer underrun".to_string());
        assert_eq!(fault.check(), Err(DeviceError::Stream("device unplugged".to_string())));
    }
}
