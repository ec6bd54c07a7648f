//! Capture device seam and the CPAL microphone implementation
//!
//! The coordinator only ever talks to [`CaptureDevice`]: acquisition yields a
//! releasable handle plus the stream format, and the device pushes sample
//! chunks (or a device error) through a channel. The default implementation
//! captures 16-bit PCM from the default input device at its native
//! configuration.
//!
//! The CPAL stream is owned by a dedicated capture thread (the stream handle
//! itself must never cross threads), so the [`CaptureHandle`] handed back to
//! the coordinator stays `Send`.

use std::sync::mpsc as std_mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::CaptureError;

/// Stream format of an acquired capture device.
///
/// Carried alongside the sample buffer so the WAV artifact can be encoded at
/// the capture-native rate and channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Signals pushed by an acquired capture stream.
#[derive(Debug, Clone)]
pub enum CaptureSignal {
    /// One chunk of 16-bit PCM samples, in capture order.
    Chunk(Vec<i16>),
    /// A device-level error; the stream is no longer usable.
    Error(String),
}

/// Handle to an acquired device. Releasing stops the hardware stream;
/// this must happen on every exit from recording, error paths included.
pub trait CaptureHandle: Send {
    fn release(self: Box<Self>);
}

/// The capture-device contract consumed by the coordinator.
pub trait CaptureDevice: Send + Sync {
    /// Acquire the device and start capturing.
    ///
    /// On success the device pushes [`CaptureSignal`]s through `signals`
    /// until released; the returned handle is the only way to stop it.
    fn acquire(
        &self,
        signals: mpsc::Sender<CaptureSignal>,
    ) -> Result<(Box<dyn CaptureHandle>, CaptureFormat), CaptureError>;
}

/// CPAL-backed capture from the default input device.
#[derive(Debug, Default)]
pub struct Microphone;

impl Microphone {
    pub fn new() -> Self {
        Self
    }
}

struct MicrophoneHandle {
    stop_tx: std_mpsc::Sender<()>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl CaptureHandle for MicrophoneHandle {
    fn release(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Capture thread panicked during release");
            }
        }
        log::info!("Capture device released");
    }
}

impl CaptureDevice for Microphone {
    fn acquire(
        &self,
        signals: mpsc::Sender<CaptureSignal>,
    ) -> Result<(Box<dyn CaptureHandle>, CaptureFormat), CaptureError> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let outcome = start_stream(signals);
                match outcome {
                    Ok((stream, format)) => {
                        let _ = ready_tx.send(Ok(format));
                        // Park until release; the stream stays alive (and
                        // capturing) exactly as long as this thread holds it.
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| CaptureError::StreamFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(format)) => {
                log::info!(
                    "Capture started: {} Hz, {} channels",
                    format.sample_rate,
                    format.channels
                );
                Ok((
                    Box::new(MicrophoneHandle {
                        stop_tx,
                        thread: Some(thread),
                    }),
                    format,
                ))
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(CaptureError::StreamFailed(
                "Capture thread exited before the stream started".to_string(),
            )),
        }
    }
}

/// Open the default input device and start its stream. Runs on the capture
/// thread.
fn start_stream(
    signals: mpsc::Sender<CaptureSignal>,
) -> Result<(Stream, CaptureFormat), CaptureError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or(CaptureError::NoInputDevice)?;

    log::info!("Using audio input device: {:?}", device.name());

    let supported_config = device
        .default_input_config()
        .map_err(|_| CaptureError::NoSupportedConfig)?;

    let sample_format = supported_config.sample_format();
    let config: StreamConfig = supported_config.into();
    let format = CaptureFormat {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    let stream = match sample_format {
        SampleFormat::I16 => build_input_stream::<i16>(&device, &config, signals),
        SampleFormat::U16 => build_input_stream::<u16>(&device, &config, signals),
        SampleFormat::F32 => build_input_stream::<f32>(&device, &config, signals),
        _ => Err(CaptureError::NoSupportedConfig),
    }?;

    stream
        .play()
        .map_err(|e| CaptureError::StreamFailed(e.to_string()))?;

    Ok((stream, format))
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    signals: mpsc::Sender<CaptureSignal>,
) -> Result<Stream, CaptureError>
where
    T: cpal::Sample<Float = f32> + cpal::SizedSample + Send + 'static,
{
    let error_signals = signals.clone();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let chunk: Vec<i16> = data.iter().map(|&s| sample_to_i16(s)).collect();
                if signals.try_send(CaptureSignal::Chunk(chunk)).is_err() {
                    log::debug!("Capture channel full; dropping {} samples", data.len());
                }
            },
            move |err| {
                log::error!("Capture stream error: {}", err);
                let _ = error_signals.try_send(CaptureSignal::Error(err.to_string()));
            },
            None,
        )
        .map_err(|e| CaptureError::StreamFailed(e.to_string()))
}

/// Convert any supported sample type to i16 for the WAV artifact.
fn sample_to_i16<T: cpal::Sample<Float = f32>>(sample: T) -> i16 {
    let clamped = sample.to_float_sample().clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_to_i16() {
        assert_eq!(sample_to_i16(0.0f32), 0);
        assert_eq!(sample_to_i16(1.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-1.0f32), -i16::MAX);

        // Out-of-range input is clamped
        assert_eq!(sample_to_i16(2.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-2.0f32), -i16::MAX);
    }

    #[test]
    fn i16_samples_pass_through() {
        assert_eq!(sample_to_i16(0i16), 0);
        assert_eq!(sample_to_i16(i16::MAX), i16::MAX);
    }
}
