//! Audio capture for the session coordinator
//!
//! This module holds the capture-device seam ([`CaptureDevice`] /
//! [`CaptureHandle`]), the CPAL-backed [`Microphone`] implementation, and the
//! WAV encoder that turns an accumulated sample buffer into the artifact sent
//! on the transcription channel.

mod device;
pub mod wav;

pub use device::{
    CaptureDevice, CaptureFormat, CaptureHandle, CaptureSignal, Microphone,
};

/// Errors that can occur while acquiring the capture device or finalizing
/// an audio artifact.
#[derive(Debug, Clone)]
pub enum CaptureError {
    NoInputDevice,
    NoSupportedConfig,
    StreamFailed(String),
    EncodeFailed(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::NoInputDevice => write!(f, "No audio input device found"),
            CaptureError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            CaptureError::StreamFailed(e) => write!(f, "Failed to run capture stream: {}", e),
            CaptureError::EncodeFailed(e) => write!(f, "Failed to encode audio artifact: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_error_display() {
        assert!(CaptureError::NoInputDevice.to_string().contains("input device"));

        let err = CaptureError::StreamFailed("device busy".to_string());
        assert!(err.to_string().contains("device busy"));
    }
}
