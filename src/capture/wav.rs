//! In-memory WAV encoding for the transcription artifact
//!
//! The accumulated sample buffer of one capture session is finalized into a
//! single WAV artifact (16-bit PCM at the capture-native format) and sent on
//! the transcription channel. The artifact only ever exists in memory; it is
//! never written to disk.

use std::io::Cursor;

use hound::{WavSpec, WavWriter};

use super::{CaptureError, CaptureFormat};

/// Encode a sample buffer into a WAV artifact.
pub fn encode_wav(samples: &[i16], format: CaptureFormat) -> Result<Vec<u8>, CaptureError> {
    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec)
        .map_err(|e| CaptureError::EncodeFailed(e.to_string()))?;

    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| CaptureError::EncodeFailed(e.to_string()))?;
    }

    writer
        .finalize()
        .map_err(|e| CaptureError::EncodeFailed(e.to_string()))?;

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_artifact_reads_back() {
        let format = CaptureFormat {
            sample_rate: 16_000,
            channels: 1,
        };
        let samples = vec![0i16, 100, -100, i16::MAX, i16::MIN];

        let wav = encode_wav(&samples, format).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);

        let decoded: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn empty_buffer_still_produces_a_valid_container() {
        let format = CaptureFormat {
            sample_rate: 48_000,
            channels: 2,
        };

        let wav = encode_wav(&[], format).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.len(), 0);
    }
}
