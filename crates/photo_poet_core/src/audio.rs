//! crates/photo_poet_core/src/audio.rs
//!
//! Frames the raw PCM returned by the speech model into a WAV container.

use crate::domain::{DataUri, DataUriError};
use hound::{WavSpec, WavWriter};

/// Sample rate assumed when the remote MIME type does not state one.
pub const SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio payload could not be decoded: {0}")]
    Decode(#[from] DataUriError),
    #[error("failed to encode WAV: {0}")]
    Encode(#[from] hound::Error),
}

/// Wraps little-endian 16-bit mono samples in a WAV container.
pub fn pcm16_to_wav(pcm_data: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = std::io::Cursor::new(Vec::new());

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::new(&mut cursor, spec)?;
    // A trailing odd byte is not a full sample and is dropped.
    for chunk in pcm_data.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}

/// Reads the `rate=` parameter from a MIME type such as
/// `audio/L16;codec=pcm;rate=24000`.
fn sample_rate_of(mime_type: &str) -> u32 {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(SAMPLE_RATE)
}

/// Converts speech output into a `data:audio/wav;base64,...` URI.
/// Audio that is already WAV passes through unchanged.
pub fn wav_data_uri(audio: &DataUri) -> Result<DataUri, AudioError> {
    if matches!(audio.essence(), "audio/wav" | "audio/x-wav" | "audio/wave") {
        return Ok(audio.clone());
    }
    let pcm = audio.decode()?;
    let wav = pcm16_to_wav(&pcm, sample_rate_of(audio.mime_type()))?;
    Ok(DataUri::from_bytes("audio/wav", &wav)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_describes_mono_pcm16() {
        let wav = pcm16_to_wav(&[0x01, 0x00, 0xff, 0x7f], SAMPLE_RATE).unwrap();
        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.into_samples().map(Result::unwrap).collect();
        assert_eq!(samples, vec![1, i16::MAX]);
    }

    #[test]
    fn reads_rate_from_mime_parameters() {
        assert_eq!(sample_rate_of("audio/L16;codec=pcm;rate=16000"), 16_000);
        assert_eq!(sample_rate_of("audio/L16"), SAMPLE_RATE);
        assert_eq!(sample_rate_of("audio/L16;rate=abc"), SAMPLE_RATE);
    }

    #[test]
    fn converts_pcm_data_uri_to_wav() {
        let pcm = DataUri::from_bytes("audio/L16;codec=pcm;rate=24000", &[0, 0, 1, 0]).unwrap();
        let wav = wav_data_uri(&pcm).unwrap();
        assert_eq!(wav.mime_type(), "audio/wav");
        let bytes = wav.decode().unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn wav_input_passes_through() {
        let wav = DataUri::parse("data:audio/wav;base64,UklGRg==").unwrap();
        assert_eq!(wav_data_uri(&wav).unwrap(), wav);
    }
}
