use serde::Serialize;
use std::io::Cursor;
use utoipa::ToSchema;

/// Number of bars the page draws for a waveform.
pub const WAVEFORM_POINTS: usize = 200;

/// Mono samples in `[-1.0, 1.0]` decoded from a WAV file.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// A peak envelope ready for plotting.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct Waveform {
    pub sample_rate: u32,
    pub duration_secs: f32,
    /// Absolute peak of each bucket, left to right.
    pub peaks: Vec<f32>,
}

#[derive(Debug, thiserror::Error)]
pub enum WaveformError {
    #[error("Could not display waveform: {0}")]
    Unreadable(#[from] hound::Error),
    #[error("Could not display waveform: the audio contains no samples")]
    Empty,
}

/// Decodes a WAV file and mixes all channels down to mono.
pub fn decode_wav(data: &[u8]) -> Result<DecodedAudio, WaveformError> {
    let reader = hound::WavReader::new(Cursor::new(data))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => {
            let pcm16 = reader
                .into_samples::<i16>()
                .collect::<Result<Vec<_>, _>>()?;
            convert_i16_to_f32(&pcm16)
        }
        (hound::SampleFormat::Int, bits) => {
            let max_val = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
        (hound::SampleFormat::Float, _) => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
    };

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Reduces samples to `points` absolute peaks. Short inputs yield one peak per sample.
pub fn peak_envelope(samples: &[f32], points: usize) -> Vec<f32> {
    if samples.is_empty() || points == 0 {
        return Vec::new();
    }
    let bucket = samples.len().div_ceil(points);
    samples
        .chunks(bucket)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0.0f32, |peak, s| peak.max(s.abs()))
                .min(1.0)
        })
        .collect()
}

/// Decodes `data` and computes its plotted waveform.
pub fn waveform_from_wav(data: &[u8], points: usize) -> Result<Waveform, WaveformError> {
    let audio = decode_wav(data)?;
    if audio.samples.is_empty() {
        return Err(WaveformError::Empty);
    }
    Ok(Waveform {
        sample_rate: audio.sample_rate,
        duration_secs: audio.duration_secs(),
        peaks: peak_envelope(&audio.samples, points),
    })
}

/// Converts a slice of i16 samples to a vector of f32 samples.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

#[cfg(test)]
pub(crate) fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
