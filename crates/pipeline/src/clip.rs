use std::io::Cursor;

use hound::{SampleFormat, WavSpec};

/// Assembles one WAV clip from the source blob: the sub-clips addressed by
/// `ranges` (milliseconds, in the given order) concatenated with `gap_ms` of
/// silence between consecutive sub-clips. No silence before the first or
/// after the last. Sample rate, channel layout and sample format inherit
/// from the input; sample timing within a range is untouched.
///
/// Ranges beyond the end of the blob are clamped. Decode/encode failures
/// bubble to the caller, which skips the owning accumulator.
pub fn assemble_clip(audio: &[u8], ranges: &[(u64, u64)], gap_ms: u64) -> anyhow::Result<Vec<u8>> {
    let mut reader = hound::WavReader::new(Cursor::new(audio))
        .map_err(|e| anyhow::anyhow!("Failed to parse source WAV: {e}"))?;
    let spec = reader.spec();

    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => {
            let samples: Vec<i16> = reader
                .samples::<i16>()
                .collect::<Result<_, _>>()
                .map_err(|e| anyhow::anyhow!("Failed to decode source WAV: {e}"))?;
            write_clip(&samples, spec, ranges, gap_ms, 0i16)
        }
        (SampleFormat::Float, 32) => {
            let samples: Vec<f32> = reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| anyhow::anyhow!("Failed to decode source WAV: {e}"))?;
            write_clip(&samples, spec, ranges, gap_ms, 0.0f32)
        }
        (format, bits) => anyhow::bail!("Unsupported WAV sample format: {format:?}/{bits}-bit"),
    }
}

fn write_clip<S>(
    samples: &[S],
    spec: WavSpec,
    ranges: &[(u64, u64)],
    gap_ms: u64,
    silence: S,
) -> anyhow::Result<Vec<u8>>
where
    S: hound::Sample + Copy,
{
    let channels = spec.channels as usize;
    let total_frames = samples.len() / channels;
    let frame_at = |ms: u64| ((ms as u128 * spec.sample_rate as u128) / 1_000) as usize;
    let gap_frames = frame_at(gap_ms);

    let mut buf = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec)
            .map_err(|e| anyhow::anyhow!("Failed to start clip writer: {e}"))?;

        for (i, &(start_ms, end_ms)) in ranges.iter().enumerate() {
            if i > 0 {
                for _ in 0..gap_frames * channels {
                    writer.write_sample(silence)?;
                }
            }
            let start = frame_at(start_ms).min(total_frames);
            let end = frame_at(end_ms).min(total_frames);
            for &sample in &samples[start * channels..end * channels] {
                writer.write_sample(sample)?;
            }
        }

        writer
            .finalize()
            .map_err(|e| anyhow::anyhow!("Failed to finalize clip: {e}"))?;
    }
    Ok(buf)
}

/// Duration in milliseconds of a WAV blob.
pub fn wav_duration_ms(audio: &[u8]) -> anyhow::Result<u64> {
    let reader = hound::WavReader::new(Cursor::new(audio))
        .map_err(|e| anyhow::anyhow!("Failed to parse WAV: {e}"))?;
    let spec = reader.spec();
    Ok(reader.duration() as u64 * 1_000 / spec.sample_rate as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 16_000;

    /// Mono 16-bit WAV whose sample values encode their frame index.
    fn ramp_wav(duration_ms: u64) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let frames = (duration_ms * SAMPLE_RATE as u64 / 1_000) as usize;
        let mut buf = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec).unwrap();
            for i in 0..frames {
                writer.write_sample((i % 10_000) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        buf
    }

    fn read_samples(audio: &[u8]) -> Vec<i16> {
        hound::WavReader::new(Cursor::new(audio))
            .unwrap()
            .samples::<i16>()
            .map(|s| s.unwrap())
            .collect()
    }

    #[test]
    fn test_single_range_copies_samples_verbatim() {
        let source = ramp_wav(3_000);
        let clip = assemble_clip(&source, &[(1_000, 2_000)], 500).unwrap();

        assert_eq!(wav_duration_ms(&clip).unwrap(), 1_000);
        let clip_samples = read_samples(&clip);
        let source_samples = read_samples(&source);
        assert_eq!(clip_samples, source_samples[16_000..32_000]);
    }

    #[test]
    fn test_gap_silence_between_ranges_only() {
        let source = ramp_wav(4_000);
        let clip = assemble_clip(&source, &[(0, 1_000), (2_000, 3_000)], 500).unwrap();

        // 1000 + 500 gap + 1000, no leading or trailing silence.
        assert_eq!(wav_duration_ms(&clip).unwrap(), 2_500);
        let samples = read_samples(&clip);
        let source_samples = read_samples(&source);
        assert_eq!(samples[..16_000], source_samples[..16_000]);
        assert!(samples[16_000..24_000].iter().all(|&s| s == 0));
        assert_eq!(samples[24_000..], source_samples[32_000..48_000]);
    }

    #[test]
    fn test_ranges_are_not_reordered() {
        let source = ramp_wav(3_000);
        let clip = assemble_clip(&source, &[(2_000, 2_100), (0, 100)], 0).unwrap();

        let samples = read_samples(&clip);
        let source_samples = read_samples(&source);
        assert_eq!(samples[..1_600], source_samples[32_000..33_600]);
        assert_eq!(samples[1_600..], source_samples[..1_600]);
    }

    #[test]
    fn test_range_past_end_is_clamped() {
        let source = ramp_wav(1_000);
        let clip = assemble_clip(&source, &[(500, 9_000)], 500).unwrap();
        assert_eq!(wav_duration_ms(&clip).unwrap(), 500);
    }

    #[test]
    fn test_stereo_layout_is_preserved() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut buf = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec).unwrap();
            for i in 0..SAMPLE_RATE as usize {
                writer.write_sample(i as i16).unwrap(); // left
                writer.write_sample(-(i as i16)).unwrap(); // right
            }
            writer.finalize().unwrap();
        }

        let clip = assemble_clip(&buf, &[(0, 250), (500, 750)], 250).unwrap();
        let reader = hound::WavReader::new(Cursor::new(&clip[..])).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(wav_duration_ms(&clip).unwrap(), 750);
    }

    #[test]
    fn test_non_wav_input_is_an_error() {
        assert!(assemble_clip(b"definitely not audio", &[(0, 100)], 0).is_err());
    }
}
