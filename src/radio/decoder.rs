use std::path::Path;

use hound::{SampleFormat, WavReader};

use super::error::RadioError;
use super::source::AudioSource;

/// Turns a program file into mono PCM.
pub trait AudioDecoder {
    fn decode(&self, path: &Path) -> Result<AudioSource, RadioError>;
}

/// Decodes WAV files of any channel count; channels are averaged to mono.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl WavDecoder {
    /// Sample rate from the header, without reading the samples.
    pub fn probe(path: &Path) -> Result<u32, RadioError> {
        let reader = WavReader::open(path)?;
        Ok(reader.spec().sample_rate)
    }
}

impl AudioDecoder for WavDecoder {
    fn decode(&self, path: &Path) -> Result<AudioSource, RadioError> {
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let channels = spec.channels.max(1) as usize;
        let mono: Vec<f32> = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        log::info!(
            "decoded {}: {} Hz, {} channel(s), {:.1}s",
            path.display(),
            spec.sample_rate,
            spec.channels,
            mono.len() as f64 / spec.sample_rate.max(1) as f64
        );

        AudioSource::new(spec.sample_rate, mono)
    }
}

#[cfg(test)]
mod tests {
    use hound::{WavSpec, WavWriter};

    use super::*;

    #[test]
    fn decodes_stereo_pcm16_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("program.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 11_025,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for (l, r) in [(16_384i16, 0i16), (-32_768, -32_768), (0, 8_192)] {
            writer.write_sample(l).unwrap();
            writer.write_sample(r).unwrap();
        }
        writer.finalize().unwrap();

        assert_eq!(WavDecoder::probe(&path).unwrap(), 11_025);
        let source = WavDecoder.decode(&path).unwrap();
        assert_eq!(source.sample_rate(), 11_025);
        assert_eq!(source.samples(), &[0.25, -1.0, 0.125]);
    }

    #[test]
    fn decodes_float_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("program.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for s in [0.5f32, -0.5, 0.0] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let source = WavDecoder.decode(&path).unwrap();
        assert_eq!(source.samples(), &[0.5, -0.5, 0.0]);
    }

    #[test]
    fn empty_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        WavWriter::create(&path, spec).unwrap().finalize().unwrap();

        assert!(matches!(
            WavDecoder.decode(&path),
            Err(RadioError::EmptyProgram)
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(WavDecoder.decode(Path::new("/nonexistent/program.wav")).is_err());
    }
}
