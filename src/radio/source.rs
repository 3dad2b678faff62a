use super::error::RadioError;

/// Decoded mono program material.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSource {
    sample_rate: u32,
    samples: Vec<f32>,
}

impl AudioSource {
    /// Samples are clamped to [-1, 1]; non-finite samples become silence.
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Result<Self, RadioError> {
        if sample_rate == 0 {
            return Err(RadioError::InvalidSampleRate(sample_rate));
        }
        if samples.is_empty() {
            return Err(RadioError::EmptyProgram);
        }
        let samples = samples
            .into_iter()
            .map(|s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 })
            .collect();
        Ok(Self {
            sample_rate,
            samples,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Program source played as an endless loop through a read cursor.
#[derive(Debug, Clone)]
pub struct ProgramTape {
    source: AudioSource,
    cursor: usize,
}

impl ProgramTape {
    pub fn new(source: AudioSource) -> Self {
        Self { source, cursor: 0 }
    }

    pub fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Moves the cursor back to a position previously reported by [`cursor`](Self::cursor).
    pub fn seek(&mut self, cursor: usize) {
        self.cursor = cursor % self.source.len();
    }

    /// Reads `frames` samples from the cursor, wrapping to the start of the
    /// source as often as needed, and advances the cursor past them.
    pub fn read(&mut self, frames: usize) -> Vec<f32> {
        let samples = self.source.samples();
        let mut out = Vec::with_capacity(frames);
        while out.len() < frames {
            let n = (frames - out.len()).min(samples.len() - self.cursor);
            out.extend_from_slice(&samples[self.cursor..self.cursor + n]);
            self.cursor = (self.cursor + n) % samples.len();
        }
        out
    }
}
