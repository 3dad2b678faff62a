use std::cell::Cell;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use hound::{SampleFormat, WavSpec, WavWriter};

use super::error::RadioError;

/// An open audio output accepting chunks scheduled on its own clock.
pub trait AudioSink {
    /// Seconds elapsed on the output's real-time clock.
    fn current_time(&self) -> f64;

    /// Queue `samples` to start playing at `start_seconds` on the output clock.
    fn schedule(
        &mut self,
        start_seconds: f64,
        sample_rate: u32,
        samples: &[f32],
    ) -> Result<(), RadioError>;

    /// Tears down the output, dropping anything still queued.
    fn close(self) -> Result<(), RadioError>;
}

/// Factory for sinks; the mixer opens one per "radio on".
pub trait AudioOutput {
    type Sink: AudioSink;

    fn open(&mut self) -> Result<Self::Sink, RadioError>;
}

/// Manually advanced audio clock, for rendering faster than real time.
#[derive(Debug, Clone, Default)]
pub struct StepClock(Rc<Cell<f64>>);

impl StepClock {
    pub fn now(&self) -> f64 {
        self.0.get()
    }

    pub fn advance(&self, seconds: f64) {
        self.0.set(self.0.get() + seconds);
    }

    pub fn reset(&self) {
        self.0.set(0.0);
    }
}

#[derive(Debug, Clone)]
pub enum SinkClock {
    Wall,
    Stepped(StepClock),
}

/// Opens [`WavSink`]s that record everything the listener would hear.
pub struct WavOutput {
    path: PathBuf,
    sample_rate: u32,
    clock: SinkClock,
    recordings: u32,
}

impl WavOutput {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32, clock: SinkClock) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            clock,
            recordings: 0,
        }
    }

    /// `path` for the first recording, then `<stem>-2.<ext>`, `<stem>-3.<ext>`, ...
    pub fn recording_path(&self, index: u32) -> PathBuf {
        if index == 0 {
            return self.path.clone();
        }
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.path.extension() {
            Some(ext) => format!("{}-{}.{}", stem, index + 1, ext.to_string_lossy()),
            None => format!("{}-{}", stem, index + 1),
        };
        self.path.with_file_name(name)
    }
}

impl AudioOutput for WavOutput {
    type Sink = WavSink;

    /// Each open starts a new recording file, so turning the radio off and
    /// on again keeps the earlier takes.
    fn open(&mut self) -> Result<WavSink, RadioError> {
        if self.sample_rate == 0 {
            return Err(RadioError::InvalidSampleRate(self.sample_rate));
        }
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let path = self.recording_path(self.recordings);
        let writer = WavWriter::create(&path, spec)?;
        self.recordings += 1;
        let clock = match &self.clock {
            SinkClock::Wall => SinkClockState::Wall(Instant::now()),
            SinkClock::Stepped(step) => {
                step.reset();
                SinkClockState::Stepped(step.clone())
            }
        };
        log::info!("recording to {} at {} Hz", path.display(), self.sample_rate);
        Ok(WavSink {
            writer,
            sample_rate: self.sample_rate,
            clock,
            origin: None,
            frames_written: 0,
        })
    }
}

enum SinkClockState {
    Wall(Instant),
    Stepped(StepClock),
}

/// Writes scheduled chunks to a mono float WAV file in schedule order.
///
/// Gaps between chunks are written as silence; overlapping chunks and
/// chunks at a different sample rate are rejected.
pub struct WavSink {
    writer: WavWriter<BufWriter<File>>,
    sample_rate: u32,
    clock: SinkClockState,
    origin: Option<f64>,
    frames_written: u64,
}

impl WavSink {
    fn scheduled_end(&self) -> Option<f64> {
        self.origin
            .map(|origin| origin + self.frames_written() as f64 / self.sample_rate as f64)
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl AudioSink for WavSink {
    fn current_time(&self) -> f64 {
        match &self.clock {
            SinkClockState::Wall(started) => started.elapsed().as_secs_f64(),
            SinkClockState::Stepped(step) => step.now(),
        }
    }

    fn schedule(
        &mut self,
        start_seconds: f64,
        sample_rate: u32,
        samples: &[f32],
    ) -> Result<(), RadioError> {
        if sample_rate != self.sample_rate {
            return Err(RadioError::SampleRateMismatch {
                expected: self.sample_rate,
                actual: sample_rate,
            });
        }

        let half_frame = 0.5 / self.sample_rate as f64;
        match self.scheduled_end() {
            None => self.origin = Some(start_seconds),
            Some(end) if start_seconds < end - half_frame => {
                return Err(RadioError::Overlap {
                    start: start_seconds,
                    scheduled_end: end,
                });
            }
            Some(end) if start_seconds > end + half_frame => {
                let gap = ((start_seconds - end) * self.sample_rate as f64).round() as u64;
                log::debug!("writing {} frames of silence before {:.3}s", gap, start_seconds);
                for _ in 0..gap {
                    self.writer.write_sample(0.0f32)?;
                }
                self.frames_written += gap;
            }
            Some(_) => {}
        }

        for &sample in samples {
            self.writer.write_sample(sample)?;
        }
        self.frames_written += samples.len() as u64;
        Ok(())
    }

    fn close(self) -> Result<(), RadioError> {
        log::debug!("closing recording after {} frames", self.frames_written());
        self.writer.finalize()?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn read_back(path: &std::path::Path) -> (u32, Vec<f32>) {
        let mut reader = hound::WavReader::open(path).unwrap();
        let rate = reader.spec().sample_rate;
        let samples = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        (rate, samples)
    }

    #[test]
    fn writes_contiguous_chunks_and_fills_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let clock = StepClock::default();
        clock.advance(3.0);

        let mut output = WavOutput::new(&path, 10, SinkClock::Stepped(clock.clone()));
        let mut sink = output.open().unwrap();
        assert_eq!(sink.current_time(), 0.0);
        clock.advance(0.25);
        assert_eq!(sink.current_time(), 0.25);

        sink.schedule(0.25, 10, &[0.1, 0.2]).unwrap();
        sink.schedule(0.45, 10, &[0.3]).unwrap();
        sink.schedule(0.75, 10, &[0.4]).unwrap();
        assert_eq!(sink.frames_written(), 6);
        sink.close().unwrap();

        let (rate, samples) = read_back(&path);
        assert_eq!(rate, 10);
        assert_eq!(samples, vec![0.1, 0.2, 0.3, 0.0, 0.0, 0.4]);
    }

    #[test]
    fn rejects_overlap_and_rate_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut output = WavOutput::new(
            dir.path().join("out.wav"),
            100,
            SinkClock::Stepped(StepClock::default()),
        );
        let mut sink = output.open().unwrap();
        sink.schedule(0.0, 100, &[0.0; 50]).unwrap();

        assert!(matches!(
            sink.schedule(0.25, 100, &[0.0; 10]),
            Err(RadioError::Overlap { .. })
        ));
        assert!(matches!(
            sink.schedule(0.5, 44_100, &[0.0; 10]),
            Err(RadioError::SampleRateMismatch {
                expected: 100,
                actual: 44_100
            })
        ));
        sink.close().unwrap();
    }

    #[test]
    fn reopening_starts_a_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pass.wav");
        let mut output = WavOutput::new(&path, 10, SinkClock::Stepped(StepClock::default()));
        assert_eq!(output.recording_path(2), dir.path().join("pass-3.wav"));

        let mut sink = output.open().unwrap();
        sink.schedule(0.0, 10, &[0.5; 3]).unwrap();
        sink.close().unwrap();

        let mut sink = output.open().unwrap();
        sink.schedule(0.0, 10, &[0.25]).unwrap();
        sink.close().unwrap();

        assert_eq!(read_back(&path).1, vec![0.5; 3]);
        assert_eq!(read_back(&dir.path().join("pass-2.wav")).1, vec![0.25]);
    }

    #[test]
    fn wall_clock_moves_forward() {
        let dir = tempfile::tempdir().unwrap();
        let mut output = WavOutput::new(dir.path().join("out.wav"), 8000, SinkClock::Wall);
        let sink = output.open().unwrap();
        let a = sink.current_time();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(sink.current_time() > a);
        sink.close().unwrap();
    }
}
