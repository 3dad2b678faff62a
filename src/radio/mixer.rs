use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::error::RadioError;
use super::noise::NoiseGenerator;
use super::sink::{AudioOutput, AudioSink};
use super::source::{AudioSource, ProgramTape};
use crate::link::{db_to_gain, SignalLevel};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MixerConfig {
    /// How far ahead of the output clock audio is kept queued.
    pub target_buffer_seconds: f64,
    /// Chunk lengths are whole multiples of this.
    pub quantum_seconds: f64,
    pub master_volume: f32,
    /// Output rate used until program audio is loaded.
    pub fallback_sample_rate: u32,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            target_buffer_seconds: 1.0,
            quantum_seconds: 0.01,
            master_volume: 20.0,
            fallback_sample_rate: 22_050,
        }
    }
}

impl MixerConfig {
    pub fn validate(&self) -> Result<(), RadioError> {
        let invalid = |msg: String| Err(RadioError::InvalidConfig(msg));
        if !self.target_buffer_seconds.is_finite() || self.target_buffer_seconds <= 0.0 {
            return invalid(format!(
                "target buffer must be positive, got {}",
                self.target_buffer_seconds
            ));
        }
        if !self.quantum_seconds.is_finite()
            || self.quantum_seconds <= 0.0
            || self.quantum_seconds > self.target_buffer_seconds
        {
            return invalid(format!(
                "quantum must be in (0, {}], got {}",
                self.target_buffer_seconds, self.quantum_seconds
            ));
        }
        if !self.master_volume.is_finite() || self.master_volume < 0.0 {
            return invalid(format!(
                "master volume must be non-negative, got {}",
                self.master_volume
            ));
        }
        if self.fallback_sample_rate == 0 {
            return Err(RadioError::InvalidSampleRate(0));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MixerPhase {
    Off,
    Buffering,
    Streaming,
}

/// Everything queued so far, as an exact frame count from an origin on the
/// output clock.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Timeline {
    origin_seconds: f64,
    sample_rate: u32,
    frames: u64,
}

impl Timeline {
    fn new(origin_seconds: f64, sample_rate: u32) -> Self {
        Self {
            origin_seconds,
            sample_rate,
            frames: 0,
        }
    }

    fn end_seconds(&self) -> f64 {
        self.origin_seconds + self.frames as f64 / self.sample_rate as f64
    }

    fn rebase(&mut self, origin_seconds: f64, sample_rate: u32) {
        *self = Self::new(origin_seconds, sample_rate);
    }
}

enum State<S> {
    Off,
    On {
        sink: S,
        timeline: Option<Timeline>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledChunk {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub sample_rate: u32,
    pub frames: usize,
    pub signal_level_db: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Off,
    /// Enough audio is already queued.
    Full { buffered_seconds: f64 },
    Scheduled(ScheduledChunk),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixerSnapshot {
    pub phase: MixerPhase,
    pub turned_on: bool,
    pub program_loaded: bool,
    pub scheduled_end_seconds: Option<f64>,
    pub read_cursor: usize,
}

/// Keeps an audio output fed with program material mixed with noise, at a
/// level that follows the link budget.
///
/// Chunks are queued back to back on the output clock so playback has no
/// gaps or overlaps however irregularly `tick` is called, provided each
/// tick arrives before the queue drains.
pub struct AudioStreamMixer<O: AudioOutput> {
    output: O,
    config: MixerConfig,
    state: State<O::Sink>,
    program: Option<ProgramTape>,
    noise: NoiseGenerator,
    noise_level_db: f64,
}

impl<O: AudioOutput> AudioStreamMixer<O> {
    pub fn new(output: O, config: MixerConfig, noise_level_db: f64) -> Result<Self, RadioError> {
        config.validate()?;
        Ok(Self {
            output,
            config,
            state: State::Off,
            program: None,
            noise: NoiseGenerator::new(),
            noise_level_db,
        })
    }

    pub fn with_noise(mut self, noise: NoiseGenerator) -> Self {
        self.noise = noise;
        self
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// Installs the decoded program; until then the mixer plays noise only.
    pub fn load_program(&mut self, source: AudioSource) {
        log::info!(
            "program loaded: {} samples at {} Hz ({:.1}s loop)",
            source.len(),
            source.sample_rate(),
            source.duration_seconds()
        );
        self.program = Some(ProgramTape::new(source));
    }

    pub fn program_loaded(&self) -> bool {
        self.program.is_some()
    }

    pub fn is_on(&self) -> bool {
        matches!(self.state, State::On { .. })
    }

    pub fn phase(&self) -> MixerPhase {
        match &self.state {
            State::Off => MixerPhase::Off,
            State::On { timeline: None, .. } => MixerPhase::Buffering,
            State::On {
                timeline: Some(_), ..
            } => MixerPhase::Streaming,
        }
    }

    pub fn scheduled_end_seconds(&self) -> Option<f64> {
        match &self.state {
            State::On {
                timeline: Some(t), ..
            } => Some(t.end_seconds()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> MixerSnapshot {
        MixerSnapshot {
            phase: self.phase(),
            turned_on: self.is_on(),
            program_loaded: self.program_loaded(),
            scheduled_end_seconds: self.scheduled_end_seconds(),
            read_cursor: self.program.as_ref().map_or(0, |p| p.cursor()),
        }
    }

    pub fn turn_on(&mut self) -> Result<(), RadioError> {
        if self.is_on() {
            return Ok(());
        }
        let sink = self.output.open()?;
        self.state = State::On {
            sink,
            timeline: None,
        };
        log::info!("radio on");
        Ok(())
    }

    /// Closes the output, dropping queued audio, and forgets the schedule
    /// and tape position so the next turn-on starts from scratch.
    pub fn turn_off(&mut self) -> Result<(), RadioError> {
        let previous = std::mem::replace(&mut self.state, State::Off);
        if let Some(tape) = self.program.as_mut() {
            tape.rewind();
        }
        match previous {
            State::Off => Ok(()),
            State::On { sink, .. } => {
                log::info!("radio off");
                sink.close()
            }
        }
    }

    pub fn toggle(&mut self) -> Result<(), RadioError> {
        self.set_turned_on(!self.is_on())
    }

    /// Idempotent: asking for the current state does nothing.
    pub fn set_turned_on(&mut self, on: bool) -> Result<(), RadioError> {
        if on {
            self.turn_on()
        } else {
            self.turn_off()
        }
    }

    /// Tops the output queue back up to the target depth.
    ///
    /// `sim_now` is the simulated instant matching the output clock's
    /// present; the link is evaluated where the new chunk will actually be
    /// heard, i.e. after the audio already queued.
    pub fn tick<L: SignalLevel + ?Sized>(
        &mut self,
        sim_now: DateTime<Utc>,
        link: &L,
    ) -> Result<TickOutcome, RadioError> {
        let State::On { sink, timeline } = &mut self.state else {
            return Ok(TickOutcome::Off);
        };

        let real_now = sink.current_time();
        let sample_rate = self
            .program
            .as_ref()
            .map_or(self.config.fallback_sample_rate, |p| p.sample_rate());

        let mut tl = match *timeline {
            Some(tl) => tl,
            None => Timeline::new(real_now, sample_rate),
        };
        if tl.sample_rate != sample_rate {
            log::info!(
                "output rate {} -> {} Hz at {:.3}s",
                tl.sample_rate,
                sample_rate,
                tl.end_seconds()
            );
            tl.rebase(tl.end_seconds(), sample_rate);
        }
        if tl.end_seconds() < real_now {
            log::warn!(
                "audio underrun: queue drained at {:.3}s, now {:.3}s",
                tl.end_seconds(),
                real_now
            );
            tl.rebase(real_now, sample_rate);
        }

        let buffered_seconds = (tl.end_seconds() - real_now).max(0.0);
        let frames = frames_to_generate(&self.config, buffered_seconds, sample_rate);
        if frames == 0 {
            *timeline = Some(tl);
            return Ok(TickOutcome::Full { buffered_seconds });
        }

        let cursor = self.program.as_ref().map(|tape| tape.cursor());
        let (program, signal_level_db) = match self.program.as_mut() {
            Some(tape) => {
                let heard_at = sim_now
                    + Duration::microseconds((buffered_seconds * 1e6).round() as i64);
                (tape.read(frames), link.signal_level_db(heard_at))
            }
            None => (vec![0.0; frames], f64::NEG_INFINITY),
        };
        let noise = self.noise.white(frames);
        let mixed = mix(
            self.config.master_volume,
            &program,
            &noise,
            signal_level_db,
            self.noise_level_db,
        );

        let start_seconds = tl.end_seconds();
        if let Err(e) = sink.schedule(start_seconds, sample_rate, &mixed) {
            // Nothing was queued: the next tick must replay the same program audio.
            if let (Some(tape), Some(cursor)) = (self.program.as_mut(), cursor) {
                tape.seek(cursor);
            }
            return Err(e);
        }
        tl.frames += frames as u64;
        *timeline = Some(tl);

        let chunk = ScheduledChunk {
            start_seconds,
            end_seconds: tl.end_seconds(),
            sample_rate,
            frames,
            signal_level_db,
        };
        log::trace!(
            "scheduled {} frames at {:.3}s (signal {:.1} dB)",
            frames,
            start_seconds,
            signal_level_db
        );
        Ok(TickOutcome::Scheduled(chunk))
    }
}

/// Frames needed to refill the queue, rounded down to whole quanta of time.
fn frames_to_generate(config: &MixerConfig, buffered_seconds: f64, sample_rate: u32) -> usize {
    let wanted = config.target_buffer_seconds - buffered_seconds;
    if wanted <= 0.0 {
        return 0;
    }
    // Small epsilon so 1.0 / 0.01 lands on 100 quanta, not 99.
    let quanta = (wanted / config.quantum_seconds + 1e-9).floor();
    if quanta < 1.0 {
        return 0;
    }
    // Frames are taken from the quantized duration as a whole, so a quantum
    // that is not a whole number of frames does not stretch the chunk.
    (quanta * config.quantum_seconds * sample_rate as f64).round() as usize
}

/// `volume * (signal_gain * program + noise_gain * noise)`, sample by sample.
pub fn mix(
    volume: f32,
    program: &[f32],
    noise: &[f32],
    signal_level_db: f64,
    noise_level_db: f64,
) -> Vec<f32> {
    let signal_gain = db_to_gain(signal_level_db);
    let noise_gain = db_to_gain(noise_level_db);
    program
        .iter()
        .zip(noise)
        .map(|(p, n)| volume * (signal_gain * p + noise_gain * n))
        .collect()
}
