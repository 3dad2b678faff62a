//! Radio audio: the looping program tape, noise, and the mixer that keeps
//! an audio output fed without gaps.

mod decoder;
mod error;
mod mixer;
mod noise;
mod sink;
mod source;

pub use decoder::{AudioDecoder, WavDecoder};
pub use error::RadioError;
pub use mixer::{AudioStreamMixer, MixerConfig, TickOutcome};
pub use noise::NoiseGenerator;
pub use sink::{AudioOutput, SinkClock, StepClock, WavOutput};
pub use source::AudioSource;
