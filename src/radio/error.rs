use thiserror::Error;

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("program audio is empty")]
    EmptyProgram,
    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),
    #[error("sample rate mismatch: output runs at {expected} Hz, chunk is {actual} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },
    #[error("chunk at {start:.6}s overlaps audio already scheduled up to {scheduled_end:.6}s")]
    Overlap { start: f64, scheduled_end: f64 },
    #[error("invalid mixer configuration: {0}")]
    InvalidConfig(String),
}
