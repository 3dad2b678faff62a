use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid tle format: expected two element lines, optionally preceded by a name")]
    InvalidTleFormat,
    #[error("invalid tle: {0}")]
    InvalidTle(#[from] sgp4::TleError),
    #[error("elements error: {0}")]
    Elements(#[from] sgp4::ElementsError),
}
