use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// A predicted visibility window above the elevation threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pass {
    /// First second at or above the threshold (AOS).
    pub start: DateTime<Utc>,
    /// First second below the threshold after `start` (LOS).
    pub end: DateTime<Utc>,
    pub max_elevation_deg: f64,
}

impl Pass {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}
