use chrono::{DateTime, Utc};
use sgp4::{Constants, Elements};

use super::error::TrackerError;

/// Source of inertial (TEME, km) satellite positions.
///
/// `None` means the orbit cannot be evaluated at that instant (decayed,
/// numerically diverged, or outside the model's validity).
pub trait Propagator {
    fn propagate_teme(&self, at: DateTime<Utc>) -> Option<[f64; 3]>;
}

/// A satellite described by a two-line element set, propagated with SGP4.
///
/// Immutable once built, so one instance can be shared across threads.
pub struct Satellite {
    name: Option<String>,
    elements: Elements,
    constants: Constants,
}

impl Satellite {
    /// Accepts the two element lines, optionally preceded by a name line.
    /// Blank lines and surrounding whitespace are ignored.
    pub fn from_tle(tle: &str) -> Result<Self, TrackerError> {
        let mut lines = tle.lines().map(str::trim).filter(|l| !l.is_empty());
        let block: [Option<&str>; 4] = std::array::from_fn(|_| lines.next());
        match block {
            [Some(line1), Some(line2), None, None] => Self::from_lines(None, line1, line2),
            [Some(name), Some(line1), Some(line2), None] => {
                Self::from_lines(Some(name.to_string()), line1, line2)
            }
            _ => Err(TrackerError::InvalidTleFormat),
        }
    }

    pub fn from_lines(name: Option<String>, line1: &str, line2: &str) -> Result<Self, TrackerError> {
        let elements = Elements::from_tle(name.clone(), line1.as_bytes(), line2.as_bytes())?;
        let constants = Constants::from_elements(&elements)?;
        Ok(Self {
            name,
            elements,
            constants,
        })
    }

    pub fn with_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("NORAD {}", self.elements.norad_id))
    }

    pub fn norad_id(&self) -> u64 {
        self.elements.norad_id
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.elements.datetime.and_utc()
    }
}

impl Propagator for Satellite {
    fn propagate_teme(&self, at: DateTime<Utc>) -> Option<[f64; 3]> {
        let minutes = match self.elements.datetime_to_minutes_since_epoch(&at.naive_utc()) {
            Ok(m) => m,
            Err(e) => {
                log::trace!("{}: cannot convert {} to minutes since epoch: {}", self.name(), at, e);
                return None;
            }
        };

        match self.constants.propagate(minutes) {
            Ok(prediction) if prediction.position.iter().all(|c| c.is_finite()) => {
                Some(prediction.position)
            }
            Ok(_) => {
                log::trace!("{}: non-finite position at {}", self.name(), at);
                None
            }
            Err(e) => {
                log::trace!("{}: propagation failed at {}: {}", self.name(), at, e);
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const ISS_TLE: &str = "ISS (ZARYA)
1 25544U 98067A   23314.24517226  .00093162  00000+0  16505-2 0  9991
2 25544  51.6416 325.0671 0002415 274.2971 187.0056 15.49490004424444";

    pub fn iss() -> Satellite {
        Satellite::from_tle(ISS_TLE).unwrap()
    }

    #[test]
    fn parses_named_tle() {
        let sat = iss();
        assert_eq!(sat.name(), "ISS (ZARYA)");
        assert_eq!(sat.norad_id(), 25544);
        assert_eq!(sat.epoch().format("%Y-%m-%d").to_string(), "2023-11-10");
    }

    #[test]
    fn unnamed_tle_falls_back_to_norad_id() {
        let body: Vec<&str> = ISS_TLE.lines().skip(1).collect();
        let sat = Satellite::from_tle(&body.join("\n")).unwrap();
        assert_eq!(sat.name(), "NORAD 25544");
    }

    #[test]
    fn tolerates_blank_lines_and_padding() {
        let padded = format!("\n  {}  \n\n", ISS_TLE.replace('\n', "  \n\n  "));
        let sat = Satellite::from_tle(&padded).unwrap();
        assert_eq!(sat.name(), "ISS (ZARYA)");
        assert_eq!(sat.norad_id(), 25544);
    }

    #[test]
    fn rejects_wrong_line_count() {
        let extra = format!("{}\nextra line", ISS_TLE);
        for tle in ["", "1 25544U", extra.as_str()] {
            assert!(
                matches!(Satellite::from_tle(tle), Err(TrackerError::InvalidTleFormat)),
                "{:?}",
                tle
            );
        }
    }

    #[test]
    fn shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Satellite>();

        let sat = iss();
        let at = sat.epoch();
        let expected = sat.propagate_teme(at);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| assert_eq!(sat.propagate_teme(at), expected));
            }
        });
    }

    #[test]
    fn rejects_corrupted_lines() {
        let broken = ISS_TLE.replace("51.6416", "5x.6416");
        assert!(Satellite::from_tle(&broken).is_err());
        assert!(matches!(
            Satellite::from_tle("just one line"),
            Err(TrackerError::InvalidTleFormat)
        ));
    }

    #[test]
    fn propagates_near_epoch() {
        let sat = iss();
        let pos = sat.propagate_teme(sat.epoch()).unwrap();
        let r = (pos[0] * pos[0] + pos[1] * pos[1] + pos[2] * pos[2]).sqrt();
        assert!(r > 6600.0 && r < 6900.0, "radius {}", r);
    }
}
