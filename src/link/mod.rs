//! Link budget: turns look angles into a bounded mixing level.
//!
//! Received power uses free-space path loss in the km/MHz convention
//! (`92.45 + 20 log10(d_km) + 20 log10(f_GHz)`). The result, and the
//! receiver noise floor, are mapped onto one normalised dBFS-like scale so
//! both can be used directly as mixing weights.

mod error;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use error::LinkError;

use crate::tracker::{look_angles, LookAngles, Observer, Propagator};

/// FSPL constant for distance in km and frequency in GHz.
pub const FSPL_CONSTANT_DB: f64 = 92.45;

/// Slant ranges below this are treated as this (1 m) before taking logs.
pub const MIN_RANGE_KM: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedScale {
    pub src_min: f64,
    pub src_max: f64,
    pub out_min: f64,
    pub out_max: f64,
}

pub const DEFAULT_SCALE: NormalizedScale = NormalizedScale {
    src_min: -120.0,
    src_max: -60.0,
    out_min: -100.0,
    out_max: 0.0,
};

impl Default for NormalizedScale {
    fn default() -> Self {
        DEFAULT_SCALE
    }
}

/// Transmitter and receiver parameters, fixed for a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RadioLinkParams {
    pub transmit_power_w: f64,
    pub frequency_mhz: f64,
    pub antenna_gain_db: f64,
    pub noise_floor_db: f64,
}

impl RadioLinkParams {
    pub fn new(
        transmit_power_w: f64,
        frequency_mhz: f64,
        antenna_gain_db: f64,
        noise_floor_db: f64,
    ) -> Result<Self, LinkError> {
        let finite = |field: &'static str, value: f64| {
            if value.is_finite() {
                Ok(value)
            } else {
                Err(LinkError::NonFinite { field, value })
            }
        };
        let positive = |field: &'static str, value: f64| {
            finite(field, value).and_then(|v| {
                if v > 0.0 {
                    Ok(v)
                } else {
                    Err(LinkError::NotPositive { field, value })
                }
            })
        };

        Ok(Self {
            transmit_power_w: positive("transmit_power_w", transmit_power_w)?,
            frequency_mhz: positive("frequency_mhz", frequency_mhz)?,
            antenna_gain_db: finite("antenna_gain_db", antenna_gain_db)?,
            noise_floor_db: finite("noise_floor_db", noise_floor_db)?,
        })
    }
}

/// Linear map of `db` from `[src_min, src_max]` onto `[out_min, out_max]`,
/// clamped at both ends. NaN maps to `out_min`.
pub fn to_normalized_level(db: f64, scale: &NormalizedScale) -> f64 {
    if db.is_nan() || db < scale.src_min {
        scale.out_min
    } else if db > scale.src_max {
        scale.out_max
    } else {
        (scale.out_max - scale.out_min) / (scale.src_max - scale.src_min) * (db - scale.src_min)
            + scale.out_min
    }
}

pub fn free_space_path_loss_db(range_km: f64, frequency_mhz: f64) -> f64 {
    FSPL_CONSTANT_DB
        + 20.0 * range_km.max(MIN_RANGE_KM).log10()
        + 20.0 * (frequency_mhz / 1000.0).log10()
}

pub fn received_power_dbm(
    transmit_power_w: f64,
    frequency_mhz: f64,
    range_km: f64,
    antenna_gain_db: f64,
) -> f64 {
    let power_dbm = 10.0 * (transmit_power_w * 1000.0).log10();
    power_dbm + antenna_gain_db - free_space_path_loss_db(range_km, frequency_mhz)
}

/// Normalised signal level for the given geometry; `-inf` below the horizon.
pub fn signal_level(
    transmit_power_w: f64,
    frequency_mhz: f64,
    look: &LookAngles,
    antenna_gain_db: f64,
) -> f64 {
    // No diffraction: below the horizon there is no signal at all.
    if look.elevation_deg < 0.0 {
        return f64::NEG_INFINITY;
    }
    let dbm = received_power_dbm(transmit_power_w, frequency_mhz, look.range_km, antenna_gain_db);
    to_normalized_level(dbm, &DEFAULT_SCALE)
}

/// Amplitude factor for a level in dB; zero for non-finite levels.
pub fn db_to_gain(db: f64) -> f32 {
    if db.is_finite() {
        10f64.powf(db / 20.0) as f32
    } else {
        0.0
    }
}

/// Something that can report the received signal level at an instant.
pub trait SignalLevel {
    fn signal_level_db(&self, at: DateTime<Utc>) -> f64;
}

impl<F> SignalLevel for F
where
    F: Fn(DateTime<Utc>) -> f64,
{
    fn signal_level_db(&self, at: DateTime<Utc>) -> f64 {
        self(at)
    }
}

/// Downlink from one satellite to one observer.
pub struct LinkBudget<'a, P: Propagator + ?Sized> {
    satellite: &'a P,
    observer: Observer,
    params: RadioLinkParams,
}

impl<'a, P: Propagator + ?Sized> LinkBudget<'a, P> {
    pub fn new(satellite: &'a P, observer: Observer, params: RadioLinkParams) -> Self {
        Self {
            satellite,
            observer,
            params,
        }
    }

    pub fn params(&self) -> &RadioLinkParams {
        &self.params
    }

    /// Ambient noise level on the same normalised scale as the signal.
    pub fn noise_level_db(&self) -> f64 {
        to_normalized_level(self.params.noise_floor_db, &DEFAULT_SCALE)
    }

    pub fn look_angles(&self, at: DateTime<Utc>) -> Option<LookAngles> {
        look_angles(self.satellite, &self.observer, at)
    }
}

impl<P: Propagator + ?Sized> SignalLevel for LinkBudget<'_, P> {
    fn signal_level_db(&self, at: DateTime<Utc>) -> f64 {
        match self.look_angles(at) {
            Some(look) => signal_level(
                self.params.transmit_power_w,
                self.params.frequency_mhz,
                &look,
                self.params.antenna_gain_db,
            ),
            None => f64::NEG_INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::FixedEcef;

    fn look(elevation_deg: f64, range_km: f64) -> LookAngles {
        LookAngles {
            azimuth_deg: 0.0,
            elevation_deg,
            range_km,
        }
    }

    #[test]
    fn below_horizon_is_silent() {
        for el in [-0.001, -1.0, -45.0, -90.0] {
            assert_eq!(signal_level(5.0, 137.5, &look(el, 1000.0), 5.0), f64::NEG_INFINITY);
        }
    }

    #[test]
    fn matches_fspl_formula() {
        let power_dbm = 10.0 * (5.0f64 * 1000.0).log10();
        let fspl = 92.45 + 20.0 * 1000.0f64.log10() + 20.0 * (137.5f64 / 1000.0).log10();
        let dbm = power_dbm + 5.0 - fspl;
        assert!((received_power_dbm(5.0, 137.5, 1000.0, 5.0) - dbm).abs() < 1e-9);

        let expected = 100.0 / 60.0 * (dbm + 120.0) - 100.0;
        let level = signal_level(5.0, 137.5, &look(10.0, 1000.0), 5.0);
        assert!((level - expected).abs() < 1e-6, "{} vs {}", level, expected);
    }

    #[test]
    fn zero_range_stays_finite() {
        let level = signal_level(5.0, 137.5, &look(90.0, 0.0), 5.0);
        assert!(level.is_finite());
        assert_eq!(level, DEFAULT_SCALE.out_max);
    }

    #[test]
    fn normalized_level_is_bounded_and_monotonic() {
        let inputs = [
            f64::NEG_INFINITY,
            -1e9,
            -150.0,
            -120.0,
            -119.5,
            -100.0,
            -75.25,
            -60.0,
            -59.0,
            0.0,
            1e9,
            f64::INFINITY,
        ];
        let mut prev = f64::NEG_INFINITY;
        for db in inputs {
            let out = to_normalized_level(db, &DEFAULT_SCALE);
            assert!((-100.0..=0.0).contains(&out), "{} -> {}", db, out);
            assert!(out >= prev);
            prev = out;
        }
        assert_eq!(to_normalized_level(f64::NAN, &DEFAULT_SCALE), -100.0);
        assert_eq!(to_normalized_level(-90.0, &DEFAULT_SCALE), -50.0);
    }

    #[test]
    fn gain_of_non_finite_level_is_zero() {
        assert_eq!(db_to_gain(f64::NEG_INFINITY), 0.0);
        assert_eq!(db_to_gain(f64::NAN), 0.0);
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-20.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn params_reject_bad_values() {
        assert!(RadioLinkParams::new(5.0, 137.5, 5.0, -80.0).is_ok());
        assert!(matches!(
            RadioLinkParams::new(f64::NAN, 137.5, 5.0, -80.0),
            Err(LinkError::NonFinite { field: "transmit_power_w", .. })
        ));
        assert!(matches!(
            RadioLinkParams::new(5.0, 0.0, 5.0, -80.0),
            Err(LinkError::NotPositive { field: "frequency_mhz", .. })
        ));
        assert!(matches!(
            RadioLinkParams::new(5.0, 137.5, f64::INFINITY, -80.0),
            Err(LinkError::NonFinite { field: "antenna_gain_db", .. })
        ));
    }

    #[test]
    fn link_budget_follows_geometry() {
        let params = RadioLinkParams::new(5.0, 137.5, 5.0, -80.0).unwrap();
        let at: DateTime<Utc> = "2024-03-01T12:00:00Z".parse().unwrap();

        let overhead = FixedEcef(Some([6378.137 + 2000.0, 0.0, 0.0]));
        let budget = LinkBudget::new(&overhead, Observer::default(), params);
        let level = budget.signal_level_db(at);
        assert!(level.is_finite());
        assert!((-100.0..=0.0).contains(&level));

        let below = FixedEcef(Some([-(6378.137 + 2000.0), 0.0, 0.0]));
        let budget = LinkBudget::new(&below, Observer::default(), params);
        assert_eq!(budget.signal_level_db(at), f64::NEG_INFINITY);

        let gone = FixedEcef(None);
        let budget = LinkBudget::new(&gone, Observer::default(), params);
        assert_eq!(budget.signal_level_db(at), f64::NEG_INFINITY);

        let noise = budget.noise_level_db();
        assert!((noise - (100.0 / 60.0 * 40.0 - 100.0)).abs() < 1e-9);
    }
}
