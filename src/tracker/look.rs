use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::frames::{ecef_to_enu, ecef_to_lat_lon, sidereal_time, teme_to_ecef_position};
use super::observer::Observer;
use super::satellite::Propagator;

/// Spherical Earth radius used for altitude and footprint figures.
pub const EARTH_MEAN_RADIUS_KM: f64 = 6378.13;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LookAngles {
    /// Degrees clockwise from north, in [0, 360).
    pub azimuth_deg: f64,
    /// Degrees above the horizon; negative when the satellite is below it.
    pub elevation_deg: f64,
    pub range_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackPoint {
    pub timestamp: DateTime<Utc>,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

/// Azimuth, elevation and slant range of the satellite seen from `observer`.
pub fn look_angles<P: Propagator + ?Sized>(
    satellite: &P,
    observer: &Observer,
    at: DateTime<Utc>,
) -> Option<LookAngles> {
    let pos_teme = satellite.propagate_teme(at)?;
    let sat_ecef = teme_to_ecef_position(pos_teme, sidereal_time(at));
    let sta_ecef = observer.position_ecef_km();

    let dr = [
        sat_ecef[0] - sta_ecef[0],
        sat_ecef[1] - sta_ecef[1],
        sat_ecef[2] - sta_ecef[2],
    ];
    let range_km = (dr[0] * dr[0] + dr[1] * dr[1] + dr[2] * dr[2]).sqrt();

    let (east, north, up) = ecef_to_enu(dr, observer.lat_rad(), observer.lon_rad());
    let azimuth_deg = east.atan2(north).to_degrees().rem_euclid(360.0);
    let elevation_deg = if range_km > 0.0 {
        (up / range_km).clamp(-1.0, 1.0).asin().to_degrees()
    } else {
        90.0
    };

    Some(LookAngles {
        azimuth_deg,
        elevation_deg,
        range_km,
    })
}

/// Geodetic latitude and longitude directly beneath the satellite.
pub fn sub_satellite_point<P: Propagator + ?Sized>(
    satellite: &P,
    at: DateTime<Utc>,
) -> Option<(f64, f64)> {
    let pos_teme = satellite.propagate_teme(at)?;
    Some(ecef_to_lat_lon(teme_to_ecef_position(
        pos_teme,
        sidereal_time(at),
    )))
}

/// Distance from the Earth's centre minus [`EARTH_MEAN_RADIUS_KM`].
pub fn altitude_km<P: Propagator + ?Sized>(satellite: &P, at: DateTime<Utc>) -> Option<f64> {
    let [x, y, z] = satellite.propagate_teme(at)?;
    Some((x * x + y * y + z * z).sqrt() - EARTH_MEAN_RADIUS_KM)
}

/// Ground distance from the sub-satellite point to the edge of visibility.
pub fn footprint_radius_km(altitude_km: f64) -> f64 {
    if altitude_km <= 0.0 {
        return 0.0;
    }
    (EARTH_MEAN_RADIUS_KM / (EARTH_MEAN_RADIUS_KM + altitude_km)).acos() * EARTH_MEAN_RADIUS_KM
}

/// Samples sub-satellite points over `[start, end]`, skipping instants
/// where propagation fails.
pub fn ground_track<P: Propagator + ?Sized>(
    satellite: &P,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
) -> Vec<TrackPoint> {
    let mut points = Vec::new();
    if step <= Duration::zero() {
        return points;
    }

    let mut cursor = start;
    while cursor <= end {
        if let (Some((lat, lon)), Some(alt)) = (
            sub_satellite_point(satellite, cursor),
            altitude_km(satellite, cursor),
        ) {
            points.push(TrackPoint {
                timestamp: cursor,
                latitude_deg: lat,
                longitude_deg: lon,
                altitude_km: alt,
            });
        }
        cursor += step;
    }

    points
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tracker::observer::WGS84_A_KM;
    use crate::tracker::satellite::tests::iss;

    /// Holds a fixed Earth-fixed position by undoing the sidereal rotation.
    pub struct FixedEcef(pub Option<[f64; 3]>);

    impl Propagator for FixedEcef {
        fn propagate_teme(&self, at: DateTime<Utc>) -> Option<[f64; 3]> {
            let [x, y, z] = self.0?;
            let g = sidereal_time(at);
            Some([x * g.cos() - y * g.sin(), x * g.sin() + y * g.cos(), z])
        }
    }

    fn t0() -> DateTime<Utc> {
        "2024-03-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn overhead_satellite() {
        let sat = FixedEcef(Some([WGS84_A_KM + 500.0, 0.0, 0.0]));
        let look = look_angles(&sat, &Observer::default(), t0()).unwrap();
        assert!((look.range_km - 500.0).abs() < 1e-6);
        assert!((look.elevation_deg - 90.0).abs() < 1e-6);
    }

    #[test]
    fn azimuth_follows_compass() {
        let obs = Observer::default();
        let north = FixedEcef(Some([WGS84_A_KM + 500.0, 0.0, 1000.0]));
        let look = look_angles(&north, &obs, t0()).unwrap();
        assert!(look.azimuth_deg.abs() < 1e-6 || (look.azimuth_deg - 360.0).abs() < 1e-6);
        let expected_el = (500.0f64 / (500.0f64.powi(2) + 1000.0f64.powi(2)).sqrt())
            .asin()
            .to_degrees();
        assert!((look.elevation_deg - expected_el).abs() < 1e-6);

        let east = FixedEcef(Some([WGS84_A_KM + 500.0, 1000.0, 0.0]));
        let look = look_angles(&east, &obs, t0()).unwrap();
        assert!((look.azimuth_deg - 90.0).abs() < 1e-6);

        let west = FixedEcef(Some([WGS84_A_KM + 500.0, -1000.0, 0.0]));
        let look = look_angles(&west, &obs, t0()).unwrap();
        assert!((look.azimuth_deg - 270.0).abs() < 1e-6);
    }

    #[test]
    fn elevation_is_not_clamped_below_horizon() {
        let sat = FixedEcef(Some([-(WGS84_A_KM + 500.0), 0.0, 0.0]));
        let look = look_angles(&sat, &Observer::default(), t0()).unwrap();
        assert!((look.elevation_deg + 90.0).abs() < 1e-6);
    }

    #[test]
    fn propagation_failure_is_absent_everywhere() {
        let sat = FixedEcef(None);
        assert!(look_angles(&sat, &Observer::default(), t0()).is_none());
        assert!(sub_satellite_point(&sat, t0()).is_none());
        assert!(altitude_km(&sat, t0()).is_none());
        assert!(ground_track(&sat, t0(), t0() + Duration::minutes(10), Duration::minutes(1))
            .is_empty());
    }

    #[test]
    fn sub_point_and_altitude() {
        let sat = FixedEcef(Some([0.0, EARTH_MEAN_RADIUS_KM + 800.0, 0.0]));
        let (lat, lon) = sub_satellite_point(&sat, t0()).unwrap();
        assert!(lat.abs() < 1e-6);
        assert!((lon - 90.0).abs() < 1e-6);
        assert!((altitude_km(&sat, t0()).unwrap() - 800.0).abs() < 1e-6);
    }

    #[test]
    fn footprint_grows_with_altitude() {
        assert_eq!(footprint_radius_km(0.0), 0.0);
        let low = footprint_radius_km(400.0);
        let high = footprint_radius_km(800.0);
        assert!(low > 2000.0 && low < 2400.0, "{}", low);
        assert!(high > low);
    }

    #[test]
    fn iss_geometry_is_plausible() {
        let sat = iss();
        let at = sat.epoch() + Duration::minutes(30);
        let obs = Observer::new(40.7128, -74.006, 0.0);

        let look = look_angles(&sat, &obs, at).unwrap();
        assert!((0.0..360.0).contains(&look.azimuth_deg));
        assert!((-90.0..=90.0).contains(&look.elevation_deg));
        assert!(look.range_km > 300.0 && look.range_km < 13_500.0);

        let (lat, _) = sub_satellite_point(&sat, at).unwrap();
        assert!(lat.abs() < 52.5);

        let alt = altitude_km(&sat, at).unwrap();
        assert!(alt > 300.0 && alt < 500.0, "altitude {}", alt);
    }

    #[test]
    fn ground_track_samples_every_step() {
        let sat = iss();
        let start = sat.epoch();
        let track = ground_track(&sat, start, start + Duration::minutes(90), Duration::minutes(1));
        assert_eq!(track.len(), 91);
        assert_eq!(track[1].timestamp - track[0].timestamp, Duration::minutes(1));
    }
}
