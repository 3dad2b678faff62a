use chrono::{DateTime, Utc};

use super::observer::{WGS84_A_KM, WGS84_E2};

/// Greenwich sidereal angle (radians) used to rotate TEME into the Earth-fixed frame.
pub fn sidereal_time(at: DateTime<Utc>) -> f64 {
    sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(&at.naive_utc()))
}

pub fn teme_to_ecef_position(pos_teme: [f64; 3], gmst: f64) -> [f64; 3] {
    let cos_gmst = gmst.cos();
    let sin_gmst = gmst.sin();
    [
        pos_teme[0] * cos_gmst + pos_teme[1] * sin_gmst,
        -pos_teme[0] * sin_gmst + pos_teme[1] * cos_gmst,
        pos_teme[2],
    ]
}

pub fn ecef_to_enu(dr: [f64; 3], lat_rad: f64, lon_rad: f64) -> (f64, f64, f64) {
    let sin_lat = lat_rad.sin();
    let cos_lat = lat_rad.cos();
    let sin_lon = lon_rad.sin();
    let cos_lon = lon_rad.cos();

    let east = -sin_lon * dr[0] + cos_lon * dr[1];
    let north = -sin_lat * cos_lon * dr[0] - sin_lat * sin_lon * dr[1] + cos_lat * dr[2];
    let up = cos_lat * cos_lon * dr[0] + cos_lat * sin_lon * dr[1] + sin_lat * dr[2];
    (east, north, up)
}

/// Geodetic latitude and longitude (degrees) of an Earth-fixed position.
///
/// Longitude is normalised to [-180, 180). Latitude is found by fixed-point
/// iteration on the WGS-84 ellipsoid, which converges well below a
/// micro-degree in a handful of rounds for orbital altitudes.
pub fn ecef_to_lat_lon(pos: [f64; 3]) -> (f64, f64) {
    let [x, y, z] = pos;
    let lon = y.atan2(x);
    let p = (x * x + y * y).sqrt();

    let mut lat = z.atan2(p * (1.0 - WGS84_E2));
    for _ in 0..8 {
        let sin_lat = lat.sin();
        let n = WGS84_A_KM / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        lat = (z + WGS84_E2 * n * sin_lat).atan2(p);
    }

    let lon_deg = (lon.to_degrees() + 180.0).rem_euclid(360.0) - 180.0;
    (lat.to_degrees(), lon_deg)
}
