use serde::Serialize;

// WGS-84 constants
pub const WGS84_A_KM: f64 = 6378.137;
pub const WGS84_E2: f64 = 0.00669437999014;

/// A fixed point on the ground watching the satellite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observer {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub elevation_km: f64,
}

impl Default for Observer {
    fn default() -> Self {
        Self {
            latitude_deg: 0.0,
            longitude_deg: 0.0,
            elevation_km: 0.0,
        }
    }
}

impl Observer {
    pub fn new(latitude_deg: f64, longitude_deg: f64, elevation_km: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            elevation_km,
        }
    }

    /// Parses `"lat, lon"` in degrees.
    pub fn from_coordinates(coordinates: &str, elevation_km: Option<f64>) -> Option<Self> {
        let parts: Vec<_> = coordinates.split(',').map(|s| s.trim()).collect();
        if parts.len() != 2 {
            return None;
        }
        let lat: f64 = parts[0].parse().ok()?;
        let lon: f64 = parts[1].parse().ok()?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=360.0).contains(&lon) {
            return None;
        }
        let elevation_km = elevation_km.unwrap_or(0.0);
        if !elevation_km.is_finite() {
            return None;
        }
        Some(Self::new(lat, lon, elevation_km))
    }

    pub fn lat_rad(&self) -> f64 {
        self.latitude_deg.to_radians()
    }

    pub fn lon_rad(&self) -> f64 {
        self.longitude_deg.to_radians()
    }

    pub fn position_ecef_km(&self) -> [f64; 3] {
        let lat = self.lat_rad();
        let lon = self.lon_rad();
        let sin_lat = lat.sin();
        let cos_lat = lat.cos();
        let sin_lon = lon.sin();
        let cos_lon = lon.cos();
        let n = WGS84_A_KM / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        let h = self.elevation_km;
        let x = (n + h) * cos_lat * cos_lon;
        let y = (n + h) * cos_lat * sin_lon;
        let z = (n * (1.0 - WGS84_E2) + h) * sin_lat;
        [x, y, z]
    }
}
