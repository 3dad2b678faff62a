mod error;
mod frames;
mod look;
mod observer;
mod satellite;

pub use error::TrackerError;
pub use look::{
    altitude_km, footprint_radius_km, ground_track, look_angles, sub_satellite_point, LookAngles,
    TrackPoint,
};
pub use observer::Observer;
pub use satellite::{Propagator, Satellite};

#[cfg(test)]
pub(crate) use look::tests::FixedEcef;
#[cfg(test)]
pub(crate) use satellite::tests::{iss, ISS_TLE};
