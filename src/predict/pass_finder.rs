use chrono::{DateTime, Duration, Utc};

use crate::predict::types::Pass;
use crate::tracker::{look_angles, Observer, Propagator};

const COARSE_STEP_SECONDS: i64 = 5 * 60;
const FINE_STEP_SECONDS: i64 = 1;
const COARSE_SCAN_BUDGET: usize = 10_000;
// Upper bound for each refinement walk, so a satellite that never sets cannot hang us.
const REFINE_LIMIT_SECONDS: i64 = 24 * 60 * 60;

pub const DEFAULT_THRESHOLD_DEG: f64 = 2.0;

/// Elevation of the satellite above the observer's horizon, in degrees.
pub trait ElevationSource {
    fn elevation_deg(&self, at: DateTime<Utc>) -> Option<f64>;
}

impl<F> ElevationSource for F
where
    F: Fn(DateTime<Utc>) -> Option<f64>,
{
    fn elevation_deg(&self, at: DateTime<Utc>) -> Option<f64> {
        self(at)
    }
}

/// A satellite as seen from one observer.
pub struct Tracking<'a, P: Propagator + ?Sized> {
    satellite: &'a P,
    observer: Observer,
}

impl<'a, P: Propagator + ?Sized> Tracking<'a, P> {
    pub fn new(satellite: &'a P, observer: Observer) -> Self {
        Self {
            satellite,
            observer,
        }
    }
}

impl<P: Propagator + ?Sized> ElevationSource for Tracking<'_, P> {
    fn elevation_deg(&self, at: DateTime<Utc>) -> Option<f64> {
        look_angles(self.satellite, &self.observer, at).map(|l| l.elevation_deg)
    }
}

/// Next pass of `satellite` over `observer` at or after `from`.
pub fn next_pass<P: Propagator + ?Sized>(
    satellite: &P,
    observer: &Observer,
    from: DateTime<Utc>,
    threshold_deg: f64,
) -> Option<Pass> {
    next_pass_by(&Tracking::new(satellite, *observer), from, threshold_deg)
}

/// Finds the next window where elevation is at or above `threshold_deg`.
///
/// A coarse forward scan locates any instant inside a pass, then one-second
/// walks find the rising and falling edges. The walks are linear rather than
/// bisections because elevation near the horizon is not guaranteed to be
/// monotonic. Instants where the elevation is unavailable count as below
/// the threshold. Returns `None` when the scan budget runs out.
pub fn next_pass_by<S: ElevationSource + ?Sized>(
    source: &S,
    from: DateTime<Utc>,
    threshold_deg: f64,
) -> Option<Pass> {
    let elevation = |t: DateTime<Utc>| source.elevation_deg(t).unwrap_or(f64::NEG_INFINITY);
    let above = |t: DateTime<Utc>| elevation(t) >= threshold_deg;

    let coarse_step = Duration::seconds(COARSE_STEP_SECONDS);
    let fine_step = Duration::seconds(FINE_STEP_SECONDS);
    let refine_limit = Duration::seconds(REFINE_LIMIT_SECONDS);

    let mut cursor = from;
    let mut max_el = f64::NEG_INFINITY;
    let mut hit = None;
    for _ in 0..COARSE_SCAN_BUDGET {
        max_el = max_el.max(elevation(cursor));
        if max_el >= threshold_deg {
            hit = Some(cursor);
            break;
        }
        cursor += coarse_step;
    }

    let Some(hit) = hit else {
        log::debug!(
            "no pass above {} deg within {} coarse steps of {}",
            threshold_deg,
            COARSE_SCAN_BUDGET,
            from
        );
        return None;
    };

    // Rising edge: walk back while the previous second is still inside the pass.
    let earliest = hit - refine_limit;
    let mut start = hit;
    while start > earliest && above(start - fine_step) {
        start -= fine_step;
    }

    // Falling edge: walk forward to the first second below the threshold.
    let latest = start + refine_limit;
    let mut end = start;
    let mut max_el = f64::NEG_INFINITY;
    while end < latest {
        let el = elevation(end);
        if el < threshold_deg {
            break;
        }
        max_el = max_el.max(el);
        end += fine_step;
    }

    log::debug!("next pass: {} -> {} (max {:.2} deg)", start, end, max_el);

    Some(Pass {
        start,
        end,
        max_elevation_deg: max_el,
    })
}
