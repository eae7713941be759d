//! Location sample throttle
//!
//! Mirrors the registration contract of the device-side location service:
//! a sample is worth evaluating when the device moved at least
//! `distance_interval_m` since the last evaluated sample, or at least
//! `time_interval` elapsed. A zero interval disables that criterion.

use crate::domain::geo::distance_m;
use crate::domain::types::GeoPoint;
use std::time::Duration;

pub struct SampleThrottle {
    distance_interval_m: f64,
    time_interval_ms: u64,
    /// Last evaluated sample (point, epoch ms)
    last: Option<(GeoPoint, u64)>,
}

impl SampleThrottle {
    pub fn new(distance_interval_m: f64, time_interval: Duration) -> Self {
        Self { distance_interval_m, time_interval_ms: time_interval.as_millis() as u64, last: None }
    }

    /// Returns true (and remembers the sample) if it should be evaluated
    pub fn admit(&mut self, point: GeoPoint, now_ms: u64) -> bool {
        let admit = match self.last {
            None => true,
            Some(_) if self.distance_interval_m <= 0.0 && self.time_interval_ms == 0 => true,
            Some((last_point, last_ms)) => {
                let moved = self.distance_interval_m > 0.0
                    && distance_m(last_point, point) >= self.distance_interval_m;
                let waited =
                    self.time_interval_ms > 0 && now_ms.saturating_sub(last_ms) >= self.time_interval_ms;
                moved || waited
            }
        };

        if admit {
            self.last = Some((point, now_ms));
        }
        admit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE_MS: u64 = 60_000;

    fn throttle() -> SampleThrottle {
        SampleThrottle::new(100.0, Duration::from_secs(300))
    }

    #[test]
    fn test_first_sample_admitted() {
        assert!(throttle().admit(GeoPoint::new(51.5, 0.0), 0));
    }

    #[test]
    fn test_small_move_soon_after_is_dropped() {
        let mut throttle = throttle();
        assert!(throttle.admit(GeoPoint::new(51.5, 0.0), 0));
        // ~22 m, one minute later
        assert!(!throttle.admit(GeoPoint::new(51.5002, 0.0), MINUTE_MS));
    }

    #[test]
    fn test_distance_interval_admits() {
        let mut throttle = throttle();
        assert!(throttle.admit(GeoPoint::new(51.5, 0.0), 0));
        // ~111 m
        assert!(throttle.admit(GeoPoint::new(51.501, 0.0), MINUTE_MS));
    }

    #[test]
    fn test_time_interval_admits() {
        let mut throttle = throttle();
        assert!(throttle.admit(GeoPoint::new(51.5, 0.0), 0));
        assert!(!throttle.admit(GeoPoint::new(51.5, 0.0), 5 * MINUTE_MS - 1));
        assert!(throttle.admit(GeoPoint::new(51.5, 0.0), 5 * MINUTE_MS));
    }

    #[test]
    fn test_reference_is_last_admitted_sample() {
        let mut throttle = throttle();
        assert!(throttle.admit(GeoPoint::new(51.5, 0.0), 0));
        // Three ~44 m steps: only the third crosses 100 m from the reference
        assert!(!throttle.admit(GeoPoint::new(51.5004, 0.0), 1_000));
        assert!(!throttle.admit(GeoPoint::new(51.5008, 0.0), 2_000));
        assert!(throttle.admit(GeoPoint::new(51.5012, 0.0), 3_000));
    }


    #[test]
    fn test_zero_intervals_admit_everything() {
        let mut throttle = SampleThrottle::new(0.0, Duration::ZERO);
        let here = GeoPoint::new(51.5, 0.0);
        assert!(throttle.admit(here, 0));
        assert!(throttle.admit(here, 0));
        assert!(throttle.admit(here, 1));
    }
}
