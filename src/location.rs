//! Coordinates and the record persisted to the remote store.

use chrono::Utc;
use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};

/// A (latitude, longitude) pair describing a point on Earth.
///
/// Both fields are expected to be finite real numbers; fixes that are not
/// are discarded at the device boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Degrees latitude, north positive.
    pub latitude: f64,
    /// Degrees longitude, east positive.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True if both fields are finite real numbers.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Haversine distance to another coordinate, in meters.
    #[must_use]
    pub fn distance_m(self, other: Self) -> f64 {
        let here = Point::new(self.longitude, self.latitude);
        let there = Point::new(other.longitude, other.latitude);
        here.haversine_distance(&there)
    }

    /// The record written to the remote store, stamped with the current time.
    #[must_use]
    pub fn record_now(self) -> LocationRecord {
        LocationRecord {
            latitude: self.latitude,
            longitude: self.longitude,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// The wire form overwriting the remote record path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Degrees latitude, north positive.
    pub latitude: f64,
    /// Degrees longitude, east positive.
    pub longitude: f64,
    /// Capture time, epoch milliseconds.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn test_is_finite() {
        assert!(Coordinate::new(6.5244, 3.3792).is_finite());
        assert!(!Coordinate::new(f64::NAN, 3.3792).is_finite());
        assert!(!Coordinate::new(6.5244, f64::INFINITY).is_finite());
    }

    #[test]
    fn test_distance() {
        let here = Coordinate::new(0.0, 0.0);
        let there = Coordinate::new(0.001, 0.0);

        // 0.001 degrees of latitude is roughly 111 meters
        let distance = here.distance_m(there);
        assert!(
            (distance - 111.2).abs() < 1.0,
            "unexpected distance {distance}"
        );

        assert!(approx_eq!(f64, here.distance_m(here), 0.0));
    }

    #[test]
    fn test_record_has_exactly_three_fields() {
        let record = Coordinate::new(6.5244, 3.3792).record_now();
        let value = serde_json::to_value(record).unwrap();

        let object = value.as_object().unwrap();
        assert_eq!(3, object.len());
        assert!(approx_eq!(
            f64,
            6.5244,
            object["latitude"].as_f64().unwrap()
        ));
        assert!(approx_eq!(
            f64,
            3.3792,
            object["longitude"].as_f64().unwrap()
        ));
        assert!(object["timestamp"].is_i64());
    }
}
