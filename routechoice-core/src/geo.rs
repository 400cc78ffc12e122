//! Geographic coordinate pairs used by scenario endpoints.
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `[latitude, longitude]` pair, serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng(pub f64, pub f64);

impl LatLng {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self(lat, lng)
    }

    #[must_use]
    pub const fn lat(self) -> f64 {
        self.0
    }

    #[must_use]
    pub const fn lng(self) -> f64 {
        self.1
    }

    /// True when latitude is within [-90, 90] and longitude within [-180, 180].
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0.is_finite()
            && self.1.is_finite()
            && (-90.0..=90.0).contains(&self.0)
            && (-180.0..=180.0).contains(&self.1)
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.0, self.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_pair() {
        let point = LatLng::new(45.0, -75.5);
        assert_eq!(serde_json::to_string(&point).unwrap(), "[45.0,-75.5]");
        let back: LatLng = serde_json::from_str("[45, -75.5]").unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn validates_ranges() {
        assert!(LatLng::new(90.0, -180.0).is_valid());
        assert!(!LatLng::new(90.5, 0.0).is_valid());
        assert!(!LatLng::new(0.0, 181.0).is_valid());
        assert!(!LatLng::new(f64::NAN, 0.0).is_valid());
    }
}
