use std::f64::consts::FRAC_PI_2;

use crate::entities::Coordinates;

/// Mean Earth radius.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Great-circle (haversine) distance in miles.
pub fn distance_miles(a: Coordinates, b: Coordinates) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).abs().to_radians();
    let d_lng = (b.lng - a.lng).abs().to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_MILES * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Cheap rectangular pre-filter around a point. Every point within `radius`
/// miles of the center lies inside the box; points inside the box may still
/// be farther than `radius`.
#[derive(Clone, Copy, Debug)]
pub struct BoundingBox {
    center: Coordinates,
    lat_delta: Option<f64>,
    lng_delta: Option<f64>,
}

// absorbs floating point error at the box edges
const MARGIN: f64 = 1e-9;

impl BoundingBox {
    pub fn around(center: Coordinates, radius_miles: f64) -> Self {
        let angular = radius_miles.max(0.0) / EARTH_RADIUS_MILES;

        if !angular.is_finite() || angular >= FRAC_PI_2 {
            return Self {
                center,
                lat_delta: None,
                lng_delta: None,
            };
        }

        let lat_delta = angular.to_degrees();

        // the box reaches a pole: every longitude is in range
        let lng_delta = if center.lat.abs() + lat_delta >= 90.0 {
            None
        } else {
            let ratio = angular.sin() / center.lat.to_radians().cos();
            if ratio >= 1.0 {
                None
            } else {
                Some(ratio.asin().to_degrees())
            }
        };

        Self {
            center,
            lat_delta: Some(lat_delta),
            lng_delta,
        }
    }

    pub fn contains(&self, point: Coordinates) -> bool {
        if let Some(delta) = self.lat_delta {
            if (point.lat - self.center.lat).abs() > delta + MARGIN {
                return false;
            }
        }

        if let Some(delta) = self.lng_delta {
            if wrapped_lng_difference(self.center.lng, point.lng) > delta + MARGIN {
                return false;
            }
        }

        true
    }
}

/// Absolute longitude difference in degrees, taking the short way round the
/// antimeridian.
fn wrapped_lng_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}
