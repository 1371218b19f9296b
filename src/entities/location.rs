use geo_types::{Geometry, Point};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl From<Coordinates> for Point<f64> {
    fn from(coordinates: Coordinates) -> Self {
        Point::new(coordinates.lng, coordinates.lat)
    }
}

impl From<Coordinates> for Geometry<f64> {
    fn from(coordinates: Coordinates) -> Self {
        Geometry::Point(coordinates.into())
    }
}

/// A postcode together with the coordinates it resolved to. Only canonical
/// (normalized) postcodes are stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub postcode: String,
    pub coordinates: Coordinates,
}

impl Location {
    pub fn new(postcode: String, coordinates: Coordinates) -> Self {
        Self {
            postcode,
            coordinates,
        }
    }
}

#[test]
fn coordinates_to_point_uses_lng_as_x() {
    let point: Point<f64> = Coordinates::new(53.4, -2.16).into();
    assert_eq!(point.x(), -2.16);
    assert_eq!(point.y(), 53.4);
}

#[test]
fn out_of_range_coordinates_are_invalid() {
    assert!(Coordinates::new(53.4, -2.16).is_valid());
    assert!(!Coordinates::new(91.0, 0.0).is_valid());
    assert!(!Coordinates::new(0.0, f64::NAN).is_valid());
}
