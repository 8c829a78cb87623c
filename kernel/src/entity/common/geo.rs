use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance in kilometers. Good enough for the
    /// bounding-circle availability filter; this is not a spatial index.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlng = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * a.sqrt().asin() * EARTH_RADIUS_KM
    }
}

#[cfg(test)]
mod test {
    use super::GeoPoint;

    #[test]
    fn zero_distance_to_self() {
        let p = GeoPoint::new(23.8103, 90.4125);
        assert!(p.distance_km(&p) < 1e-9);
    }

    #[test]
    fn known_distance_is_close() {
        // Dhaka to Chattogram, roughly 215 km as the crow flies.
        let dhaka = GeoPoint::new(23.8103, 90.4125);
        let chattogram = GeoPoint::new(22.3569, 91.7832);
        let d = dhaka.distance_km(&chattogram);
        assert!((200.0..230.0).contains(&d), "unexpected distance {d}");
    }
}
