use serde::{Deserialize, Serialize};

/// Geographic bounding rectangle of a track, in decimal degrees.
///
/// An empty rectangle (no points seen yet) is represented by inverted
/// extremes so that `extend` works without a special first case.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default = "empty_min")]
    pub min_lat: f64,
    #[serde(default = "empty_min")]
    pub min_lon: f64,
    #[serde(default = "empty_max")]
    pub max_lat: f64,
    #[serde(default = "empty_max")]
    pub max_lon: f64,
}

fn empty_min() -> f64 {
    f64::MAX
}

fn empty_max() -> f64 {
    f64::MIN
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds::empty()
    }
}

impl Bounds {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Bounds {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    pub fn empty() -> Self {
        Bounds {
            min_lat: empty_min(),
            min_lon: empty_min(),
            max_lat: empty_max(),
            max_lon: empty_max(),
        }
    }

    /// False when any edge is NaN or infinite. Such bounds cannot be stored.
    pub fn is_finite(&self) -> bool {
        [self.min_lat, self.min_lon, self.max_lat, self.max_lon]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn is_empty(&self) -> bool {
        self.min_lat > self.max_lat || self.min_lon > self.max_lon
    }

    /// Grow the rectangle to include the given point.
    pub fn extend(&mut self, lat: f64, lon: f64) {
        self.min_lat = self.min_lat.min(lat);
        self.min_lon = self.min_lon.min(lon);
        self.max_lat = self.max_lat.max(lat);
        self.max_lon = self.max_lon.max(lon);
    }

    /// Center point as `(lat, lon)`, or `None` for an empty rectangle.
    pub fn center(&self) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }
        Some((
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        ))
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bounds_have_no_center() {
        let b = Bounds::empty();
        assert!(b.is_empty());
        assert!(b.center().is_none());
        assert!(!b.contains(0.0, 0.0));
    }

    #[test]
    fn extend_grows_to_cover_points() {
        let mut b = Bounds::empty();
        b.extend(52.0, 13.0);
        b.extend(53.0, 14.0);
        assert!(!b.is_empty());
        assert_eq!(b, Bounds::new(52.0, 13.0, 53.0, 14.0));
        assert_eq!(b.center(), Some((52.5, 13.5)));
        assert!(b.contains(52.5, 13.2));
        assert!(!b.contains(51.9, 13.2));
    }

    #[test]
    fn missing_fields_deserialize_as_empty() {
        let b: Bounds = serde_json::from_str("{}").unwrap();
        assert!(b.is_empty());
    }
}
