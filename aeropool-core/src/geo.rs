use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate, stored (lon, lat) to match GeoJSON ordering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn is_valid(&self) -> bool {
        (-180.0..=180.0).contains(&self.lon) && (-90.0..=90.0).contains(&self.lat)
    }
}

/// Great-circle distance in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

fn bearing_rad(from: GeoPoint, to: GeoPoint) -> f64 {
    let (lat1, lat2) = (from.lat.to_radians(), to.lat.to_radians());
    let dlon = (to.lon - from.lon).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x)
}

/// Distance in meters from `p` to the great-circle segment `a`-`b`.
///
/// Uses the cross-track formula; when the perpendicular foot falls outside
/// the segment the nearest endpoint distance is returned instead.
pub fn point_segment_distance_m(p: GeoPoint, a: GeoPoint, b: GeoPoint) -> f64 {
    let d_ap = haversine_m(a, p);
    if d_ap == 0.0 {
        return 0.0;
    }
    let d_ab = haversine_m(a, b);
    if d_ab == 0.0 {
        return d_ap;
    }

    let delta13 = d_ap / EARTH_RADIUS_M;
    let theta13 = bearing_rad(a, p);
    let theta12 = bearing_rad(a, b);

    let cross_track = (delta13.sin() * (theta13 - theta12).sin()).asin();
    let along_track = (delta13.cos() / cross_track.cos()).acos();

    // Foot of the perpendicular behind A or past B: clamp to endpoints.
    if (theta13 - theta12).cos() < 0.0 {
        return d_ap;
    }
    if along_track * EARTH_RADIUS_M > d_ab {
        return haversine_m(b, p);
    }

    (cross_track.abs() * EARTH_RADIUS_M).min(d_ap)
}

/// Minimum distance in meters from `p` to a polyline of waypoints.
/// A single-point "polyline" degrades to plain point distance.
pub fn polyline_distance_m(p: GeoPoint, route: &[GeoPoint]) -> Option<f64> {
    match route {
        [] => None,
        [only] => Some(haversine_m(p, *only)),
        _ => route
            .windows(2)
            .map(|w| point_segment_distance_m(p, w[0], w[1]))
            .min_by(|x, y| x.total_cmp(y)),
    }
}

/// Latitude/longitude deltas spanning `radius_m` around `center`, used as
/// an index-friendly prefilter before exact great-circle math.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

pub fn bounding_box(center: GeoPoint, radius_m: f64) -> BoundingBox {
    let dlat = (radius_m / EARTH_RADIUS_M).to_degrees();
    let cos_lat = center.lat.to_radians().cos().max(1e-6);
    let dlon = (radius_m / (EARTH_RADIUS_M * cos_lat)).to_degrees();
    BoundingBox {
        min_lon: (center.lon - dlon).max(-180.0),
        max_lon: (center.lon + dlon).min(180.0),
        min_lat: (center.lat - dlat).max(-90.0),
        max_lat: (center.lat + dlat).min(90.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARIS: GeoPoint = GeoPoint { lon: 2.3522, lat: 48.8566 };
    const LONDON: GeoPoint = GeoPoint { lon: -0.1278, lat: 51.5074 };
    const AMS_SCHIPHOL: GeoPoint = GeoPoint { lon: 4.7683, lat: 52.3105 };

    #[test]
    fn haversine_paris_london() {
        let d = haversine_m(PARIS, LONDON);
        // Known great-circle distance is ~343.5 km.
        assert!((d - 343_500.0).abs() < 2_000.0, "got {d}");
    }

    #[test]
    fn haversine_zero_for_same_point() {
        assert_eq!(haversine_m(PARIS, PARIS), 0.0);
    }

    #[test]
    fn segment_distance_on_track_is_small() {
        // Midpoint-ish between Paris and London, nudged slightly off track.
        let near = GeoPoint::new(1.1, 50.2);
        let d = point_segment_distance_m(near, PARIS, LONDON);
        assert!(d < 30_000.0, "got {d}");
        // And it must never exceed the direct endpoint distances.
        assert!(d <= haversine_m(near, PARIS));
        assert!(d <= haversine_m(near, LONDON));
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        // Schiphol lies well off the London-Paris track; the result can
        // never beat the nearest endpoint.
        let d = point_segment_distance_m(AMS_SCHIPHOL, LONDON, PARIS);
        let direct = haversine_m(AMS_SCHIPHOL, PARIS).min(haversine_m(AMS_SCHIPHOL, LONDON));
        assert!(d <= direct + 1.0, "clamped {d} vs direct {direct}");
    }

    #[test]
    fn polyline_distance_picks_nearest_leg() {
        let route = vec![
            GeoPoint::new(2.35, 48.86),
            GeoPoint::new(2.30, 49.20),
            GeoPoint::new(2.55, 49.01), // CDG-ish
        ];
        let p = GeoPoint::new(2.31, 49.18);
        let d = polyline_distance_m(p, &route).unwrap();
        assert!(d < 3_000.0, "got {d}");
        assert!(polyline_distance_m(p, &[]).is_none());
    }

    #[test]
    fn bounding_box_contains_circle() {
        let b = bounding_box(PARIS, 8_000.0);
        let north = GeoPoint::new(PARIS.lon, PARIS.lat + 0.05);
        assert!(b.max_lat > PARIS.lat && b.min_lat < PARIS.lat);
        assert!(b.max_lat < north.lat + 0.1);
        assert!(b.min_lon < PARIS.lon && b.max_lon > PARIS.lon);
    }
}
