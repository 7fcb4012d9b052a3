// ── Proximity evaluation ──
//
// Great-circle distance between the current fix and an alarm's
// destination, and the in-range verdict every gated operation relies on.

use serde::Serialize;

use crate::model::Coordinate;

/// Mean Earth radius (IUGG) in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Outcome of comparing a position against a target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProximityVerdict {
    pub distance_m: f64,
    pub radius_m: f64,
    pub in_range: bool,
}

/// Proximity of the device to one alarm, recomputed on every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProximityState {
    /// Freshest known position.
    pub position: Option<Coordinate>,
    /// `None` while no position is known.
    pub verdict: Option<ProximityVerdict>,
}

/// Pure distance and radius check with a single shared radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoEvaluator {
    radius_m: f64,
}

impl GeoEvaluator {
    pub fn new(radius_m: f64) -> Self {
        Self { radius_m }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Metres between `current` and `target`, or `None` without a fix.
    pub fn distance_to(&self, current: Option<Coordinate>, target: Coordinate) -> Option<f64> {
        current.map(|c| haversine_m(c, target))
    }

    /// `None` propagates a missing fix; otherwise `distance <= radius`.
    pub fn is_within_radius(&self, current: Option<Coordinate>, target: Coordinate) -> Option<bool> {
        self.distance_to(current, target).map(|d| d <= self.radius_m)
    }

    pub fn verdict(&self, current: Option<Coordinate>, target: Coordinate) -> Option<ProximityVerdict> {
        self.distance_to(current, target).map(|distance_m| ProximityVerdict {
            distance_m,
            radius_m: self.radius_m,
            in_range: distance_m <= self.radius_m,
        })
    }

    pub fn proximity(&self, current: Option<Coordinate>, target: Coordinate) -> ProximityState {
        ProximityState {
            position: current,
            verdict: self.verdict(current, target),
        }
    }
}

/// Haversine distance. Stable for tiny separations and across the
/// antimeridian since only sines of half-differences are used.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points.
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();
    EARTH_RADIUS_M * c
}

/// Destination reached by travelling `distance_m` from `origin` on the
/// given bearing (degrees clockwise from north).
pub fn offset_by(origin: Coordinate, bearing_deg: f64, distance_m: f64) -> Coordinate {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    // Normalize into [-180, 180].
    let lon_deg = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    Coordinate {
        latitude: lat2.to_degrees(),
        longitude: lon_deg,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn tokyo_station() -> Coordinate {
        coord(35.680_959_1, 139.767_306_8)
    }

    #[test]
    fn same_point_is_zero() {
        let g = GeoEvaluator::new(100.0);
        assert_eq!(g.distance_to(Some(tokyo_station()), tokyo_station()), Some(0.0));
        assert_eq!(g.is_within_radius(Some(tokyo_station()), tokyo_station()), Some(true));
    }

    #[test]
    fn missing_fix_propagates() {
        let g = GeoEvaluator::new(100.0);
        assert_eq!(g.distance_to(None, tokyo_station()), None);
        assert_eq!(g.is_within_radius(None, tokyo_station()), None);
        assert!(g.verdict(None, tokyo_station()).is_none());
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = haversine_m(coord(0.0, 0.0), coord(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 5.0, "{d}");
    }

    #[test]
    fn crosses_the_antimeridian_the_short_way() {
        let d = haversine_m(coord(0.0, 179.999), coord(0.0, -179.999));
        assert!(d < 250.0, "{d}");
    }

    #[test]
    fn near_the_pole_longitude_barely_matters() {
        let d = haversine_m(coord(89.9999, 0.0), coord(89.9999, 180.0));
        assert!(d < 30.0, "{d}");
    }

    #[test]
    fn antipodes_do_not_produce_nan() {
        let d = haversine_m(coord(0.0, 0.0), coord(0.0, 180.0));
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn boundary_is_inclusive() {
        let target = tokyo_station();
        let here = offset_by(target, 90.0, 50.0);
        let exact = haversine_m(here, target);
        let g = GeoEvaluator::new(exact);
        assert_eq!(g.is_within_radius(Some(here), target), Some(true));
    }

    #[test]
    fn offset_by_lands_at_requested_distance() {
        let target = tokyo_station();
        for meters in [80.0, 150.0, 5_000.0] {
            let p = offset_by(target, 37.0, meters);
            assert!((haversine_m(p, target) - meters).abs() < 0.01);
        }
    }

    #[test]
    fn verdict_reports_radius() {
        let g = GeoEvaluator::new(100.0);
        let v = g
            .verdict(Some(offset_by(tokyo_station(), 0.0, 150.0)), tokyo_station())
            .unwrap();
        assert!(!v.in_range);
        assert!((v.distance_m - 150.0).abs() < 0.01);
        assert!((v.radius_m - 100.0).abs() < f64::EPSILON);
    }
}
