use derive_more::Display;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AttendanceError, AttendanceResult};

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A validated WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Display)]
#[display(fmt = "({}, {})", longitude, latitude)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    /// Rejects non-finite or out-of-range coordinates.
    pub fn new(longitude: f64, latitude: f64) -> AttendanceResult<Self> {
        if !longitude.is_finite()
            || !latitude.is_finite()
            || !(-180.0..=180.0).contains(&longitude)
            || !(-90.0..=90.0).contains(&latitude)
        {
            return Err(AttendanceError::InvalidCoordinates);
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }
}

/// GeoJSON point shape used in stored session documents, coordinates ordered
/// `[longitude, latitude]` for geospatial-index compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoJsonPoint {
    #[serde(rename = "type")]
    #[schema(example = "Point")]
    pub kind: String,
    #[schema(value_type = Vec<f64>, example = json!([85.1414, 25.61]))]
    pub coordinates: [f64; 2],
}

impl From<GeoPoint> for GeoJsonPoint {
    fn from(point: GeoPoint) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [point.longitude, point.latitude],
        }
    }
}

/// Outcome of a distance check against a fence radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FenceDecision {
    pub distance_meters: f64,
    pub within_fence: bool,
}

/// Great-circle distance between `reference` and `candidate` with an
/// admit/reject decision against `radius_meters`. Pure, no I/O.
pub fn evaluate(
    reference: GeoPoint,
    candidate: GeoPoint,
    radius_meters: f64,
) -> AttendanceResult<FenceDecision> {
    let distance_meters = haversine_meters(reference, candidate);
    Ok(FenceDecision {
        distance_meters,
        within_fence: distance_meters <= radius_meters,
    })
}

fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Deployment fence: office reference point, radius, and whether the check
/// is enforced. Disabling keeps the distance computation (it is still logged
/// and returned) but never rejects.
#[derive(Debug, Clone, Copy)]
pub struct GeofencePolicy {
    pub office: GeoPoint,
    pub radius_meters: f64,
    pub enabled: bool,
}

impl GeofencePolicy {
    pub fn new(office: GeoPoint, radius_meters: f64, enabled: bool) -> Self {
        Self {
            office,
            radius_meters,
            enabled,
        }
    }

    /// Gate a candidate location against the fence.
    pub fn admit(&self, candidate: GeoPoint) -> AttendanceResult<FenceDecision> {
        let decision = evaluate(self.office, candidate, self.radius_meters)?;
        if self.enabled && !decision.within_fence {
            return Err(AttendanceError::OutOfRange {
                distance_meters: decision.distance_meters,
                radius_meters: self.radius_meters,
            });
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn office() -> GeoPoint {
        GeoPoint::new(85.1414, 25.6100).unwrap()
    }

    #[test]
    fn distance_to_self_is_zero() {
        let decision = evaluate(office(), office(), 200.0).unwrap();
        assert_eq!(decision.distance_meters, 0.0);
        assert!(decision.within_fence);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = office();
        let b = GeoPoint::new(85.20, 25.58).unwrap();
        let ab = evaluate(a, b, 200.0).unwrap().distance_meters;
        let ba = evaluate(b, a, 200.0).unwrap().distance_meters;
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn five_kilometers_north_measures_within_one_percent() {
        // 5000m along a meridian is 5000 / (pi * R / 180) degrees of latitude.
        let candidate = GeoPoint::new(85.1414, 25.6100 + 0.0449661).unwrap();
        let decision = evaluate(office(), candidate, 200.0).unwrap();
        assert!((decision.distance_meters - 5000.0).abs() < 50.0);
        assert!(!decision.within_fence);
    }

    #[test]
    fn fence_boundary_is_inclusive() {
        let candidate = GeoPoint::new(85.1414, 25.6105).unwrap();
        let distance = evaluate(office(), candidate, f64::MAX)
            .unwrap()
            .distance_meters;

        assert!(
            evaluate(office(), candidate, distance)
                .unwrap()
                .within_fence
        );
        assert!(
            !evaluate(office(), candidate, distance - 0.01)
                .unwrap()
                .within_fence
        );
    }

    #[test]
    fn rejects_out_of_range_and_non_finite_coordinates() {
        assert_matches!(
            GeoPoint::new(85.1414, 90.1),
            Err(AttendanceError::InvalidCoordinates)
        );
        assert_matches!(
            GeoPoint::new(180.5, 25.61),
            Err(AttendanceError::InvalidCoordinates)
        );
        assert_matches!(
            GeoPoint::new(f64::NAN, 25.61),
            Err(AttendanceError::InvalidCoordinates)
        );
        assert_matches!(
            GeoPoint::new(85.1414, f64::INFINITY),
            Err(AttendanceError::InvalidCoordinates)
        );
    }

    #[test]
    fn enforced_policy_rejects_far_candidates_with_distance() {
        let policy = GeofencePolicy::new(office(), 200.0, true);
        let far = GeoPoint::new(85.1414, 25.6100 + 0.0449661).unwrap();

        let err = policy.admit(far).unwrap_err();
        assert_matches!(
            err,
            AttendanceError::OutOfRange { distance_meters, .. } if (distance_meters - 5000.0).abs() < 50.0
        );
    }

    #[test]
    fn disabled_policy_admits_far_candidates_but_reports_distance() {
        let policy = GeofencePolicy::new(office(), 200.0, false);
        let far = GeoPoint::new(85.1414, 25.6100 + 0.0449661).unwrap();

        let decision = policy.admit(far).unwrap();
        assert!(!decision.within_fence);
        assert!(decision.distance_meters > 4000.0);
    }

    #[test]
    fn geojson_point_orders_longitude_first() {
        let json = serde_json::to_value(GeoJsonPoint::from(office())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "Point", "coordinates": [85.1414, 25.61] })
        );
    }
}
