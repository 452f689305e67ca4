//! Coordinate extraction and accuracy filtering.
//!
//! Raw observations arrive as an opaque state value plus an attribute map.
//! Three coordinate shapes are recognized, tried in fixed priority order:
//!
//! 1. A `Location` attribute holding a two-element `[lat, lon]` array
//!    (geocoded mobile-app sensors).
//! 2. Separate `latitude` / `longitude` attributes (trackers, zones).
//! 3. A state string of the form `"lat,lon"`.
//!
//! A shape that structurally matches but fails to parse claims the
//! observation: extraction fails rather than falling through to a weaker
//! shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityId;
use crate::error::SampleError;

/// Attribute map attached to an observation.
pub type Attributes = serde_json::Map<String, Value>;

/// Accuracy attribute names, first present wins.
pub const ACCURACY_ATTRIBUTES: [&str; 3] = ["gps_accuracy", "accuracy", "horizontal_accuracy"];

/// A raw state notification for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// The entity this observation describes.
    pub entity_id: EntityId,
    /// The entity's state value (may itself encode coordinates).
    #[serde(default)]
    pub state_value: String,
    /// Free-form attribute map.
    #[serde(default)]
    pub attributes: Attributes,
    /// When the observation was taken.
    pub observed_at: DateTime<Utc>,
}

/// A validated position sample. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoordinateSample {
    /// Latitude in degrees, `[-90, 90]`.
    pub lat: f64,
    /// Longitude in degrees, `[-180, 180]`.
    pub lon: f64,
    /// Reported horizontal accuracy in meters, if any.
    pub accuracy_m: Option<f64>,
    /// Timestamp carried over from the observation.
    pub observed_at: DateTime<Utc>,
}

/// The coordinate shapes recognized by the extractor, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSource {
    /// `Location: [lat, lon]` attribute.
    LocationArray,
    /// `latitude` / `longitude` attribute pair.
    LatLonAttributes,
    /// `"lat,lon"` state string.
    StateString,
}

/// Outcome of trying one coordinate shape against an observation.
enum ParseOutcome {
    /// The shape is absent; try the next one.
    NoMatch,
    /// The shape is present but unparseable or out of range.
    Invalid,
    /// Parsed coordinates.
    Coords(f64, f64),
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn in_range(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

fn checked(lat: f64, lon: f64) -> ParseOutcome {
    if in_range(lat, lon) {
        ParseOutcome::Coords(lat, lon)
    } else {
        ParseOutcome::Invalid
    }
}

fn try_location_array(attrs: &Attributes) -> ParseOutcome {
    let Some(Value::Array(loc)) = attrs.get("Location") else {
        return ParseOutcome::NoMatch;
    };
    if loc.len() != 2 {
        return ParseOutcome::NoMatch;
    }
    match (value_as_f64(&loc[0]), value_as_f64(&loc[1])) {
        (Some(lat), Some(lon)) => checked(lat, lon),
        _ => ParseOutcome::Invalid,
    }
}

fn try_lat_lon_attributes(attrs: &Attributes) -> ParseOutcome {
    let (Some(lat_v), Some(lon_v)) = (attrs.get("latitude"), attrs.get("longitude")) else {
        return ParseOutcome::NoMatch;
    };
    match (value_as_f64(lat_v), value_as_f64(lon_v)) {
        (Some(lat), Some(lon)) => checked(lat, lon),
        _ => ParseOutcome::Invalid,
    }
}

fn try_state_string(state: &str) -> ParseOutcome {
    if !state.contains(',') {
        return ParseOutcome::NoMatch;
    }
    let parts: Vec<&str> = state.split(',').map(str::trim).collect();
    if parts.len() != 2 {
        return ParseOutcome::NoMatch;
    }
    match (parts[0].parse::<f64>(), parts[1].parse::<f64>()) {
        (Ok(lat), Ok(lon)) => checked(lat, lon),
        _ => ParseOutcome::Invalid,
    }
}

fn try_source(source: CoordinateSource, obs: &Observation) -> ParseOutcome {
    match source {
        CoordinateSource::LocationArray => try_location_array(&obs.attributes),
        CoordinateSource::LatLonAttributes => try_lat_lon_attributes(&obs.attributes),
        CoordinateSource::StateString => try_state_string(&obs.state_value),
    }
}

/// Extract the reported accuracy in meters, if any attribute carries one.
#[must_use]
pub fn extract_accuracy(attrs: &Attributes) -> Option<f64> {
    ACCURACY_ATTRIBUTES
        .iter()
        .filter_map(|k| attrs.get(*k))
        .find_map(value_as_f64)
}

/// Parse an observation into a validated [`CoordinateSample`].
///
/// # Errors
///
/// Returns [`SampleError::InvalidCoordinate`] when no shape matches or the
/// matched shape carries unparseable / out-of-range values.
pub fn extract_sample(obs: &Observation) -> Result<CoordinateSample, SampleError> {
    const PRIORITY: [CoordinateSource; 3] = [
        CoordinateSource::LocationArray,
        CoordinateSource::LatLonAttributes,
        CoordinateSource::StateString,
    ];

    for source in PRIORITY {
        match try_source(source, obs) {
            ParseOutcome::NoMatch => {}
            ParseOutcome::Invalid => return Err(SampleError::InvalidCoordinate),
            ParseOutcome::Coords(lat, lon) => {
                return Ok(CoordinateSample {
                    lat,
                    lon,
                    accuracy_m: extract_accuracy(&obs.attributes),
                    observed_at: obs.observed_at,
                })
            }
        }
    }
    Err(SampleError::InvalidCoordinate)
}

/// Accuracy ceiling check. `max_accuracy_m == 0` disables filtering; a
/// sample without a reported accuracy always passes.
#[must_use]
pub fn exceeds_accuracy_ceiling(sample: &CoordinateSample, max_accuracy_m: f64) -> bool {
    if max_accuracy_m <= 0.0 {
        return false;
    }
    sample.accuracy_m.is_some_and(|acc| acc > max_accuracy_m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obs(state: &str, attributes: Value) -> Observation {
        let Value::Object(attributes) = attributes else {
            panic!("attributes must be an object")
        };
        Observation {
            entity_id: EntityId::new("device_tracker.phone").unwrap(),
            state_value: state.to_string(),
            attributes,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_location_array_shape() {
        let o = obs("home", json!({ "Location": [37.5665, 126.9780] }));
        let s = extract_sample(&o).unwrap();
        assert!((s.lat - 37.5665).abs() < 1e-9);
        assert!((s.lon - 126.9780).abs() < 1e-9);
    }

    #[test]
    fn test_location_array_with_string_elements() {
        let o = obs("home", json!({ "Location": ["37.5", "127.0"] }));
        let s = extract_sample(&o).unwrap();
        assert!((s.lat - 37.5).abs() < 1e-9);
    }

    #[test]
    fn test_lat_lon_attributes_shape() {
        let o = obs("not_home", json!({ "latitude": 35.1796, "longitude": 129.0756 }));
        let s = extract_sample(&o).unwrap();
        assert!((s.lat - 35.1796).abs() < 1e-9);
    }

    #[test]
    fn test_state_string_shape() {
        let o = obs("37.5665, 126.9780", json!({}));
        let s = extract_sample(&o).unwrap();
        assert!((s.lon - 126.9780).abs() < 1e-9);
    }

    #[test]
    fn test_priority_location_array_wins() {
        let o = obs(
            "1.0,2.0",
            json!({ "Location": [10.0, 20.0], "latitude": 30.0, "longitude": 40.0 }),
        );
        let s = extract_sample(&o).unwrap();
        assert!((s.lat - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_matched_shape_claims_the_observation() {
        // Location is present with two elements but unparseable; extraction
        // must fail rather than fall back to the valid lat/lon attributes.
        let o = obs(
            "x",
            json!({ "Location": ["nope", "also nope"], "latitude": 30.0, "longitude": 40.0 }),
        );
        assert_eq!(extract_sample(&o).unwrap_err(), SampleError::InvalidCoordinate);
    }

    #[test]
    fn test_short_location_array_falls_through() {
        let o = obs("x", json!({ "Location": [1.0], "latitude": 30.0, "longitude": 40.0 }));
        let s = extract_sample(&o).unwrap();
        assert!((s.lat - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let o = obs("x", json!({ "latitude": 91.0, "longitude": 0.0 }));
        assert!(extract_sample(&o).is_err());

        let o = obs("x", json!({ "latitude": 0.0, "longitude": -180.5 }));
        assert!(extract_sample(&o).is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        let o = obs("NaN,10.0", json!({}));
        assert!(extract_sample(&o).is_err());
    }

    #[test]
    fn test_nothing_matches() {
        let o = obs("home", json!({ "battery": 85 }));
        assert_eq!(extract_sample(&o).unwrap_err(), SampleError::InvalidCoordinate);
    }

    #[test]
    fn test_accuracy_attribute_priority() {
        let attrs = json!({ "accuracy": 30.0, "gps_accuracy": 12.0 });
        let Value::Object(attrs) = attrs else { unreachable!() };
        assert!((extract_accuracy(&attrs).unwrap() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_carried_on_sample() {
        let o = obs("x", json!({ "latitude": 1.0, "longitude": 2.0, "gps_accuracy": 25.5 }));
        let s = extract_sample(&o).unwrap();
        assert!((s.accuracy_m.unwrap() - 25.5).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_ceiling() {
        let s = CoordinateSample {
            lat: 0.0,
            lon: 0.0,
            accuracy_m: Some(250.0),
            observed_at: Utc::now(),
        };
        assert!(exceeds_accuracy_ceiling(&s, 200.0));
        assert!(!exceeds_accuracy_ceiling(&s, 250.0));
        // zero disables filtering entirely
        assert!(!exceeds_accuracy_ceiling(&s, 0.0));

        let no_acc = CoordinateSample { accuracy_m: None, ..s };
        assert!(!exceeds_accuracy_ceiling(&no_acc, 200.0));
    }
}
