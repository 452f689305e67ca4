//! Great-circle geometry, distance buckets and display formatting.
//!
//! Distances are always computed and stored in raw meters at full floating
//! precision. Rounding to one decimal place and the m/km unit switch are
//! presentation helpers that never feed back into stored values.

use serde::{Deserialize, Serialize};

use crate::error::{AdjacencyError, Result};

/// Mean Earth radius in meters, as used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two `(lat, lon)` points.
#[must_use]
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing (forward azimuth) in degrees from point 1 to point 2,
/// normalized to `[0, 360)`.
#[must_use]
pub fn initial_bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Round to one decimal place, the display precision used everywhere.
#[must_use]
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Named distance classification derived from raw meters.
///
/// The boundary values are configurable; the default matches
/// `very_near < 50 <= near < 200 <= mid < 1000 <= far < 5000 <= very_far`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketTable {
    /// Ascending upper bounds in meters. One fewer than `names`.
    pub cuts: Vec<f64>,
    /// Bucket names, outermost last (the catch-all above the final cut).
    pub names: Vec<String>,
}

impl Default for BucketTable {
    fn default() -> Self {
        Self {
            cuts: vec![50.0, 200.0, 1000.0, 5000.0],
            names: vec![
                "very_near".to_string(),
                "near".to_string(),
                "mid".to_string(),
                "far".to_string(),
                "very_far".to_string(),
            ],
        }
    }
}

impl BucketTable {
    /// Classify a distance. Pure in `distance_m` and the table.
    #[must_use]
    pub fn classify(&self, distance_m: f64) -> &str {
        for (cut, name) in self.cuts.iter().zip(&self.names) {
            if distance_m < *cut {
                return name;
            }
        }
        self.names.last().map_or("", String::as_str)
    }

    /// Check table shape: names one longer than cuts, cuts strictly ascending.
    ///
    /// # Errors
    ///
    /// Returns [`AdjacencyError::ConfigInvalid`] on a malformed table.
    pub fn validate(&self) -> Result<()> {
        if self.names.len() != self.cuts.len() + 1 {
            return Err(AdjacencyError::ConfigInvalid {
                field: "buckets",
                message: format!(
                    "expected {} names for {} cuts, got {}",
                    self.cuts.len() + 1,
                    self.cuts.len(),
                    self.names.len()
                ),
            });
        }
        for pair in self.cuts.windows(2) {
            if pair[1] <= pair[0] {
                return Err(AdjacencyError::ConfigInvalid {
                    field: "buckets",
                    message: format!("cuts must be strictly ascending, got {} after {}", pair[1], pair[0]),
                });
            }
        }
        if self.cuts.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return Err(AdjacencyError::ConfigInvalid {
                field: "buckets",
                message: "cuts must be finite and positive".into(),
            });
        }
        Ok(())
    }
}

/// A distance prepared for display: value rounded to one decimal, unit
/// selected (meters below 1 km, kilometers at or above, unless forced).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayDistance {
    /// Rounded value in `unit`.
    pub value: f64,
    /// `"m"` or `"km"`.
    pub unit: &'static str,
    /// `"823.4 m"` / `"1.2 km"`.
    pub text: String,
}

/// Format a raw meter distance for display.
#[must_use]
pub fn display_distance(meters: f64, force_meters: bool) -> DisplayDistance {
    if force_meters || meters < 1000.0 {
        let value = round1(meters);
        DisplayDistance {
            value,
            unit: "m",
            text: format!("{value} m"),
        }
    } else {
        let value = round1(meters / 1000.0);
        DisplayDistance {
            value,
            unit: "km",
            text: format!("{value} km"),
        }
    }
}

/// Human-friendly duration, minute granularity: `"2d 3h 5m"`, `"0m"`.
#[must_use]
pub fn format_duration(total_seconds: i64) -> String {
    if total_seconds <= 0 {
        return "0m".to_string();
    }
    #[allow(clippy::cast_possible_truncation)]
    let total_minutes = ((total_seconds as f64) / 60.0).round() as i64;
    if total_minutes <= 0 {
        return "0m".to_string();
    }

    let days = total_minutes / (24 * 60);
    let rem = total_minutes % (24 * 60);
    let hours = rem / 60;
    let minutes = rem % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if parts.is_empty() {
        "0m".to_string()
    } else {
        parts.join(" ")
    }
}
