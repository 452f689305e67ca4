//! Entity identifiers.
//!
//! Entities are addressed by `domain.object_id` strings, the shape used by
//! the upstream state sources (`device_tracker.phone_bobby`,
//! `sensor.phone_geocoded_location`, ...).

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AdjacencyError, Result};

static ENTITY_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]+\.[a-z0-9_]+$").expect("entity id regex"));

/// Suffix appended by geocoded location sensors; stripped in short names.
const GEO_SUFFIX: &str = "_geocoded_location";

/// Validate an entity id string (`domain.object_id`, lowercase).
#[must_use]
pub fn is_valid_entity_id(s: &str) -> bool {
    ENTITY_ID_RE.is_match(s)
}

/// A validated `domain.object_id` entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create a validated entity id.
    ///
    /// # Errors
    ///
    /// Returns [`AdjacencyError::InvalidEntityId`] if `id` does not have the
    /// `domain.object_id` shape.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if is_valid_entity_id(&id) {
            Ok(Self(id))
        } else {
            Err(AdjacencyError::InvalidEntityId(id))
        }
    }

    /// The full `domain.object_id` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The domain part (before the dot).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('.').map_or("", |(d, _)| d)
    }

    /// The object id part (after the dot).
    #[must_use]
    pub fn object_id(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(_, o)| o)
    }

    /// Short form used in pair keys: the object id with the geocoded-location
    /// suffix stripped.
    #[must_use]
    pub fn short(&self) -> &str {
        self.object_id().trim_end_matches(GEO_SUFFIX)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for EntityId {
    type Err = AdjacencyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_entity_ids() {
        assert!(is_valid_entity_id("device_tracker.phone_bobby"));
        assert!(is_valid_entity_id("sensor.phone_geocoded_location"));
        assert!(is_valid_entity_id("zone.home"));
        assert!(is_valid_entity_id("sensor.gps2"));
    }

    #[test]
    fn test_invalid_entity_ids() {
        assert!(!is_valid_entity_id("no_dot"));
        assert!(!is_valid_entity_id("two.dots.here"));
        assert!(!is_valid_entity_id("Upper.Case"));
        assert!(!is_valid_entity_id("spaces in.id"));
        assert!(!is_valid_entity_id(""));
        assert!(!is_valid_entity_id(".leading"));
        assert!(!is_valid_entity_id("trailing."));
    }

    #[test]
    fn test_new_rejects_invalid() {
        let err = EntityId::new("not an id").unwrap_err();
        assert!(matches!(err, AdjacencyError::InvalidEntityId(_)));
    }

    #[test]
    fn test_parts() {
        let id = EntityId::new("device_tracker.phone_bobby").unwrap();
        assert_eq!(id.domain(), "device_tracker");
        assert_eq!(id.object_id(), "phone_bobby");
        assert_eq!(id.short(), "phone_bobby");
    }

    #[test]
    fn test_short_strips_geocoded_suffix() {
        let id = EntityId::new("sensor.bobby_geocoded_location").unwrap();
        assert_eq!(id.short(), "bobby");
    }

    #[test]
    fn test_serde_transparent() {
        let id = EntityId::new("zone.home").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"zone.home\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
