//! Engine configuration: thresholds, debounce, filters and presentation
//! options, with TOML load/save and bound validation.
//!
//! Every bound is checked up front; a violated bound is fatal
//! ([`AdjacencyError::ConfigInvalid`]) and surfaces before any pair state
//! exists.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::entity::{is_valid_entity_id, EntityId};
use crate::error::{AdjacencyError, Result};
use crate::geo::BucketTable;
use crate::motion::MotionConfig;

/// Distance at or below which a pair enters proximity (meters).
pub const DEFAULT_ENTRY_THRESHOLD_M: f64 = 500.0;
/// Distance at or above which a pair leaves proximity (meters).
pub const DEFAULT_EXIT_THRESHOLD_M: f64 = 700.0;
/// Trailing-edge debounce window (seconds).
pub const DEFAULT_DEBOUNCE_SECONDS: f64 = 2.0;
/// Accuracy ceiling (meters); `0` disables the filter.
pub const DEFAULT_MAX_ACCURACY_M: f64 = 200.0;
/// Silence that marks the next fix as a resync (seconds).
pub const DEFAULT_RESYNC_SILENCE_S: f64 = 600.0;
/// Hold window after a resync (seconds).
pub const DEFAULT_RESYNC_HOLD_S: f64 = 60.0;
/// Speeds above this are considered invalid (km/h); `0` disables.
pub const DEFAULT_MAX_SPEED_KMH: f64 = 150.0;
/// Minimum recent updates per side for a reliable proximity entry.
pub const DEFAULT_MIN_UPDATES_FOR_PROXIMITY: u32 = 3;
/// Window for counting recent updates (seconds).
pub const DEFAULT_UPDATE_WINDOW_S: f64 = 300.0;

/// Full engine configuration for one anchor and its targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The reference entity all distances are measured from.
    pub anchor: EntityId,

    /// Tracked entities, in stable order (used for nearest-target ties).
    pub targets: Vec<EntityId>,

    /// Enter proximity at or below this distance (meters).
    #[serde(default = "default_entry_threshold_m")]
    pub entry_threshold_m: f64,

    /// Leave proximity at or above this distance (meters). Must be at least
    /// `entry_threshold_m`; the gap between the two is the hysteresis band.
    #[serde(default = "default_exit_threshold_m")]
    pub exit_threshold_m: f64,

    /// Trailing-edge debounce window in seconds; `0` recomputes immediately.
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: f64,

    /// Reject samples whose reported accuracy exceeds this (meters);
    /// `0` disables the filter.
    #[serde(default = "default_max_accuracy_m")]
    pub max_accuracy_m: f64,

    /// Always display meters, even at or above 1 km.
    #[serde(default)]
    pub force_meters: bool,

    /// Distance bucket boundary table.
    #[serde(default)]
    pub buckets: BucketTable,

    /// Keep reporting the final proximity duration after leave instead of
    /// resetting it to zero.
    #[serde(default)]
    pub freeze_duration_on_leave: bool,

    /// Seconds of silence after which a side's next fix is treated as a
    /// resynchronisation.
    #[serde(default = "default_resync_silence_s")]
    pub resync_silence_s: f64,

    /// Seconds to ignore a side's updates after a resync.
    #[serde(default = "default_resync_hold_s")]
    pub resync_hold_s: f64,

    /// Per-side speed ceiling in km/h; `0` disables the movement filter.
    #[serde(default = "default_max_speed_kmh")]
    pub max_speed_kmh: f64,

    /// Minimum updates per side within `update_window_s` for a proximity
    /// entry to count as reliable.
    #[serde(default = "default_min_updates_for_proximity")]
    pub min_updates_for_proximity: u32,

    /// Reliability window in seconds.
    #[serde(default = "default_update_window_s")]
    pub update_window_s: f64,

    /// When set, an unreliable proximity entry emits `enter_unreliable`
    /// instead of `enter`, and updates are suppressed while unreliable.
    #[serde(default = "default_true")]
    pub require_reliable_proximity: bool,
}

fn default_entry_threshold_m() -> f64 {
    DEFAULT_ENTRY_THRESHOLD_M
}
fn default_exit_threshold_m() -> f64 {
    DEFAULT_EXIT_THRESHOLD_M
}
fn default_debounce_seconds() -> f64 {
    DEFAULT_DEBOUNCE_SECONDS
}
fn default_max_accuracy_m() -> f64 {
    DEFAULT_MAX_ACCURACY_M
}
fn default_resync_silence_s() -> f64 {
    DEFAULT_RESYNC_SILENCE_S
}
fn default_resync_hold_s() -> f64 {
    DEFAULT_RESYNC_HOLD_S
}
fn default_max_speed_kmh() -> f64 {
    DEFAULT_MAX_SPEED_KMH
}
fn default_min_updates_for_proximity() -> u32 {
    DEFAULT_MIN_UPDATES_FOR_PROXIMITY
}
fn default_update_window_s() -> f64 {
    DEFAULT_UPDATE_WINDOW_S
}
fn default_true() -> bool {
    true
}

impl EngineConfig {
    /// Configuration with default options for the given anchor and targets.
    #[must_use]
    pub fn new(anchor: EntityId, targets: Vec<EntityId>) -> Self {
        Self {
            anchor,
            targets,
            entry_threshold_m: DEFAULT_ENTRY_THRESHOLD_M,
            exit_threshold_m: DEFAULT_EXIT_THRESHOLD_M,
            debounce_seconds: DEFAULT_DEBOUNCE_SECONDS,
            max_accuracy_m: DEFAULT_MAX_ACCURACY_M,
            force_meters: false,
            buckets: BucketTable::default(),
            freeze_duration_on_leave: false,
            resync_silence_s: DEFAULT_RESYNC_SILENCE_S,
            resync_hold_s: DEFAULT_RESYNC_HOLD_S,
            max_speed_kmh: DEFAULT_MAX_SPEED_KMH,
            min_updates_for_proximity: DEFAULT_MIN_UPDATES_FOR_PROXIMITY,
            update_window_s: DEFAULT_UPDATE_WINDOW_S,
            require_reliable_proximity: true,
        }
    }

    /// Validate every bound.
    ///
    /// # Errors
    ///
    /// Returns [`AdjacencyError::ConfigInvalid`] naming the first violated
    /// field.
    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &'static str, message: impl Into<String>) -> AdjacencyError {
            AdjacencyError::ConfigInvalid {
                field,
                message: message.into(),
            }
        }

        if !is_valid_entity_id(self.anchor.as_str()) {
            return Err(invalid("anchor", format!("'{}' is not an entity id", self.anchor)));
        }
        if self.targets.is_empty() {
            return Err(invalid("targets", "at least one target is required"));
        }
        for t in &self.targets {
            if !is_valid_entity_id(t.as_str()) {
                return Err(invalid("targets", format!("'{t}' is not an entity id")));
            }
            if *t == self.anchor {
                return Err(invalid("targets", format!("'{t}' is also the anchor")));
            }
        }
        if !(self.entry_threshold_m.is_finite() && self.entry_threshold_m > 0.0) {
            return Err(invalid("entry_threshold_m", "must be a positive number"));
        }
        if !self.exit_threshold_m.is_finite() || self.exit_threshold_m < self.entry_threshold_m {
            return Err(invalid(
                "exit_threshold_m",
                format!(
                    "must be >= entry_threshold_m ({} < {})",
                    self.exit_threshold_m, self.entry_threshold_m
                ),
            ));
        }
        if !(self.debounce_seconds.is_finite() && self.debounce_seconds >= 0.0) {
            return Err(invalid("debounce_seconds", "must be >= 0"));
        }
        if !(self.max_accuracy_m.is_finite() && self.max_accuracy_m >= 0.0) {
            return Err(invalid("max_accuracy_m", "must be >= 0 (0 disables)"));
        }
        if !(self.max_speed_kmh.is_finite() && self.max_speed_kmh >= 0.0) {
            return Err(invalid("max_speed_kmh", "must be >= 0 (0 disables)"));
        }
        if !(self.resync_silence_s.is_finite() && self.resync_silence_s >= 0.0) {
            return Err(invalid("resync_silence_s", "must be >= 0"));
        }
        if !(self.resync_hold_s.is_finite() && self.resync_hold_s >= 0.0) {
            return Err(invalid("resync_hold_s", "must be >= 0"));
        }
        if !(self.update_window_s.is_finite() && self.update_window_s > 0.0) {
            return Err(invalid("update_window_s", "must be > 0"));
        }
        if self.min_updates_for_proximity == 0 {
            return Err(invalid("min_updates_for_proximity", "must be >= 1"));
        }
        self.buckets.validate()?;
        Ok(())
    }

    /// The debounce window as a duration.
    #[must_use]
    pub fn debounce_duration(&self) -> Duration {
        #[allow(clippy::cast_possible_truncation)]
        Duration::milliseconds((self.debounce_seconds * 1000.0) as i64)
    }

    /// The movement-filter slice of this configuration.
    #[must_use]
    pub const fn motion(&self) -> MotionConfig {
        MotionConfig {
            resync_silence_s: self.resync_silence_s,
            resync_hold_s: self.resync_hold_s,
            max_speed_kmh: self.max_speed_kmh,
            update_window_s: self.update_window_s,
        }
    }

    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, unparseable or
    /// fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AdjacencyError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default configuration file path.
    ///
    /// On Linux: `/etc/adjacency/config.toml`; elsewhere the per-user config
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no config directory can be determined.
    pub fn default_path() -> Result<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            Ok(PathBuf::from("/etc/adjacency/config.toml"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "adjacency").ok_or_else(|| {
                AdjacencyError::ConfigParse("cannot determine config directory".into())
            })?;
            Ok(dirs.config_dir().join("config.toml"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> EngineConfig {
        EngineConfig::new(
            EntityId::new("zone.home").unwrap(),
            vec![
                EntityId::new("device_tracker.phone_bobby").unwrap(),
                EntityId::new("device_tracker.phone_jane").unwrap(),
            ],
        )
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_exit_below_entry_is_fatal() {
        let mut cfg = valid_config();
        cfg.entry_threshold_m = 700.0;
        cfg.exit_threshold_m = 500.0;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(
            err,
            AdjacencyError::ConfigInvalid { field: "exit_threshold_m", .. }
        ));
    }

    #[test]
    fn test_equal_thresholds_are_allowed() {
        let mut cfg = valid_config();
        cfg.entry_threshold_m = 500.0;
        cfg.exit_threshold_m = 500.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_nonpositive_entry_rejected() {
        let mut cfg = valid_config();
        cfg.entry_threshold_m = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_negative_debounce_rejected() {
        let mut cfg = valid_config();
        cfg.debounce_seconds = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_empty_targets_rejected() {
        let mut cfg = valid_config();
        cfg.targets.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_anchor_as_target_rejected() {
        let mut cfg = valid_config();
        cfg.targets.push(cfg.anchor.clone());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_debounce_duration() {
        let mut cfg = valid_config();
        cfg.debounce_seconds = 2.5;
        assert_eq!(cfg.debounce_duration(), Duration::milliseconds(2500));
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = valid_config();
        cfg.force_meters = true;
        cfg.freeze_duration_on_leave = true;
        cfg.max_speed_kmh = 120.0;
        cfg.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.anchor, cfg.anchor);
        assert_eq!(loaded.targets, cfg.targets);
        assert!(loaded.force_meters);
        assert!(loaded.freeze_duration_on_leave);
        assert!((loaded.max_speed_kmh - 120.0).abs() < 1e-9);
        assert_eq!(loaded.buckets, cfg.buckets);
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load("/nonexistent/adjacency/config.toml").unwrap_err();
        assert!(matches!(err, AdjacencyError::ConfigNotFound(_)));
    }

    #[test]
    fn test_load_rejects_invalid_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
anchor = "zone.home"
targets = ["device_tracker.phone"]
entry_threshold_m = 700.0
exit_threshold_m = 500.0
"#,
        )
        .unwrap();
        let err = EngineConfig::load(&path).unwrap_err();
        assert!(matches!(err, AdjacencyError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
anchor = "zone.home"
targets = ["device_tracker.phone"]
"#,
        )
        .unwrap();
        let cfg = EngineConfig::load(&path).unwrap();
        assert!((cfg.entry_threshold_m - DEFAULT_ENTRY_THRESHOLD_M).abs() < 1e-9);
        assert!((cfg.exit_threshold_m - DEFAULT_EXIT_THRESHOLD_M).abs() < 1e-9);
        assert!(cfg.require_reliable_proximity);
        assert_eq!(cfg.buckets, BucketTable::default());
    }
}
