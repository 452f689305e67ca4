//! Per-pair proximity state: hysteresis machine, duration and update-count
//! accounting, reliability gating and snapshot assembly.
//!
//! One [`PairState`] exists per (anchor, target) relationship. It is mutated
//! only by its own recompute path; nothing is shared across pairs, so no
//! locking exists anywhere in the core.
//!
//! The hysteresis contract, with `exit >= entry`:
//!
//! - `NOT_NEAR -> NEAR` when `d <= entry` (emits `enter`, count becomes 1)
//! - `NEAR -> NOT_NEAR` when `d >= exit` (emits `leave`, count resets)
//! - anything in between is sticky in both directions

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::debounce::Debouncer;
use crate::entity::EntityId;
use crate::error::{SampleError, Side};
use crate::event::{Event, EventSink};
use crate::geo;
use crate::motion::{MotionState, MotionVerdict};
use crate::sample::{self, CoordinateSample, Observation};

/// Hysteresis decision for one accepted distance: entering needs
/// `d <= entry`, leaving needs `d >= exit`, the band between is sticky.
#[must_use]
pub fn classify_proximity(was_near: bool, d: f64, entry: f64, exit: f64) -> bool {
    if was_near {
        d < exit
    } else {
        d <= entry
    }
}

/// Mutable state of one (anchor, target) pair.
#[derive(Debug)]
pub struct PairState {
    target: EntityId,

    last_valid_anchor: Option<CoordinateSample>,
    last_valid_target: Option<CoordinateSample>,
    last_valid_updated: Option<DateTime<Utc>>,
    last_error: Option<SampleError>,
    data_valid: bool,

    distance_m: Option<f64>,
    bearing_deg: Option<f64>,
    bucket: Option<String>,

    proximity: bool,
    proximity_since: Option<DateTime<Utc>>,
    frozen_duration: Option<Duration>,
    proximity_update_count: u32,

    last_changed: Option<DateTime<Utc>>,
    last_entered: Option<DateTime<Utc>>,
    last_left: Option<DateTime<Utc>>,

    anchor_motion: MotionState,
    target_motion: MotionState,
    anchor_accuracy_m: Option<f64>,
    target_accuracy_m: Option<f64>,

    prev_distance: Option<(f64, DateTime<Utc>)>,
    proximity_reliable: bool,
    unreliable_reason: Option<String>,
    anchor_updates_in_window: u32,
    target_updates_in_window: u32,
    convergence_speed_kmh: Option<f64>,

    pub(crate) debouncer: Debouncer,
}

/// Cached outbound view of one pair, assembled on demand.
#[derive(Debug, Clone, Serialize)]
pub struct PairSnapshot {
    /// The target side of the pair.
    pub target: EntityId,
    /// Raw distance in meters at full precision.
    pub distance_m: Option<f64>,
    /// Distance in kilometers, rounded to one decimal.
    pub distance_km: Option<f64>,
    /// Display value in `display_unit`, rounded to one decimal.
    pub display_value: Option<f64>,
    /// `"m"` or `"km"`.
    pub display_unit: Option<&'static str>,
    /// Ready-to-render text, e.g. `"1.2 km"`.
    pub display_text: Option<String>,
    /// Named distance bucket.
    pub bucket: Option<String>,
    /// Initial bearing from anchor to target, degrees `[0, 360)`.
    pub bearing_deg: Option<f64>,
    /// Current hysteresis classification.
    pub proximity: bool,
    /// Accepted samples since entering proximity (0 while not near).
    pub proximity_update_count: u32,
    /// Minutes in the current proximity state, one decimal.
    pub proximity_duration_min: f64,
    /// Human-friendly duration, e.g. `"1h 5m"`.
    pub proximity_duration_human: String,
    /// Whether the last recompute used valid data.
    pub data_valid: bool,
    /// Rejection reason of the last invalid sample, if any.
    pub last_error: Option<String>,
    /// When valid data last replaced the cached values.
    pub last_valid_updated: Option<DateTime<Utc>>,
    /// When the classification last flipped.
    pub last_changed: Option<DateTime<Utc>>,
    /// When proximity was last entered.
    pub last_entered: Option<DateTime<Utc>>,
    /// When proximity was last left.
    pub last_left: Option<DateTime<Utc>>,
    /// Estimated anchor speed, km/h.
    pub anchor_speed_kmh: Option<f64>,
    /// Estimated target speed, km/h.
    pub target_speed_kmh: Option<f64>,
    /// Reported anchor accuracy, meters.
    pub anchor_accuracy_m: Option<f64>,
    /// Reported target accuracy, meters.
    pub target_accuracy_m: Option<f64>,
    /// Anchor updates within the reliability window.
    pub anchor_updates_in_window: u32,
    /// Target updates within the reliability window.
    pub target_updates_in_window: u32,
    /// Whether the current proximity data is considered reliable.
    pub proximity_reliable: bool,
    /// Why it is not, when it is not.
    pub unreliable_reason: Option<String>,
    /// Speed at which the pair is closing distance, km/h (negative when
    /// separating).
    pub convergence_speed_kmh: Option<f64>,
}

impl PairState {
    /// Fresh state for one target: `NOT_NEAR`, count 0, no data.
    #[must_use]
    pub fn new(target: EntityId) -> Self {
        Self {
            target,
            last_valid_anchor: None,
            last_valid_target: None,
            last_valid_updated: None,
            last_error: None,
            data_valid: false,
            distance_m: None,
            bearing_deg: None,
            bucket: None,
            proximity: false,
            proximity_since: None,
            frozen_duration: None,
            proximity_update_count: 0,
            last_changed: None,
            last_entered: None,
            last_left: None,
            anchor_motion: MotionState::default(),
            target_motion: MotionState::default(),
            anchor_accuracy_m: None,
            target_accuracy_m: None,
            prev_distance: None,
            proximity_reliable: true,
            unreliable_reason: None,
            anchor_updates_in_window: 0,
            target_updates_in_window: 0,
            convergence_speed_kmh: None,
            debouncer: Debouncer::default(),
        }
    }

    /// The target entity of this pair.
    #[must_use]
    pub const fn target(&self) -> &EntityId {
        &self.target
    }

    /// Whether the last recompute used valid data.
    #[must_use]
    pub const fn data_valid(&self) -> bool {
        self.data_valid
    }

    /// Last computed raw distance in meters.
    #[must_use]
    pub const fn distance_m(&self) -> Option<f64> {
        self.distance_m
    }

    /// Current hysteresis classification.
    #[must_use]
    pub const fn proximity(&self) -> bool {
        self.proximity
    }

    /// Accepted samples since entering proximity; 0 while not near.
    #[must_use]
    pub const fn proximity_update_count(&self) -> u32 {
        self.proximity_update_count
    }

    /// Rejection reason of the last invalid sample.
    #[must_use]
    pub const fn last_error(&self) -> Option<SampleError> {
        self.last_error
    }

    /// Elapsed duration of the current proximity state, recomputed on demand
    /// so it stays accurate across sampling gaps. Zero while not near, unless
    /// the frozen-duration option kept the final figure.
    #[must_use]
    pub fn proximity_duration(&self, now: DateTime<Utc>) -> Duration {
        if self.proximity {
            self.proximity_since.map_or_else(Duration::zero, |since| now - since)
        } else {
            self.frozen_duration.unwrap_or_else(Duration::zero)
        }
    }

    /// Duration in minutes, rounded to one decimal.
    #[must_use]
    pub fn proximity_duration_minutes(&self, now: DateTime<Utc>) -> f64 {
        let seconds = self.proximity_duration(now).num_seconds().max(0);
        #[allow(clippy::cast_precision_loss)]
        geo::round1(seconds as f64 / 60.0)
    }

    fn invalidate(&mut self, kind: SampleError) {
        self.data_valid = false;
        self.last_error = Some(kind);
        debug!(entity = %self.target, error = %kind, "sample rejected, keeping last valid data");
    }

    /// Reliability of a proximity decision at the current distance: both
    /// sides must have updated often enough recently, the pair must not be
    /// closing faster than two vehicles could, and neither side may be
    /// resynchronising.
    fn check_reliability(
        &mut self,
        distance_m: f64,
        now: DateTime<Utc>,
        cfg: &EngineConfig,
    ) -> (bool, Option<String>) {
        let mcfg = cfg.motion();
        let anchor_updates = self.anchor_motion.updates_in_window(now, &mcfg);
        let target_updates = self.target_motion.updates_in_window(now, &mcfg);
        self.anchor_updates_in_window = anchor_updates;
        self.target_updates_in_window = target_updates;

        let min = cfg.min_updates_for_proximity;
        if anchor_updates < min {
            return (false, Some(format!("insufficient_updates_anchor ({anchor_updates}<{min})")));
        }
        if target_updates < min {
            return (false, Some(format!("insufficient_updates_target ({target_updates}<{min})")));
        }

        let convergence = self.prev_distance.and_then(|(prev_d, prev_t)| {
            #[allow(clippy::cast_precision_loss)]
            let dt = (now - prev_t).num_milliseconds() as f64 / 1000.0;
            if dt <= 0.0 {
                None
            } else {
                // positive = closing in
                Some((prev_d - distance_m) / dt * 3.6)
            }
        });
        self.convergence_speed_kmh = convergence;

        if let Some(speed) = convergence {
            // two sides approaching head-on can at most sum their speeds
            let max_convergence = cfg.max_speed_kmh * 2.0;
            if cfg.max_speed_kmh > 0.0 && speed > max_convergence {
                return (
                    false,
                    Some(format!("unrealistic_convergence ({speed:.1} > {max_convergence} km/h)")),
                );
            }
        }

        if self.anchor_motion.in_resync_hold(now) {
            return (false, Some("resync_anchor".to_string()));
        }
        if self.target_motion.in_resync_hold(now) {
            return (false, Some("resync_target".to_string()));
        }

        (true, None)
    }

    /// Recompute distance and proximity from the latest observations of both
    /// sides. Runs at most one transition evaluation; events are emitted
    /// synchronously into `sink`.
    #[allow(clippy::too_many_lines)]
    pub fn recompute(
        &mut self,
        cfg: &EngineConfig,
        anchor_obs: Option<&Observation>,
        target_obs: Option<&Observation>,
        now: DateTime<Utc>,
        sink: &mut dyn EventSink,
    ) {
        self.anchor_accuracy_m = anchor_obs.and_then(|o| sample::extract_accuracy(&o.attributes));
        self.target_accuracy_m = target_obs.and_then(|o| sample::extract_accuracy(&o.attributes));

        let Some(anchor_sample) = anchor_obs.and_then(|o| sample::extract_sample(o).ok()) else {
            return self.invalidate(SampleError::InvalidCoordinate);
        };
        let Some(target_sample) = target_obs.and_then(|o| sample::extract_sample(o).ok()) else {
            return self.invalidate(SampleError::InvalidCoordinate);
        };

        if sample::exceeds_accuracy_ceiling(&anchor_sample, cfg.max_accuracy_m)
            || sample::exceeds_accuracy_ceiling(&target_sample, cfg.max_accuracy_m)
        {
            return self.invalidate(SampleError::AccuracyRejected);
        }

        let mcfg = cfg.motion();
        match self.anchor_motion.apply_fix((anchor_sample.lat, anchor_sample.lon), now, &mcfg) {
            MotionVerdict::Resync => return self.invalidate(SampleError::Resync(Side::Anchor)),
            MotionVerdict::SpeedFiltered => {
                return self.invalidate(SampleError::SpeedFiltered(Side::Anchor))
            }
            MotionVerdict::Ok => {}
        }
        match self.target_motion.apply_fix((target_sample.lat, target_sample.lon), now, &mcfg) {
            MotionVerdict::Resync => return self.invalidate(SampleError::Resync(Side::Target)),
            MotionVerdict::SpeedFiltered => {
                return self.invalidate(SampleError::SpeedFiltered(Side::Target))
            }
            MotionVerdict::Ok => {}
        }

        self.anchor_motion.record_update(now, &mcfg);
        self.target_motion.record_update(now, &mcfg);

        let d = geo::haversine_m(
            anchor_sample.lat,
            anchor_sample.lon,
            target_sample.lat,
            target_sample.lon,
        );

        let (reliable, reason) = self.check_reliability(d, now, cfg);
        self.proximity_reliable = reliable;
        self.unreliable_reason = reason.clone();
        self.prev_distance = Some((d, now));

        self.distance_m = Some(d);
        self.bearing_deg = Some(geo::initial_bearing_deg(
            anchor_sample.lat,
            anchor_sample.lon,
            target_sample.lat,
            target_sample.lon,
        ));
        self.bucket = Some(cfg.buckets.classify(d).to_string());
        self.data_valid = true;
        self.last_error = None;
        self.last_valid_updated = Some(now);
        self.last_valid_anchor = Some(anchor_sample);
        self.last_valid_target = Some(target_sample);

        let was_near = self.proximity;
        let near = classify_proximity(was_near, d, cfg.entry_threshold_m, cfg.exit_threshold_m);

        if near && !was_near {
            self.proximity = true;
            self.proximity_since = Some(now);
            self.frozen_duration = None;
            self.proximity_update_count = 1;
            self.last_entered = Some(now);
            self.last_changed = Some(now);
            debug!(entity = %self.target, distance_m = d, reliable, "entered proximity");

            if cfg.require_reliable_proximity && !reliable {
                sink.emit(&Event::EnterUnreliable {
                    entity_a: cfg.anchor.clone(),
                    entity_b: self.target.clone(),
                    distance_m: d,
                    entry_threshold_m: cfg.entry_threshold_m,
                    exit_threshold_m: cfg.exit_threshold_m,
                    proximity_update_count: 1,
                    unreliable_reason: reason.unwrap_or_default(),
                });
            } else {
                sink.emit(&Event::Enter {
                    entity_a: cfg.anchor.clone(),
                    entity_b: self.target.clone(),
                    distance_m: d,
                    entry_threshold_m: cfg.entry_threshold_m,
                    exit_threshold_m: cfg.exit_threshold_m,
                    proximity_update_count: 1,
                });
            }
        } else if !near && was_near {
            self.proximity = false;
            debug!(entity = %self.target, distance_m = d, "left proximity");
            sink.emit(&Event::Leave {
                entity_a: cfg.anchor.clone(),
                entity_b: self.target.clone(),
                distance_m: d,
                entry_threshold_m: cfg.entry_threshold_m,
                exit_threshold_m: cfg.exit_threshold_m,
            });
            if cfg.freeze_duration_on_leave {
                self.frozen_duration = self.proximity_since.map(|since| now - since);
            }
            self.proximity_update_count = 0;
            self.proximity_since = None;
            self.last_left = Some(now);
            self.last_changed = Some(now);
        } else if near {
            self.proximity_update_count += 1;
            if !cfg.require_reliable_proximity || reliable {
                sink.emit(&Event::ProximityUpdate {
                    entity_a: cfg.anchor.clone(),
                    entity_b: self.target.clone(),
                    distance_m: d,
                    proximity_update_count: self.proximity_update_count,
                    is_first_update: self.proximity_update_count == 2,
                });
            }
        }
    }

    /// Assemble the outbound cached view of this pair.
    #[must_use]
    pub fn snapshot(&self, cfg: &EngineConfig, now: DateTime<Utc>) -> PairSnapshot {
        let display = self.distance_m.map(|d| geo::display_distance(d, cfg.force_meters));
        PairSnapshot {
            target: self.target.clone(),
            distance_m: self.distance_m,
            distance_km: self.distance_m.map(|d| geo::round1(d / 1000.0)),
            display_value: display.as_ref().map(|d| d.value),
            display_unit: display.as_ref().map(|d| d.unit),
            display_text: display.map(|d| d.text),
            bucket: self.bucket.clone(),
            bearing_deg: self.bearing_deg,
            proximity: self.proximity,
            proximity_update_count: self.proximity_update_count,
            proximity_duration_min: self.proximity_duration_minutes(now),
            proximity_duration_human: geo::format_duration(
                self.proximity_duration(now).num_seconds(),
            ),
            data_valid: self.data_valid,
            last_error: self.last_error.map(|e| e.to_string()),
            last_valid_updated: self.last_valid_updated,
            last_changed: self.last_changed,
            last_entered: self.last_entered,
            last_left: self.last_left,
            anchor_speed_kmh: self.anchor_motion.speed_kmh().map(geo::round1),
            target_speed_kmh: self.target_motion.speed_kmh().map(geo::round1),
            anchor_accuracy_m: self.anchor_accuracy_m,
            target_accuracy_m: self.target_accuracy_m,
            anchor_updates_in_window: self.anchor_updates_in_window,
            target_updates_in_window: self.target_updates_in_window,
            proximity_reliable: self.proximity_reliable,
            unreliable_reason: self.unreliable_reason.clone(),
            convergence_speed_kmh: self.convergence_speed_kmh.map(geo::round1),
        }
    }
}
