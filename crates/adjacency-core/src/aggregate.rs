//! Nearest-target aggregation across all pairs of one anchor.
//!
//! Reads pair states, never mutates them. Must be recomputed after every
//! pair mutation that could move the nearest target or flip any proximity.

use serde::Serialize;

use crate::config::EngineConfig;
use crate::entity::EntityId;
use crate::event::{Event, EventSink};
use crate::pair::PairState;

/// Derived multi-target view: the nearest target and the any-proximity OR.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSnapshot {
    /// The anchor entity.
    pub anchor: EntityId,
    /// Configured targets, in stable order.
    pub targets: Vec<EntityId>,
    /// Target with the minimum valid distance, if any.
    pub nearest_target: Option<EntityId>,
    /// Its raw distance in meters.
    pub nearest_distance_m: Option<f64>,
    /// OR over all targets' proximity classifications.
    pub any_proximity: bool,
}

/// Tracks the any-proximity edge so `any_enter` / `any_leave` fire exactly
/// once per crossing.
#[derive(Debug, Default)]
pub struct NearestAggregator {
    prev_any: bool,
}

impl NearestAggregator {
    /// A fresh aggregator with `any_proximity == false`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the aggregate over `pairs` (in stable configured order) and
    /// emit `any_enter` / `any_leave` on an edge.
    ///
    /// Targets with invalid data are excluded from the minimum but still
    /// contribute their last known classification to `any_proximity`.
    pub fn recompute(
        &mut self,
        cfg: &EngineConfig,
        pairs: &[PairState],
        sink: &mut dyn EventSink,
    ) -> AggregateSnapshot {
        let mut nearest_target: Option<EntityId> = None;
        let mut nearest_distance_m: Option<f64> = None;
        let mut any_proximity = false;

        for pair in pairs {
            if pair.data_valid() {
                if let Some(d) = pair.distance_m() {
                    // strictly-less keeps the earliest target on ties
                    if nearest_distance_m.map_or(true, |best| d < best) {
                        nearest_distance_m = Some(d);
                        nearest_target = Some(pair.target().clone());
                    }
                }
            }
            any_proximity = any_proximity || pair.proximity();
        }

        if any_proximity != self.prev_any {
            let event = if any_proximity {
                Event::AnyEnter {
                    anchor: cfg.anchor.clone(),
                    any_proximity,
                    nearest_target: nearest_target.clone(),
                    nearest_distance_m,
                    entry_threshold_m: cfg.entry_threshold_m,
                    exit_threshold_m: cfg.exit_threshold_m,
                }
            } else {
                Event::AnyLeave {
                    anchor: cfg.anchor.clone(),
                    any_proximity,
                    nearest_target: nearest_target.clone(),
                    nearest_distance_m,
                    entry_threshold_m: cfg.entry_threshold_m,
                    exit_threshold_m: cfg.exit_threshold_m,
                }
            };
            sink.emit(&event);
            self.prev_any = any_proximity;
        }

        AggregateSnapshot {
            anchor: cfg.anchor.clone(),
            targets: cfg.targets.clone(),
            nearest_target,
            nearest_distance_m,
            any_proximity,
        }
    }
}
