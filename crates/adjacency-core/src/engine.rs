//! The engine: observation intake, debounced recomputes and the subscriber
//! surface, tying every other module together.
//!
//! The engine is synchronous and single-threaded by construction. Callers
//! feed it observations and drive its timers; it never spawns, sleeps or
//! reads the wall clock behind the caller's back. An async shell owns the
//! actual waiting and calls [`AdjacencyEngine::run_due_timers`] when
//! [`AdjacencyEngine::next_deadline`] elapses.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::aggregate::{AggregateSnapshot, NearestAggregator};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::entity::EntityId;
use crate::error::{AdjacencyError, Result};
use crate::event::{Event, EventBus, SubscriptionId};
use crate::pair::{PairSnapshot, PairState};
use crate::sample::Observation;

/// Outbound request for a fresh location fix, issued on manual refresh.
///
/// Fire-and-forget: the engine does not wait for a response. New fixes, if
/// any, arrive later as ordinary observations.
pub trait RefreshRequester {
    /// Ask the location source of `entity_id` for a fresh fix.
    fn request_location_update(&mut self, entity_id: &EntityId);
}

/// Proximity engine for one anchor and its configured targets.
pub struct AdjacencyEngine<C: Clock = SystemClock> {
    config: EngineConfig,
    clock: C,
    latest: HashMap<EntityId, Observation>,
    pairs: Vec<PairState>,
    aggregator: NearestAggregator,
    aggregate: AggregateSnapshot,
    bus: EventBus,
    requester: Option<Box<dyn RefreshRequester + Send>>,
}

impl<C: Clock> std::fmt::Debug for AdjacencyEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdjacencyEngine")
            .field("anchor", &self.config.anchor)
            .field("pairs", &self.pairs.len())
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl AdjacencyEngine<SystemClock> {
    /// Engine on the wall clock.
    ///
    /// # Errors
    ///
    /// Returns [`AdjacencyError::ConfigInvalid`] if the configuration fails
    /// validation.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> AdjacencyEngine<C> {
    /// Engine on an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`AdjacencyError::ConfigInvalid`] if the configuration fails
    /// validation.
    pub fn with_clock(config: EngineConfig, clock: C) -> Result<Self> {
        config.validate()?;
        let pairs = config.targets.iter().map(|t| PairState::new(t.clone())).collect();
        let aggregate = AggregateSnapshot {
            anchor: config.anchor.clone(),
            targets: config.targets.clone(),
            nearest_target: None,
            nearest_distance_m: None,
            any_proximity: false,
        };
        info!(anchor = %config.anchor, targets = config.targets.len(), "engine initialized");
        Ok(Self {
            config,
            clock,
            latest: HashMap::new(),
            pairs,
            aggregator: NearestAggregator::new(),
            aggregate,
            bus: EventBus::new(),
            requester: None,
        })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install the outbound refresh requester used by [`Self::force_refresh`].
    pub fn set_requester(&mut self, requester: Box<dyn RefreshRequester + Send>) {
        self.requester = Some(requester);
    }

    /// Register an event subscriber.
    pub fn subscribe(&mut self, f: impl FnMut(&Event) + Send + 'static) -> SubscriptionId {
        self.bus.subscribe(f)
    }

    /// Remove an event subscriber. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Ingest one observation.
    ///
    /// The observation is stored as the latest for its entity. With a zero
    /// debounce the affected pairs recompute immediately; otherwise each
    /// affected pair (re)schedules its trailing-edge timer and the caller is
    /// expected to come back via [`Self::run_due_timers`].
    ///
    /// # Errors
    ///
    /// Returns [`AdjacencyError::UnknownEntity`] for an entity that is
    /// neither the anchor nor a configured target.
    pub fn observe(&mut self, observation: Observation) -> Result<()> {
        let entity = observation.entity_id.clone();
        let is_anchor = entity == self.config.anchor;
        if !is_anchor && !self.config.targets.contains(&entity) {
            return Err(AdjacencyError::UnknownEntity(entity.to_string()));
        }

        let now = self.clock.now();
        self.latest.insert(entity.clone(), observation);
        debug!(entity = %entity, "observation stored");

        let affected: Vec<usize> = if is_anchor {
            (0..self.pairs.len()).collect()
        } else {
            self.pairs.iter().position(|p| *p.target() == entity).into_iter().collect()
        };

        if self.config.debounce_seconds <= 0.0 {
            for idx in affected {
                self.recompute_pair(idx, now);
            }
            self.refresh_aggregate();
        } else {
            let debounce = self.config.debounce_duration();
            for idx in affected {
                self.pairs[idx].debouncer.schedule(now, debounce);
            }
        }
        Ok(())
    }

    /// Earliest pending debounce deadline across all pairs, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.pairs.iter().filter_map(|p| p.debouncer.deadline()).min()
    }

    /// Fire every debounce timer that is due, recomputing its pair. Returns
    /// the number of pairs recomputed.
    pub fn run_due_timers(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;
        for idx in 0..self.pairs.len() {
            if self.pairs[idx].debouncer.take_due(now).is_some() {
                self.recompute_pair(idx, now);
                fired += 1;
            }
        }
        if fired > 0 {
            self.refresh_aggregate();
        }
        fired
    }

    /// Manual refresh: ask the location sources for fresh fixes, cancel all
    /// pending debounces and recompute every pair from the latest stored
    /// observations right away.
    pub fn force_refresh(&mut self) {
        if let Some(requester) = &mut self.requester {
            requester.request_location_update(&self.config.anchor);
            for target in &self.config.targets {
                requester.request_location_update(target);
            }
        }

        let now = self.clock.now();
        info!(anchor = %self.config.anchor, "manual refresh");
        for idx in 0..self.pairs.len() {
            self.pairs[idx].debouncer.cancel();
            self.recompute_pair(idx, now);
        }
        self.refresh_aggregate();
    }

    /// Snapshot of one target's pair.
    ///
    /// # Errors
    ///
    /// Returns [`AdjacencyError::UnknownEntity`] for an unconfigured target.
    pub fn snapshot(&self, target: &EntityId) -> Result<PairSnapshot> {
        let now = self.clock.now();
        self.pairs
            .iter()
            .find(|p| p.target() == target)
            .map(|p| p.snapshot(&self.config, now))
            .ok_or_else(|| AdjacencyError::UnknownEntity(target.to_string()))
    }

    /// Snapshots of every pair, in configured target order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<PairSnapshot> {
        let now = self.clock.now();
        self.pairs.iter().map(|p| p.snapshot(&self.config, now)).collect()
    }

    /// The cached aggregate view, current as of the last recompute.
    #[must_use]
    pub const fn aggregate_snapshot(&self) -> &AggregateSnapshot {
        &self.aggregate
    }

    fn recompute_pair(&mut self, idx: usize, now: DateTime<Utc>) {
        let anchor_obs = self.latest.get(&self.config.anchor);
        let target_obs = self.latest.get(self.pairs[idx].target());
        self.pairs[idx].recompute(&self.config, anchor_obs, target_obs, now, &mut self.bus);
    }

    fn refresh_aggregate(&mut self) {
        self.aggregate = self.aggregator.recompute(&self.config, &self.pairs, &mut self.bus);
    }
}
