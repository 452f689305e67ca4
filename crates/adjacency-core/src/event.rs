//! Proximity transition events and their fan-out.
//!
//! Events are immutable, serializable and fire-and-forget: the state machine
//! calls a synchronous [`EventSink`] at the moment of the transition, and
//! whatever subscribers are registered at that moment observe it. There is no
//! delivery guarantee beyond that.

use serde::Serialize;
use uuid::Uuid;

use crate::entity::EntityId;

/// A discrete proximity transition or update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A pair crossed into proximity (`d <= entry`).
    Enter {
        /// The anchor side of the pair.
        entity_a: EntityId,
        /// The target side of the pair.
        entity_b: EntityId,
        /// Distance that triggered the transition, raw meters.
        distance_m: f64,
        /// Configured entry threshold.
        entry_threshold_m: f64,
        /// Configured exit threshold.
        exit_threshold_m: f64,
        /// Always `1` on enter.
        proximity_update_count: u32,
    },

    /// A pair crossed into proximity while its data was not considered
    /// reliable (insufficient updates, unrealistic convergence, or resync).
    EnterUnreliable {
        /// The anchor side of the pair.
        entity_a: EntityId,
        /// The target side of the pair.
        entity_b: EntityId,
        /// Distance that triggered the transition, raw meters.
        distance_m: f64,
        /// Configured entry threshold.
        entry_threshold_m: f64,
        /// Configured exit threshold.
        exit_threshold_m: f64,
        /// Always `1` on enter.
        proximity_update_count: u32,
        /// Why the entry was not trusted.
        unreliable_reason: String,
    },

    /// A pair crossed out of proximity (`d >= exit`).
    Leave {
        /// The anchor side of the pair.
        entity_a: EntityId,
        /// The target side of the pair.
        entity_b: EntityId,
        /// The last distance before leaving, raw meters.
        distance_m: f64,
        /// Configured entry threshold.
        entry_threshold_m: f64,
        /// Configured exit threshold.
        exit_threshold_m: f64,
    },

    /// An accepted sample arrived while already in proximity.
    ProximityUpdate {
        /// The anchor side of the pair.
        entity_a: EntityId,
        /// The target side of the pair.
        entity_b: EntityId,
        /// Current distance, raw meters.
        distance_m: f64,
        /// Count of accepted samples since entering (enter itself is 1).
        proximity_update_count: u32,
        /// True only for the sample immediately following enter (count 2).
        is_first_update: bool,
    },

    /// At least one target of the anchor became near.
    AnyEnter {
        /// The anchor entity.
        anchor: EntityId,
        /// Always `true` on this event.
        any_proximity: bool,
        /// Nearest target with a valid distance, if any.
        nearest_target: Option<EntityId>,
        /// Its distance, raw meters.
        nearest_distance_m: Option<f64>,
        /// Configured entry threshold.
        entry_threshold_m: f64,
        /// Configured exit threshold.
        exit_threshold_m: f64,
    },

    /// The last near target of the anchor stopped being near.
    AnyLeave {
        /// The anchor entity.
        anchor: EntityId,
        /// Always `false` on this event.
        any_proximity: bool,
        /// Nearest target with a valid distance, if any.
        nearest_target: Option<EntityId>,
        /// Its distance, raw meters.
        nearest_distance_m: Option<f64>,
        /// Configured entry threshold.
        entry_threshold_m: f64,
        /// Configured exit threshold.
        exit_threshold_m: f64,
    },
}

impl Event {
    /// Machine-readable event name, matching the serialized `kind` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Enter { .. } => "enter",
            Self::EnterUnreliable { .. } => "enter_unreliable",
            Self::Leave { .. } => "leave",
            Self::ProximityUpdate { .. } => "proximity_update",
            Self::AnyEnter { .. } => "any_enter",
            Self::AnyLeave { .. } => "any_leave",
        }
    }
}

/// Synchronous receiver of emitted events.
pub trait EventSink {
    /// Observe one event. Must not block.
    fn emit(&mut self, event: &Event);
}

/// Token returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

type Subscriber = Box<dyn FnMut(&Event) + Send>;

/// Fan-out sink: every registered subscriber observes every event, in
/// subscription order.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl EventBus {
    /// An empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; events are delivered until unsubscribed.
    pub fn subscribe(&mut self, f: impl FnMut(&Event) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscribers.push((id, Box::new(f)));
        id
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl EventSink for EventBus {
    fn emit(&mut self, event: &Event) {
        for (_, f) in &mut self.subscribers {
            f(event);
        }
    }
}

/// Sink that records events for assertions in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub events: Vec<Event>,
}

#[cfg(test)]
impl EventSink for RecordingSink {
    fn emit(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}
