//! Event types for the Booth XP event system
//!
//! Provides the published reward events and the EventBus that carries them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Topic for level-up notifications
pub const TOPIC_LEVEL_UP: &str = "user:levelup";

/// Topic for cumulative gain notifications
pub const TOPIC_GAIN: &str = "user:gain";

/// Reward events published by the gain applicator
///
/// For a single gain call that crosses a level threshold, `UserLevelUp` is
/// always emitted before `UserGain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RewardEvent {
    /// User reached a new level
    ///
    /// Triggers:
    /// - Session: Announce the level-up to connected listeners
    UserLevelUp {
        /// User that levelled up
        user_id: Uuid,
        /// Level reached
        level: u32,
    },

    /// User's reward totals changed
    ///
    /// Carries cumulative totals (including any level-up bonus), not deltas.
    UserGain {
        /// User whose totals changed
        user_id: Uuid,
        /// Total experience after the gain
        exp: i64,
        /// Total points after the gain
        points: i64,
    },
}

impl RewardEvent {
    /// Topic string this event is published under
    pub fn topic(&self) -> &'static str {
        match self {
            RewardEvent::UserLevelUp { .. } => TOPIC_LEVEL_UP,
            RewardEvent::UserGain { .. } => TOPIC_GAIN,
        }
    }

    /// User the event concerns
    pub fn user_id(&self) -> Uuid {
        match self {
            RewardEvent::UserLevelUp { user_id, .. } | RewardEvent::UserGain { user_id, .. } => {
                *user_id
            }
        }
    }

    /// Wire payload for the topic
    ///
    /// `user:levelup` → `{ userID, level }`, `user:gain` → `{ userID, exp, points }`.
    pub fn payload(&self) -> Value {
        match self {
            RewardEvent::UserLevelUp { user_id, level } => json!({
                "userID": user_id.to_string(),
                "level": level,
            }),
            RewardEvent::UserGain { user_id, exp, points } => json!({
                "userID": user_id.to_string(),
                "exp": exp,
                "points": points,
            }),
        }
    }

    /// `{ topic, payload }` envelope for line-oriented output
    pub fn envelope(&self) -> Value {
        json!({
            "topic": self.topic(),
            "payload": self.payload(),
        })
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Distribution bus for reward events
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the gain applicator)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use boothxp_common::events::{EventBus, RewardEvent};
/// use uuid::Uuid;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(RewardEvent::UserGain {
///     user_id: Uuid::new_v4(),
///     exp: 50,
///     points: 400,
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(RewardEvent::UserGain { exp: 50, .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RewardEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<RewardEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: RewardEvent,
    ) -> Result<usize, broadcast::error::SendError<RewardEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Reward publication is fire-and-forget: nobody listening is not an error.
    pub fn emit_lossy(&self, event: RewardEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
