//! # Booth XP Reward Engine (boothxp-engine)
//!
//! Experience, points and levels for a collaborative listening session.
//!
//! **Purpose:** Reward presenters for how their tracks are received, grant
//! passive rewards to connected users on a per-user timer chain, and advance
//! levels through the configured threshold table.
//!
//! **Architecture:** Reaction rewarder and periodic dispenser both feed the
//! gain applicator, which owns every write to a user's reward record.

pub mod collaborators;
pub mod dispenser;
pub mod engine;
pub mod gain;
pub mod leveling;
pub mod rewarder;
pub mod scheduler;
pub mod session;
pub mod store;

pub use boothxp_common::{Error, Result};
pub use engine::{EngineParts, RewardEngine};
pub use gain::GainOutcome;
pub use rewarder::{CompletedTrack, TrackAdvance};
