//! # Booth XP Common Library
//!
//! Shared code for the Booth XP reward engine and its hosts:
//! - Error types
//! - Reward configuration (rates, dispenser ranges, level thresholds)
//! - The per-user reward record
//! - Event types (RewardEvent enum) and the EventBus
//! - Clock and date helpers

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use config::RewardConfig;
pub use error::{Error, Result};
pub use models::UserRewardState;
