//! Reward record model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reward-related subset of a user record
///
/// Owned by the user store; every write goes through the gain applicator.
/// All fields exist from creation, a fresh account starts at level 1 with no
/// experience, no points and no counted dispensation cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRewardState {
    /// Stable user identifier
    pub id: Uuid,
    /// Cumulative experience (never reduced)
    pub exp: i64,
    /// Spendable points (may be negative)
    pub points: i64,
    /// Current level, always >= 1
    pub level: u32,
    /// Day of the last dispensation cycle counted against the daily cap
    pub last_dispense_date: Option<NaiveDate>,
    /// Dispensation cycles counted on `last_dispense_date`
    pub dispense_cycle_count: u32,
}

impl UserRewardState {
    /// Create the initial reward record for a new account
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            exp: 0,
            points: 0,
            level: 1,
            last_dispense_date: None,
            dispense_cycle_count: 0,
        }
    }

    /// Reset the daily cycle counter if `today` is a different day
    ///
    /// Returns true when a reset happened.
    pub fn roll_dispense_day(&mut self, today: NaiveDate) -> bool {
        if self.last_dispense_date == Some(today) {
            return false;
        }
        self.last_dispense_date = Some(today);
        self.dispense_cycle_count = 0;
        true
    }
}
