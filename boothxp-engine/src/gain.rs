//! Gain applicator
//!
//! Every change to a user's reward record goes through here: reaction
//! rewards, passive dispensations and the dispenser's daily-cap bookkeeping.
//! Each read-modify-write runs under a per-user async lock so concurrent gains
//! for the same user serialize, while different users proceed in parallel.
//!
//! Order of effects for one `gain` call:
//! 1. Apply deltas and level progression
//! 2. Persist (failure aborts the call, nothing is published)
//! 3. Publish `user:levelup` (if levelled) then exactly one `user:gain`
//! 4. Re-arm the user's dispensation timer if they are present

use crate::collaborators::{PresenceRegistry, UserStore};
use crate::leveling::{apply_level_up, level_for_exp};
use crate::scheduler::DispenseScheduler;
use boothxp_common::events::{EventBus, RewardEvent};
use boothxp_common::{Error, Result, RewardConfig, UserRewardState};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of one applied gain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GainOutcome {
    pub user_id: Uuid,
    /// Experience actually added (negative requests are clamped to 0)
    pub exp_delta: i64,
    pub points_delta: i64,
    pub total_exp: i64,
    /// Points after the gain, including any level-up bonus
    pub total_points: i64,
    pub leveled_up_to: Option<u32>,
}

/// Outcome of claiming a dispensation cycle against the daily cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleClaim {
    /// Cycle counted; `cycle` is today's count including this one
    Granted { cycle: u32 },
    /// Daily cap already reached
    CapReached { count: u32 },
}

/// Lazily created async lock per user
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop locks nobody holds or waits on
    fn release_idle(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Single funnel for reward state changes
pub struct GainApplicator {
    config: Arc<RewardConfig>,
    users: Arc<dyn UserStore>,
    presence: Arc<dyn PresenceRegistry>,
    events: EventBus,
    scheduler: Arc<DispenseScheduler>,
    locks: UserLocks,
}

impl GainApplicator {
    pub fn new(
        config: Arc<RewardConfig>,
        users: Arc<dyn UserStore>,
        presence: Arc<dyn PresenceRegistry>,
        events: EventBus,
        scheduler: Arc<DispenseScheduler>,
    ) -> Self {
        Self {
            config,
            users,
            presence,
            events,
            scheduler,
            locks: UserLocks::default(),
        }
    }

    /// Apply a points/exp delta to `user_id`
    ///
    /// # Errors
    /// - `UserNotFound` if the store has no record for the user
    /// - a persistence error if the store rejects the write
    pub async fn gain(&self, user_id: Uuid, points_delta: i64, exp_delta: i64) -> Result<GainOutcome> {
        let result = {
            let _guard = self.locks.acquire(user_id).await;
            self.apply(user_id, points_delta, exp_delta).await
        };
        self.locks.release_idle();

        let outcome = result?;
        self.rearm_if_present(user_id).await;
        Ok(outcome)
    }

    async fn apply(&self, user_id: Uuid, points_delta: i64, exp_delta: i64) -> Result<GainOutcome> {
        let mut state = self.load(user_id).await?;

        if points_delta != 0 {
            state.points += points_delta;
        }

        let exp_delta = if exp_delta < 0 {
            debug!("Ignoring negative exp delta {} for {}", exp_delta, user_id);
            0
        } else {
            exp_delta
        };

        let mut leveled_up_to = None;
        if exp_delta != 0 {
            state.exp += exp_delta;
            leveled_up_to = apply_level_up(
                &mut state,
                &self.config.thresholds,
                self.config.level_up.points_bonus_per_level,
            );

            let reachable = level_for_exp(state.exp, &self.config.thresholds);
            if reachable > state.level {
                debug!(
                    "{} is at level {} with exp for level {}; remaining levels follow on later gains",
                    user_id, state.level, reachable
                );
            }
        }

        self.persist(&state).await?;

        if let Some(level) = leveled_up_to {
            info!("{} reached level {}", user_id, level);
            self.events.emit_lossy(RewardEvent::UserLevelUp { user_id, level });
        }
        self.events.emit_lossy(RewardEvent::UserGain {
            user_id,
            exp: state.exp,
            points: state.points,
        });

        Ok(GainOutcome {
            user_id,
            exp_delta,
            points_delta,
            total_exp: state.exp,
            total_points: state.points,
            leveled_up_to,
        })
    }

    /// Count one dispensation cycle for `user_id` on `today`
    ///
    /// Resets the daily counter when the stored day differs from `today`.
    /// The record is persisted whenever it changes.
    pub async fn claim_dispense_cycle(&self, user_id: Uuid, today: NaiveDate) -> Result<CycleClaim> {
        let result = {
            let _guard = self.locks.acquire(user_id).await;
            self.claim(user_id, today).await
        };
        self.locks.release_idle();
        result
    }

    async fn claim(&self, user_id: Uuid, today: NaiveDate) -> Result<CycleClaim> {
        let mut state = self.load(user_id).await?;
        let rolled = state.roll_dispense_day(today);
        if rolled {
            debug!("New dispensation day {} for {}", today, user_id);
        }

        let cap = self.config.daily_cycle_cap;
        if state.dispense_cycle_count >= cap {
            if rolled {
                self.persist(&state).await?;
            }
            return Ok(CycleClaim::CapReached {
                count: state.dispense_cycle_count,
            });
        }

        state.dispense_cycle_count += 1;
        self.persist(&state).await?;
        Ok(CycleClaim::Granted {
            cycle: state.dispense_cycle_count,
        })
    }

    /// Arm the next dispensation if the user is still present
    ///
    /// An absent user has any leftover timer cancelled. When presence cannot
    /// be determined the timer is armed anyway and the due tick decides.
    /// Returns true if a new timer was armed.
    pub async fn rearm_if_present(&self, user_id: Uuid) -> bool {
        match self.presence.is_present(user_id).await {
            Ok(true) => self.scheduler.arm(user_id),
            Ok(false) => {
                self.scheduler.cancel(user_id);
                false
            }
            Err(e) => {
                warn!("Presence lookup failed for {}, re-arming anyway: {}", user_id, e);
                self.scheduler.arm(user_id)
            }
        }
    }

    async fn load(&self, user_id: Uuid) -> Result<UserRewardState> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or(Error::UserNotFound(user_id))
    }

    async fn persist(&self, state: &UserRewardState) -> Result<()> {
        self.users.save(state).await.map_err(|e| {
            if e.is_persistence() {
                e
            } else {
                Error::Persistence(e.to_string())
            }
        })
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.len()
    }
}
