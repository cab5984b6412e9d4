//! Periodic dispenser
//!
//! Grants a randomized amount of experience and points to a present user once
//! per dispensation cycle, up to the daily cycle cap. Users queued to perform
//! or currently performing receive the participation multipliers.
//!
//! Error handling per cycle:
//! - user not found: cycle dropped, the user's chain ends
//! - cap reached: nothing granted, the chain re-arms while the user is present
//! - store failure: cycle aborted, the chain re-arms while the user is present
//! - booth lookup failure: cycle proceeds without the multiplier

use crate::collaborators::BoothService;
use crate::gain::{CycleClaim, GainApplicator, GainOutcome};
use boothxp_common::config::DrawRange;
use boothxp_common::time::Clock;
use boothxp_common::{Error, Result, RewardConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// What a dispensation cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispenseOutcome {
    Granted {
        exp: i64,
        points: i64,
        /// Whether the participation multipliers applied
        participating: bool,
        /// Today's cycle count including this one
        cycle: u32,
        gain: GainOutcome,
    },
    /// Daily cycle cap already reached, nothing granted
    CapReached,
}

/// Passive reward dispenser
pub struct Dispenser {
    config: Arc<RewardConfig>,
    gain: Arc<GainApplicator>,
    booth: Arc<dyn BoothService>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

impl Dispenser {
    pub fn new(
        config: Arc<RewardConfig>,
        gain: Arc<GainApplicator>,
        booth: Arc<dyn BoothService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            gain,
            booth,
            clock,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Use a deterministic random sequence
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Run one dispensation cycle for `user_id`
    pub async fn dispense(&self, user_id: Uuid) -> Result<DispenseOutcome> {
        let today = self.clock.today();

        let cycle = match self.gain.claim_dispense_cycle(user_id, today).await {
            Ok(CycleClaim::Granted { cycle }) => cycle,
            Ok(CycleClaim::CapReached { count }) => {
                debug!(
                    "Daily dispensation cap reached for {} ({} cycles on {})",
                    user_id, count, today
                );
                self.gain.rearm_if_present(user_id).await;
                return Ok(DispenseOutcome::CapReached);
            }
            Err(e @ Error::UserNotFound(_)) => return Err(e),
            Err(e) => {
                error!("Dispensation cycle for {} aborted: {}", user_id, e);
                self.gain.rearm_if_present(user_id).await;
                return Err(e);
            }
        };

        let participating = self.is_participating(user_id).await;
        let (exp, points) = self.draw(participating);

        match self.gain.gain(user_id, points, exp).await {
            Ok(gain) => {
                debug!(
                    "Dispensed {} exp / {} points to {} (cycle {}, participating: {})",
                    exp, points, user_id, cycle, participating
                );
                Ok(DispenseOutcome::Granted {
                    exp,
                    points,
                    participating,
                    cycle,
                    gain,
                })
            }
            Err(e @ Error::UserNotFound(_)) => Err(e),
            Err(e) => {
                error!("Dispensation gain for {} failed: {}", user_id, e);
                self.gain.rearm_if_present(user_id).await;
                Err(e)
            }
        }
    }

    /// True if the user is on the waitlist or currently performing
    ///
    /// Lookup failures count as not participating.
    async fn is_participating(&self, user_id: Uuid) -> bool {
        match self.booth.waitlist().await {
            Ok(waitlist) if waitlist.contains(&user_id) => return true,
            Ok(_) => {}
            Err(e) => warn!("Waitlist lookup failed, no multiplier for {}: {}", user_id, e),
        }

        match self.booth.current_performer().await {
            Ok(performer) => performer == Some(user_id),
            Err(e) => {
                warn!("Performer lookup failed, no multiplier for {}: {}", user_id, e);
                false
            }
        }
    }

    /// Draw (exp, points) for one cycle
    fn draw(&self, participating: bool) -> (i64, i64) {
        let d = &self.config.dispenser;
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        let mut exp = draw_rounded(&mut *rng, d.exp_range);
        let mut points = draw_rounded(&mut *rng, d.points_range);

        if participating {
            exp = (exp as f64 * d.participation_exp_multiplier).round() as i64;
            points = (points as f64 * d.participation_points_multiplier).round() as i64;
        }

        (exp, points)
    }
}

/// Uniform draw over `[min, max]`, rounded to the nearest integer
fn draw_rounded<R: Rng + ?Sized>(rng: &mut R, range: DrawRange) -> i64 {
    if range.min >= range.max {
        return range.min;
    }
    let raw: f64 = rng.gen_range(range.min as f64..=range.max as f64);
    raw.round() as i64
}
