//! Reward engine
//!
//! Wires the reward components around one configuration, one user store and
//! one event bus, and runs the loop that turns due timers into dispensation
//! cycles.
//!
//! A user's passive rewards form a chain: joining arms the first timer, each
//! successful gain re-arms the next one while the user stays present, and
//! leaving cancels whatever is pending.

use crate::collaborators::{BoothService, PresenceRegistry, UserStore};
use crate::dispenser::{DispenseOutcome, Dispenser};
use crate::gain::{GainApplicator, GainOutcome};
use crate::rewarder::{ReactionRewarder, TrackAdvance};
use crate::scheduler::{DispenseScheduler, DueDispense};
use boothxp_common::events::EventBus;
use boothxp_common::time::{Clock, SystemClock};
use boothxp_common::{Error, Result, RewardConfig};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Collaborators and options for building an engine
pub struct EngineParts {
    pub config: RewardConfig,
    pub users: Arc<dyn UserStore>,
    pub presence: Arc<dyn PresenceRegistry>,
    pub booth: Arc<dyn BoothService>,
    pub events: EventBus,
    pub clock: Arc<dyn Clock>,
    /// Fixed RNG seed for reproducible dispensations
    pub rng_seed: Option<u64>,
}

impl EngineParts {
    /// Parts with the system clock and an entropy-seeded RNG
    pub fn new(
        config: RewardConfig,
        users: Arc<dyn UserStore>,
        presence: Arc<dyn PresenceRegistry>,
        booth: Arc<dyn BoothService>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            users,
            presence,
            booth,
            events,
            clock: Arc::new(SystemClock),
            rng_seed: None,
        }
    }
}

/// Reward engine
pub struct RewardEngine {
    config: Arc<RewardConfig>,
    presence: Arc<dyn PresenceRegistry>,
    events: EventBus,
    scheduler: Arc<DispenseScheduler>,
    gain: Arc<GainApplicator>,
    dispenser: Arc<Dispenser>,
    rewarder: Arc<ReactionRewarder>,
    due_rx: Mutex<Option<mpsc::UnboundedReceiver<DueDispense>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl RewardEngine {
    pub fn new(parts: EngineParts) -> Self {
        let config = Arc::new(parts.config);
        let (scheduler, due_rx) = DispenseScheduler::channel(config.dispenser.interval());
        let scheduler = Arc::new(scheduler);

        let gain = Arc::new(GainApplicator::new(
            config.clone(),
            parts.users,
            parts.presence.clone(),
            parts.events.clone(),
            scheduler.clone(),
        ));

        let mut dispenser = Dispenser::new(config.clone(), gain.clone(), parts.booth, parts.clock);
        if let Some(seed) = parts.rng_seed {
            dispenser = dispenser.with_seed(seed);
        }

        let rewarder = Arc::new(ReactionRewarder::new(config.reactions, gain.clone()));

        Self {
            config,
            presence: parts.presence,
            events: parts.events,
            scheduler,
            gain,
            dispenser: Arc::new(dispenser),
            rewarder,
            due_rx: Mutex::new(Some(due_rx)),
            driver: Mutex::new(None),
        }
    }

    /// Start turning due timers into dispensation cycles
    ///
    /// Calling `start` more than once has no effect.
    pub fn start(&self) {
        let due_rx = self.due_rx.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(mut due_rx) = due_rx else {
            warn!("Reward engine already started");
            return;
        };

        info!(
            "Starting reward engine (interval: {}s, daily cap: {} cycles)",
            self.config.dispenser.interval_secs, self.config.daily_cycle_cap
        );

        let scheduler = self.scheduler.clone();
        let presence = self.presence.clone();
        let dispenser = self.dispenser.clone();

        let handle = tokio::spawn(async move {
            while let Some(due) = due_rx.recv().await {
                if !scheduler.complete(&due) {
                    debug!("Ignoring stale dispensation tick for {}", due.user_id);
                    continue;
                }

                match presence.is_present(due.user_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!("{} is no longer present, chain ends", due.user_id);
                        continue;
                    }
                    Err(e) => {
                        // Skip this cycle but keep the chain alive; the next tick checks again
                        warn!(
                            "Presence lookup failed for {}, skipping this cycle: {}",
                            due.user_id, e
                        );
                        scheduler.arm(due.user_id);
                        continue;
                    }
                }

                let dispenser = dispenser.clone();
                tokio::spawn(async move {
                    match dispenser.dispense(due.user_id).await {
                        Ok(_) => {}
                        Err(Error::UserNotFound(id)) => {
                            info!("User {} not found, dispensation chain ends", id);
                        }
                        Err(e) => warn!("Dispensation for {} failed: {}", due.user_id, e),
                    }
                });
            }
            debug!("Due channel closed, dispensation driver stopped");
        });

        *self.driver.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Seed the dispensation chain for a user who just connected
    pub fn user_joined(&self, user_id: Uuid) -> bool {
        debug!("{} joined", user_id);
        self.scheduler.arm(user_id)
    }

    /// Cancel the pending dispensation of a user who disconnected
    pub fn user_left(&self, user_id: Uuid) -> bool {
        debug!("{} left", user_id);
        self.scheduler.cancel(user_id)
    }

    /// Reward the presenter of the track that just finished
    pub async fn track_advanced(&self, advance: &TrackAdvance) -> Option<GainOutcome> {
        self.rewarder.handle_advance(advance).await
    }

    /// Consume a track-advance feed in the background
    pub fn spawn_track_listener(&self, rx: mpsc::Receiver<TrackAdvance>) -> JoinHandle<()> {
        self.rewarder.clone().spawn_listener(rx)
    }

    /// Apply a reward delta directly
    pub async fn gain(&self, user_id: Uuid, points_delta: i64, exp_delta: i64) -> Result<GainOutcome> {
        self.gain.gain(user_id, points_delta, exp_delta).await
    }

    /// Run one dispensation cycle immediately, outside the timer chain
    pub async fn dispense(&self, user_id: Uuid) -> Result<DispenseOutcome> {
        self.dispenser.dispense(user_id).await
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn scheduler(&self) -> &DispenseScheduler {
        &self.scheduler
    }

    /// Stop the driver and abort every pending timer
    pub fn shutdown(&self) {
        if let Some(handle) = self.driver.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        self.scheduler.shutdown();
        info!("Reward engine stopped");
    }
}
