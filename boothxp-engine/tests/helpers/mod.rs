//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use boothxp_common::events::{EventBus, RewardEvent};
use boothxp_common::time::FixedClock;
use boothxp_common::{RewardConfig, UserRewardState};
use boothxp_engine::store::{MemoryBooth, MemoryPresence, MemoryUserStore};
use boothxp_engine::{EngineParts, RewardEngine};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct TestEngine {
    pub engine: Arc<RewardEngine>,
    pub users: Arc<MemoryUserStore>,
    pub presence: Arc<MemoryPresence>,
    pub booth: Arc<MemoryBooth>,
    pub clock: Arc<FixedClock>,
    pub events: broadcast::Receiver<RewardEvent>,
}

pub fn start_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
}

/// Engine over in-memory collaborators with a fixed clock and seeded RNG
pub fn test_engine(config: RewardConfig) -> TestEngine {
    let users = Arc::new(MemoryUserStore::new());
    let presence = Arc::new(MemoryPresence::new());
    let booth = Arc::new(MemoryBooth::new());
    let clock = Arc::new(FixedClock::new(start_day()));
    let bus = EventBus::new(1000);
    let events = bus.subscribe();

    let parts = EngineParts {
        config,
        users: users.clone(),
        presence: presence.clone(),
        booth: booth.clone(),
        events: bus,
        clock: clock.clone(),
        rng_seed: Some(42),
    };

    TestEngine {
        engine: Arc::new(RewardEngine::new(parts)),
        users,
        presence,
        booth,
        clock,
        events,
    }
}

impl TestEngine {
    /// Create a record and return its id
    pub async fn new_user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.users.create_user(id).await;
        id
    }

    /// Create a record with preset totals
    pub async fn user_with(&self, exp: i64, level: u32, points: i64) -> Uuid {
        let id = Uuid::new_v4();
        self.users
            .insert(UserRewardState {
                exp,
                level,
                points,
                ..UserRewardState::new(id)
            })
            .await;
        id
    }

    /// Mark present and seed the dispensation chain
    pub async fn join(&self, id: Uuid) {
        self.presence.join(id).await;
        self.engine.user_joined(id);
    }

    pub async fn leave(&self, id: Uuid) {
        self.presence.leave(id).await;
        self.engine.user_left(id);
    }

    pub async fn state(&self, id: Uuid) -> UserRewardState {
        self.users.snapshot(id).await.expect("user exists")
    }

    /// Everything published so far
    pub fn drain_events(&mut self) -> Vec<RewardEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event, or None after `within`
    pub async fn next_event(&mut self, within: Duration) -> Option<RewardEvent> {
        tokio::time::timeout(within, self.events.recv()).await.ok()?.ok()
    }
}

/// Let spawned tasks run to completion
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Config with a short interval and generous cap for distribution tests
pub fn quick_config(interval_secs: u64, daily_cycle_cap: u32) -> RewardConfig {
    let mut config = RewardConfig::default();
    config.dispenser.interval_secs = interval_secs;
    config.daily_cycle_cap = daily_cycle_cap;
    config
}
