//! In-memory collaborators
//!
//! Used by the standalone host when no database is configured and by tests.
//! The user store and registries support failure injection so error policy
//! can be exercised without a real backend.

use crate::collaborators::{BoothService, PresenceRegistry, UserStore};
use async_trait::async_trait;
use boothxp_common::{Error, Result, UserRewardState};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// User store held in a HashMap
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, UserRewardState>>,
    fail_saves: AtomicBool,
    read_delay_ms: AtomicU64,
    saves: AtomicU64,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record directly
    pub async fn insert(&self, state: UserRewardState) {
        self.users.write().await.insert(state.id, state);
    }

    /// Create a fresh record for `id` unless one exists
    pub async fn create_user(&self, id: Uuid) -> UserRewardState {
        self.users
            .write()
            .await
            .entry(id)
            .or_insert_with(|| UserRewardState::new(id))
            .clone()
    }

    /// Current record, bypassing failure injection
    pub async fn snapshot(&self, id: Uuid) -> Option<UserRewardState> {
        self.users.read().await.get(&id).cloned()
    }

    /// Make every subsequent `save` fail with a persistence error
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Delay every `get_user`, widening read-modify-write windows
    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of successful saves
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<UserRewardState>> {
        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn save(&self, state: &UserRewardState) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Persistence(format!(
                "injected save failure for {}",
                state.id
            )));
        }
        self.users.write().await.insert(state.id, state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Presence registry backed by a HashSet of connected users
#[derive(Default)]
pub struct MemoryPresence {
    present: RwLock<HashSet<Uuid>>,
    unavailable: AtomicBool,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, id: Uuid) {
        self.present.write().await.insert(id);
    }

    pub async fn leave(&self, id: Uuid) {
        self.present.write().await.remove(&id);
    }

    pub async fn online_count(&self) -> usize {
        self.present.read().await.len()
    }

    /// Make lookups fail with `DependencyUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl PresenceRegistry for MemoryPresence {
    async fn is_present(&self, id: Uuid) -> Result<bool> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::DependencyUnavailable(
                "presence registry offline".to_string(),
            ));
        }
        Ok(self.present.read().await.contains(&id))
    }
}

/// Booth state held in memory
#[derive(Default)]
pub struct MemoryBooth {
    waitlist: RwLock<Vec<Uuid>>,
    performer: RwLock<Option<Uuid>>,
    unavailable: AtomicBool,
}

impl MemoryBooth {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_waitlist(&self, waitlist: Vec<Uuid>) {
        *self.waitlist.write().await = waitlist;
    }

    pub async fn set_performer(&self, performer: Option<Uuid>) {
        *self.performer.write().await = performer;
    }

    /// Make lookups fail with `DependencyUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::DependencyUnavailable("booth offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BoothService for MemoryBooth {
    async fn waitlist(&self) -> Result<Vec<Uuid>> {
        self.check_available()?;
        Ok(self.waitlist.read().await.clone())
    }

    async fn current_performer(&self) -> Result<Option<Uuid>> {
        self.check_available()?;
        Ok(*self.performer.read().await)
    }
}
