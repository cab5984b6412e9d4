//! Interfaces to the services the reward engine depends on
//!
//! The engine never owns user accounts, connection tracking or the booth;
//! it reaches them through these traits so hosts can plug in their own
//! storage and session layers.

use async_trait::async_trait;
use boothxp_common::{Result, UserRewardState};
use uuid::Uuid;

/// Durable storage for user reward records
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a reward record, `Ok(None)` when the user does not exist
    async fn get_user(&self, id: Uuid) -> Result<Option<UserRewardState>>;

    /// Persist a reward record
    async fn save(&self, state: &UserRewardState) -> Result<()>;
}

/// Tracks which users are currently connected to the session
#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    async fn is_present(&self, id: Uuid) -> Result<bool>;
}

/// Waitlist and now-playing information
#[async_trait]
pub trait BoothService: Send + Sync {
    /// Users queued to perform, in order
    async fn waitlist(&self) -> Result<Vec<Uuid>>;

    /// User currently presenting a track, if any
    async fn current_performer(&self) -> Result<Option<Uuid>>;
}
