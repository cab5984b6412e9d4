//! Line-oriented session feed for the standalone host
//!
//! The host binary reads one JSON command per line (joins, leaves, booth
//! changes, track advances) and applies it to in-process presence and booth
//! registries plus the reward engine.

use crate::collaborators::UserStore;
use crate::engine::RewardEngine;
use crate::rewarder::{CompletedTrack, TrackAdvance};
use crate::store::{MemoryBooth, MemoryPresence, MemoryUserStore, SqliteUserStore};
use boothxp_common::{Error, Result, UserRewardState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// One command from the session feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionCommand {
    /// Create the reward record for a new account
    CreateUser { user_id: Uuid },
    /// User connected to the session
    Join { user_id: Uuid },
    /// User disconnected
    Leave { user_id: Uuid },
    /// Replace the waitlist
    SetWaitlist { users: Vec<Uuid> },
    /// Set or clear the current performer
    SetPerformer { user_id: Option<Uuid> },
    /// Booth advanced; `previous` is the track that finished, if any
    Advance { previous: Option<CompletedTrack> },
    /// Direct grant, e.g. an administrative correction
    Gain {
        user_id: Uuid,
        #[serde(default)]
        points: i64,
        #[serde(default)]
        exp: i64,
    },
}

impl SessionCommand {
    /// Parse one feed line
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line)
            .map_err(|e| Error::Internal(format!("Invalid session command: {}", e)))
    }
}

/// Account storage the host can create records in
#[derive(Clone)]
pub enum Accounts {
    Memory(Arc<MemoryUserStore>),
    Sqlite(SqliteUserStore),
}

impl Accounts {
    /// Store handle for the engine
    pub fn store(&self) -> Arc<dyn UserStore> {
        match self {
            Accounts::Memory(store) => store.clone(),
            Accounts::Sqlite(store) => Arc::new(store.clone()),
        }
    }

    /// Create a fresh record, keeping any existing one
    pub async fn create(&self, user_id: Uuid) -> Result<UserRewardState> {
        match self {
            Accounts::Memory(store) => Ok(store.create_user(user_id).await),
            Accounts::Sqlite(store) => store.insert_new(user_id).await,
        }
    }
}

/// In-process session state driving a reward engine
pub struct Session {
    engine: Arc<RewardEngine>,
    accounts: Accounts,
    presence: Arc<MemoryPresence>,
    booth: Arc<MemoryBooth>,
}

impl Session {
    pub fn new(
        engine: Arc<RewardEngine>,
        accounts: Accounts,
        presence: Arc<MemoryPresence>,
        booth: Arc<MemoryBooth>,
    ) -> Self {
        Self {
            engine,
            accounts,
            presence,
            booth,
        }
    }

    pub fn engine(&self) -> &Arc<RewardEngine> {
        &self.engine
    }

    /// Apply one command
    pub async fn apply(&self, command: SessionCommand) -> Result<()> {
        debug!("Session command: {:?}", command);
        match command {
            SessionCommand::CreateUser { user_id } => {
                self.accounts.create(user_id).await?;
                info!("Created reward record for {}", user_id);
            }
            SessionCommand::Join { user_id } => {
                self.presence.join(user_id).await;
                self.engine.user_joined(user_id);
            }
            SessionCommand::Leave { user_id } => {
                self.presence.leave(user_id).await;
                self.engine.user_left(user_id);
            }
            SessionCommand::SetWaitlist { users } => {
                self.booth.set_waitlist(users).await;
            }
            SessionCommand::SetPerformer { user_id } => {
                self.booth.set_performer(user_id).await;
            }
            SessionCommand::Advance { previous } => {
                self.engine.track_advanced(&TrackAdvance { previous }).await;
            }
            SessionCommand::Gain { user_id, points, exp } => {
                self.engine.gain(user_id, points, exp).await?;
            }
        }
        Ok(())
    }
}
