//! Reaction rewarder
//!
//! Converts the reactions a finished track received into experience for the
//! user who presented it. Runs fire-and-forget next to the track-advance
//! pipeline: failures are logged here and never reach the caller.

use crate::gain::{GainApplicator, GainOutcome};
use boothxp_common::config::ReactionRates;
use boothxp_common::Error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Reactions collected by a track that just finished playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTrack {
    /// User who presented the track
    pub presenter_id: Uuid,
    #[serde(default)]
    pub approvals: u32,
    #[serde(default)]
    pub disapprovals: u32,
    #[serde(default)]
    pub favorites: u32,
}

/// Booth advanced to the next track
///
/// `previous` is None when nothing was playing before the advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackAdvance {
    pub previous: Option<CompletedTrack>,
}

/// Experience earned by a track's reactions
pub fn exp_for_reactions(track: &CompletedTrack, rates: &ReactionRates) -> i64 {
    i64::from(track.approvals) * rates.approve
        + i64::from(track.disapprovals) * rates.disapprove
        + i64::from(track.favorites) * rates.favorite
}

/// Turns track-advance events into presenter gains
pub struct ReactionRewarder {
    rates: ReactionRates,
    gain: Arc<GainApplicator>,
}

impl ReactionRewarder {
    pub fn new(rates: ReactionRates, gain: Arc<GainApplicator>) -> Self {
        Self { rates, gain }
    }

    /// Reward the presenter of the track that just finished
    ///
    /// Returns the applied gain, or None when there was no previous track or
    /// the gain failed (failures are logged, not propagated).
    pub async fn handle_advance(&self, advance: &TrackAdvance) -> Option<GainOutcome> {
        let track = advance.previous.as_ref()?;
        let exp = exp_for_reactions(track, &self.rates);

        debug!(
            "Track by {} finished: {} approvals, {} disapprovals, {} favorites → {} exp",
            track.presenter_id, track.approvals, track.disapprovals, track.favorites, exp
        );

        match self.gain.gain(track.presenter_id, 0, exp).await {
            Ok(outcome) => Some(outcome),
            Err(Error::UserNotFound(id)) => {
                warn!("Presenter {} not found, reaction reward dropped", id);
                None
            }
            Err(e) => {
                error!(
                    "Reaction reward for {} failed: {}",
                    track.presenter_id, e
                );
                None
            }
        }
    }

    /// Consume a track-advance feed until it closes
    ///
    /// Each advance is handled in its own task so a slow store never holds up
    /// the feed.
    pub fn spawn_listener(self: Arc<Self>, mut rx: mpsc::Receiver<TrackAdvance>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Reaction rewarder listening for track advances");
            while let Some(advance) = rx.recv().await {
                let rewarder = self.clone();
                tokio::spawn(async move {
                    rewarder.handle_advance(&advance).await;
                });
            }
            info!("Track advance feed closed, reaction rewarder stopped");
        })
    }
}
