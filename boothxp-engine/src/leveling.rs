//! Level progression
//!
//! Pure state transition from (exp, level) to the next level. A user advances
//! at most one level per call: when a single gain crosses several thresholds
//! the remaining levels are picked up by later gains, each of which
//! re-evaluates the next boundary. Level-ups past the end of the threshold
//! table are never granted.

use boothxp_common::config::LevelThresholds;
use boothxp_common::UserRewardState;

/// Advance `state` by one level if its exp has passed the next threshold
///
/// On level-up the level becomes `state.level + 1` and
/// `(state.level + 1) * bonus_per_level` points are added. Returns the level
/// reached, or `None` when nothing changed.
pub fn apply_level_up(
    state: &mut UserRewardState,
    thresholds: &LevelThresholds,
    bonus_per_level: i64,
) -> Option<u32> {
    let next = state.level.checked_add(1)?;
    let threshold = thresholds.get(next)?;

    if state.exp <= threshold {
        return None;
    }

    state.level = next;
    state.points += i64::from(next) * bonus_per_level;
    Some(next)
}

/// Level `exp` would reach if every crossed threshold were applied at once
///
/// Read-only; used to report users lagging behind their experience.
pub fn level_for_exp(exp: i64, thresholds: &LevelThresholds) -> u32 {
    let mut level = 1;
    while let Some(threshold) = thresholds.get(level + 1) {
        if exp <= threshold {
            break;
        }
        level += 1;
    }
    level
}
