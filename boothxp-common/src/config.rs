//! Reward configuration and config file resolution
//!
//! The configuration is an immutable value built once at startup and handed to
//! each engine component. Compiled defaults cover every field; a TOML file may
//! override any subset of them.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "BOOTHXP_CONFIG";

/// Cumulative experience required for levels 1..=25
pub const DEFAULT_THRESHOLDS: [i64; 25] = [
    12, 45, 180, 1350, 3000, 8400, 12500, 18900, 26150, 34875, 44000, 55500, 69225, 85575,
    110550, 139290, 173450, 212450, 262025, 315450, 371375, 427392, 483409, 539426, 595442,
];

/// Experience granted per reaction on a presented track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReactionRates {
    pub approve: i64,
    pub disapprove: i64,
    /// Favorites count as an experience bonus, not points
    pub favorite: i64,
}

impl Default for ReactionRates {
    fn default() -> Self {
        Self {
            approve: 1,
            disapprove: -1,
            favorite: 2,
        }
    }
}

/// Inclusive integer range a dispensation amount is drawn from
///
/// Written as a two-element array in TOML: `exp_range = [5, 7]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "[i64; 2]")]
pub struct DrawRange {
    pub min: i64,
    pub max: i64,
}

impl DrawRange {
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Range after scaling both ends by `multiplier` and rounding
    pub fn scaled(&self, multiplier: f64) -> DrawRange {
        DrawRange {
            min: (self.min as f64 * multiplier).round() as i64,
            max: (self.max as f64 * multiplier).round() as i64,
        }
    }
}

impl From<[i64; 2]> for DrawRange {
    fn from(bounds: [i64; 2]) -> Self {
        Self::new(bounds[0], bounds[1])
    }
}

/// Passive dispensation tunables
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DispenserConfig {
    pub exp_range: DrawRange,
    pub points_range: DrawRange,
    /// Applied when the user is on the waitlist or performing
    pub participation_exp_multiplier: f64,
    pub participation_points_multiplier: f64,
    /// Delay between dispensation cycles for a present user
    pub interval_secs: u64,
}

impl Default for DispenserConfig {
    fn default() -> Self {
        Self {
            exp_range: DrawRange::new(5, 7),
            points_range: DrawRange::new(15, 20),
            participation_exp_multiplier: 1.4,
            participation_points_multiplier: 1.2,
            interval_secs: 300,
        }
    }
}

impl DispenserConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Level-up bonus tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LevelUpConfig {
    /// Points granted on level-up, multiplied by the level reached
    pub points_bonus_per_level: i64,
}

impl Default for LevelUpConfig {
    fn default() -> Self {
        Self {
            points_bonus_per_level: 200,
        }
    }
}

/// Ordered mapping level → cumulative experience
///
/// Levels outside the table (0, or past the highest configured level) have no
/// threshold. In TOML the table is an array whose first element is level 1.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<i64>")]
pub struct LevelThresholds {
    by_level: BTreeMap<u32, i64>,
}

impl LevelThresholds {
    /// Build from explicit (level, threshold) pairs
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, i64)>,
    {
        Self {
            by_level: pairs.into_iter().collect(),
        }
    }

    /// Threshold for `level`, if the table defines one
    pub fn get(&self, level: u32) -> Option<i64> {
        self.by_level.get(&level).copied()
    }

    /// Highest level the table defines
    pub fn max_level(&self) -> Option<u32> {
        self.by_level.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.by_level.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_level.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, i64)> + '_ {
        self.by_level.iter().map(|(level, exp)| (*level, *exp))
    }
}

impl From<Vec<i64>> for LevelThresholds {
    fn from(values: Vec<i64>) -> Self {
        Self::from_pairs(
            values
                .into_iter()
                .enumerate()
                .map(|(i, exp)| (i as u32 + 1, exp)),
        )
    }
}

impl Default for LevelThresholds {
    fn default() -> Self {
        DEFAULT_THRESHOLDS.to_vec().into()
    }
}

/// Complete reward configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub reactions: ReactionRates,
    pub dispenser: DispenserConfig,
    pub level_up: LevelUpConfig,
    pub thresholds: LevelThresholds,
    /// Maximum counted dispensation cycles per user per day
    ///
    /// 71 cycles is roughly one every 5 minutes for 6 hours.
    pub daily_cycle_cap: u32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            reactions: ReactionRates::default(),
            dispenser: DispenserConfig::default(),
            level_up: LevelUpConfig::default(),
            thresholds: LevelThresholds::default(),
            daily_cycle_cap: 71,
        }
    }
}

impl RewardConfig {
    /// Parse a TOML document, filling missing fields with compiled defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RewardConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid reward config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded reward config from {}", path.display());
        Ok(config)
    }

    /// Load the config file if one was resolved, otherwise use compiled defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                info!("No reward config file found, using compiled defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let d = &self.dispenser;
        for (name, range) in [("exp_range", d.exp_range), ("points_range", d.points_range)] {
            if range.min > range.max {
                return Err(Error::Config(format!(
                    "dispenser.{} is inverted: [{}, {}]",
                    name, range.min, range.max
                )));
            }
            if range.min < 0 {
                return Err(Error::Config(format!(
                    "dispenser.{} must not be negative: [{}, {}]",
                    name, range.min, range.max
                )));
            }
        }

        for (name, value) in [
            ("participation_exp_multiplier", d.participation_exp_multiplier),
            ("participation_points_multiplier", d.participation_points_multiplier),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!(
                    "dispenser.{} must be positive, got {}",
                    name, value
                )));
            }
        }

        if d.interval_secs == 0 {
            return Err(Error::Config(
                "dispenser.interval_secs must be at least 1".to_string(),
            ));
        }

        let mut previous: Option<(u32, i64)> = None;
        for (level, exp) in self.thresholds.iter() {
            if level == 0 {
                return Err(Error::Config("thresholds cannot define level 0".to_string()));
            }
            if let Some((prev_level, prev_exp)) = previous {
                if exp <= prev_exp {
                    return Err(Error::Config(format!(
                        "threshold for level {} ({}) must exceed level {} ({})",
                        level, exp, prev_level, prev_exp
                    )));
                }
            }
            previous = Some((level, exp));
        }

        Ok(())
    }
}

/// Config file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `<config dir>/boothxp/config.toml` when present
/// 4. None (compiled defaults)
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
        warn!("{} is set but empty, ignoring", env_var_name);
    }

    // Priority 3: Platform config directory
    default_config_file().filter(|path| path.exists())
}

/// `~/.config/boothxp/config.toml` or the platform equivalent
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("boothxp").join("config.toml"))
}
