//! Integration tests for reward config loading and file resolution
//!
//! Tests that manipulate BOOTHXP_CONFIG are marked with #[serial] so they do
//! not race each other on the process environment.

use boothxp_common::config::{resolve_config_path, DrawRange, RewardConfig, CONFIG_ENV_VAR};
use boothxp_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;

#[test]
fn test_load_reads_overrides_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
daily_cycle_cap = 12

[reactions]
favorite = 3

[level_up]
points_bonus_per_level = 250

[dispenser]
points_range = [18, 23]
"#
    )
    .unwrap();

    let config = RewardConfig::load(file.path()).unwrap();
    assert_eq!(config.daily_cycle_cap, 12);
    assert_eq!(config.reactions.favorite, 3);
    assert_eq!(config.reactions.approve, 1);
    assert_eq!(config.level_up.points_bonus_per_level, 250);
    assert_eq!(config.dispenser.points_range, DrawRange::new(18, 23));
}

#[test]
fn test_load_missing_file_is_io_error() {
    let result = RewardConfig::load(&PathBuf::from("/nonexistent/boothxp/config.toml"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_load_or_default_without_path() {
    let config = RewardConfig::load_or_default(None).unwrap();
    assert_eq!(config, RewardConfig::default());
}

#[test]
fn test_load_rejects_invalid_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[dispenser]\nexp_range = [9, 2]").unwrap();

    let result = RewardConfig::load_or_default(Some(file.path()));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_cli_argument_overrides_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let cli = PathBuf::from("/tmp/from-cli.toml");
    let resolved = resolve_config_path(Some(&cli), CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(cli));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_empty_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "");

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    // Falls through to the platform config file, which only counts if present
    if let Some(path) = resolved {
        assert!(path.exists());
        assert!(path.ends_with("boothxp/config.toml"));
    }

    env::remove_var(CONFIG_ENV_VAR);
}
