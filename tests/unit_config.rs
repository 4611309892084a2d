use std::fs;

use chrono::Duration;
use rota::config::{Config, PoolExpiryPolicy};
use rota::identity::{AdminDirectory, StaticDirectory};
use rota::negotiation::NegotiationPolicy;

#[test]
fn partial_config_keeps_other_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join(".rota.toml"),
        "[identity]\nadmins = [\"pi\"]\n",
    )?;

    let config = Config::load_from_dir(dir.path())?;
    assert_eq!(config.identity.admins, vec!["pi"]);
    assert_eq!(config.identity.default_actor, "unknown");
    assert_eq!(config.negotiation.max_republish, 1);
    assert_eq!(config.deadlines.warn_before()?, Duration::days(3));
    Ok(())
}

#[test]
fn negotiation_policy_follows_config() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join(".rota.toml"),
        "[negotiation]\npool_horizon = \"2d\"\non_pool_expiry = \"republish\"\nmax_republish = 2\n",
    )?;

    let config = Config::load_from_dir(dir.path())?;
    let policy = NegotiationPolicy::from_config(&config.negotiation)?;
    assert_eq!(policy.pool_horizon, Duration::days(2));
    assert_eq!(policy.on_expiry, PoolExpiryPolicy::Republish);
    assert_eq!(policy.max_republish, 2);
    Ok(())
}

#[test]
fn admin_directory_comes_from_identity() {
    let mut config = Config::default();
    config.identity.admins = vec!["pi".to_string(), "manager".to_string()];

    let directory = StaticDirectory::from_config(&config);
    assert!(directory.is_admin("pi"));
    assert!(!directory.is_admin("student"));
    assert_eq!(directory.admins(), vec!["manager", "pi"]);
}

#[test]
fn malformed_toml_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join(".rota.toml"), "[identity\n").expect("write");
    let err = Config::load_from_dir(dir.path()).expect_err("parse error");
    assert_eq!(err.exit_code(), rota::error::exit_codes::OPERATION_FAILED);
}
