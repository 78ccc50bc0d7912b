//! Integration tests for configuration loading and graceful degradation
//!
//! Covers:
//! - Missing config file → warning + defaults
//! - Malformed config file → configuration error
//! - Config path priority (CLI > environment > platform default)
//!
//! Tests that manipulate METRONOME_CONFIG are marked with #[serial] so they
//! never race on the process environment.

use metronome_common::config::{
    default_config_path, resolve_config_path, TomlConfig, CONFIG_ENV_VAR,
};
use metronome_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_load_full_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[metronome]
tempo = 96
beats_per_measure = 6
volume = 0.25
cue_sources = ["sounds/tick.wav", "sounds/tock.wav"]
debounce_ms = 250

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = TomlConfig::load(&path).unwrap();

    assert_eq!(config.metronome.tempo, Some(96.0));
    assert_eq!(config.metronome.beats_per_measure, Some(6.0));
    assert_eq!(config.metronome.volume, Some(0.25));
    assert_eq!(
        config.metronome.cue_sources,
        vec!["sounds/tick.wav".to_string(), "sounds/tock.wav".to_string()]
    );
    assert_eq!(config.metronome.debounce_ms, 250);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_out_of_range_values_are_kept_raw() {
    // Range checks happen in the engine
    let config = TomlConfig::from_toml_str("[metronome]\ntempo = 999\nvolume = -3.0\n").unwrap();
    assert_eq!(config.metronome.tempo, Some(999.0));
    assert_eq!(config.metronome.volume, Some(-3.0));
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("does-not-exist.toml");

    let config = TomlConfig::load_or_default(Some(&path)).unwrap();
    assert!(config.metronome.tempo.is_none());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_no_location_falls_back_to_defaults() {
    let config = TomlConfig::load_or_default(None).unwrap();
    assert!(config.metronome.cue_sources.is_empty());
}

#[test]
fn test_malformed_file_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[metronome]\ntempo = \"fast").unwrap();

    let result = TomlConfig::load_or_default(Some(&path));
    match result {
        Err(Error::Config(msg)) => assert!(msg.contains("broken.toml")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_direct_load_of_missing_file_is_io_error() {
    let result = TomlConfig::load(Path::new("/nonexistent/metronome/config.toml"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
#[serial]
fn test_resolve_prefers_cli_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let path = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), CONFIG_ENV_VAR);
    assert_eq!(path, Some(PathBuf::from("/tmp/from-cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_resolve_uses_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let path = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_eq!(path, Some(PathBuf::from("/tmp/from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_resolve_falls_back_to_platform_default() {
    env::remove_var(CONFIG_ENV_VAR);

    let path = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_eq!(path, default_config_path());
}
