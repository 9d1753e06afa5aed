//! Configuration resolution and graceful degradation
//!
//! Uses serial_test: tests that touch AEDPICS_* environment variables run
//! sequentially so they cannot observe each other's values.

use aedpics_common::config::{
    CompiledDefaults, LoggingConfig, RootFolderInitializer, RootFolderResolver, ServiceConfig,
    TomlConfig, DEFAULT_BIND_ADDRESS, DEFAULT_MAX_UPLOAD_BYTES,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

fn clear_env() {
    for var in [
        "AEDPICS_ROOT_FOLDER",
        "AEDPICS_ROOT",
        "AEDPICS_BIND_ADDRESS",
        "AEDPICS_SESSION_TTL_HOURS",
        "AEDPICS_USER_CACHE_TTL_SECS",
        "AEDPICS_MAX_UPLOAD_BYTES",
        "AEDPICS_VAPID_PUBLIC_KEY",
        "AEDPICS_PHONE_ENCRYPTION_KEY",
    ] {
        env::remove_var(var);
    }
}

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
    assert!(defaults.root_folder.to_string_lossy().contains("aedpics"));
}

#[test]
#[serial]
fn test_resolver_cli_arg_wins() {
    clear_env();
    env::set_var("AEDPICS_ROOT_FOLDER", "/tmp/aedpics-env");

    let resolver = RootFolderResolver::new("aedpics-api")
        .with_cli_arg(Some(PathBuf::from("/tmp/aedpics-cli")));

    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/aedpics-cli"));
    clear_env();
}

#[test]
#[serial]
fn test_resolver_env_root_folder_takes_precedence() {
    clear_env();
    env::set_var("AEDPICS_ROOT_FOLDER", "/tmp/aedpics-priority-1");
    env::set_var("AEDPICS_ROOT", "/tmp/aedpics-priority-2");

    let resolver = RootFolderResolver::new("aedpics-api");
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/aedpics-priority-1"));

    env::remove_var("AEDPICS_ROOT_FOLDER");
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/aedpics-priority-2"));
    clear_env();
}

#[test]
#[serial]
fn test_resolver_missing_config_file_uses_default() {
    clear_env();

    let resolver = RootFolderResolver::new("nonexistent-test-module-12345");
    let root_folder = resolver.resolve();

    assert!(!root_folder.as_os_str().is_empty());
}

#[test]
fn test_initializer_paths() {
    let root = PathBuf::from("/tmp/aedpics-test-root");
    let initializer = RootFolderInitializer::new(root.clone());

    assert_eq!(initializer.database_path(), root.join("aedpics.db"));
    assert_eq!(initializer.storage_path(), root.join("storage"));
}

#[test]
fn test_initializer_creates_nested_directory_idempotently() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("level1").join("level2");

    let initializer = RootFolderInitializer::new(root.clone());
    assert!(initializer.ensure_directory_exists().is_ok());
    assert!(initializer.ensure_directory_exists().is_ok());

    assert!(root.is_dir());
    assert!(!initializer.database_exists());
}

#[test]
fn test_toml_missing_fields_parse_as_none() {
    let toml_str = r#"
        root_folder = "/srv/aedpics"
        [logging]
        level = "debug"
    "#;

    let config: TomlConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/aedpics")));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.bind_address, None);
    assert_eq!(config.vapid_public_key, None);
}

#[test]
fn test_toml_load_from_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("aedpics-api.toml");
    std::fs::write(
        &path,
        r#"
        bind_address = "0.0.0.0:8080"
        session_ttl_hours = 12
        vapid_public_key = "BPublicKey"
        "#,
    )
    .unwrap();

    let config = TomlConfig::load(&path).unwrap();
    assert_eq!(config.bind_address.as_deref(), Some("0.0.0.0:8080"));
    assert_eq!(config.session_ttl_hours, Some(12));
    assert_eq!(config.logging, LoggingConfig::default());
}

#[test]
fn test_toml_load_rejects_malformed_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.toml");
    std::fs::write(&path, "bind_address = [").unwrap();

    assert!(TomlConfig::load(&path).is_err());
}

#[test]
#[serial]
fn test_service_config_defaults() {
    clear_env();

    let toml = TomlConfig {
        phone_encryption_key: Some("test-phone-key".to_string()),
        ..TomlConfig::default()
    };

    let config = ServiceConfig::resolve(&toml).unwrap();
    assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
    assert_eq!(config.session_ttl_hours, 24);
    assert_eq!(config.user_cache_ttl_secs, 60);
    assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    assert!(config.vapid_public_key.is_none());
}

#[test]
#[serial]
fn test_service_config_env_overrides_toml() {
    clear_env();
    env::set_var("AEDPICS_BIND_ADDRESS", "0.0.0.0:9000");
    env::set_var("AEDPICS_SESSION_TTL_HOURS", "8");

    let toml = TomlConfig {
        bind_address: Some("127.0.0.1:7000".to_string()),
        session_ttl_hours: Some(48),
        vapid_public_key: Some("BFromToml".to_string()),
        phone_encryption_key: Some("toml-phone-key".to_string()),
        ..TomlConfig::default()
    };

    let config = ServiceConfig::resolve(&toml).unwrap();
    assert_eq!(config.bind_address, "0.0.0.0:9000");
    assert_eq!(config.session_ttl_hours, 8);
    assert_eq!(config.vapid_public_key.as_deref(), Some("BFromToml"));
    clear_env();
}

#[test]
#[serial]
fn test_service_config_rejects_bad_values() {
    clear_env();
    env::set_var("AEDPICS_SESSION_TTL_HOURS", "soon");
    assert!(ServiceConfig::resolve(&TomlConfig::default()).is_err());

    env::set_var("AEDPICS_SESSION_TTL_HOURS", "0");
    assert!(ServiceConfig::resolve(&TomlConfig::default()).is_err());
    clear_env();
}

#[test]
#[serial]
fn test_service_config_requires_phone_key() {
    clear_env();
    let err = ServiceConfig::resolve(&TomlConfig::default()).unwrap_err();
    assert!(err.to_string().contains("phone_encryption_key"));

    env::set_var("AEDPICS_PHONE_ENCRYPTION_KEY", "env-phone-key");
    let config = ServiceConfig::resolve(&TomlConfig::default()).unwrap();
    assert_eq!(config.phone_encryption_key, "env-phone-key");
    clear_env();
}
