use ladder_core::{ConfigError, LadderConfig, ENV_API_URL, ENV_PYTHON_WASM};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn loads_sections_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[api]
base_url = "https://ladder.example.com/api"
token = "abc"

[runtime]
module_path = "/opt/ladder/python.wasm"
stdlib_dir = "/opt/ladder/lib"
wall_clock_ms = 2500

[cache]
freshness_secs = 60
"#
    )
    .unwrap();

    let config = LadderConfig::from_file(file.path()).unwrap();

    assert_eq!(config.api.base_url, "https://ladder.example.com/api");
    assert_eq!(config.api.token.as_deref(), Some("abc"));
    assert_eq!(config.api.timeout_secs, 15);
    assert_eq!(config.runtime.limits().wall_clock, Duration::from_millis(2500));
    assert_eq!(config.cache.freshness(), Duration::from_secs(60));

    let python = config.runtime.python().unwrap();
    assert_eq!(python.module_path, PathBuf::from("/opt/ladder/python.wasm"));
    assert_eq!(python.stdlib_dir, Some(PathBuf::from("/opt/ladder/lib")));
    assert!(config.validate().is_ok());
}

#[test]
fn missing_sections_use_defaults() {
    let config = LadderConfig::from_toml_str("[cache]\nfreshness_secs = 10\n").unwrap();
    assert_eq!(config.api, LadderConfig::default().api);
    assert_eq!(config.runtime, LadderConfig::default().runtime);
    assert_eq!(config.cache.freshness_secs, 10);
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = LadderConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = LadderConfig::from_toml_str("[runtime]\nwall_clock_ms = \"soon\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn environment_overrides_file() {
    let config = LadderConfig::from_toml_str("[api]\nbase_url = \"http://file\"\n")
        .unwrap()
        .apply_env_with(|key| match key {
            ENV_API_URL => Some("http://env".into()),
            ENV_PYTHON_WASM => Some("/env/python.wasm".into()),
            _ => None,
        });

    assert_eq!(config.api.base_url, "http://env");
    assert_eq!(config.api.token, None);
    assert_eq!(
        config.runtime.module_path,
        Some(PathBuf::from("/env/python.wasm"))
    );
}

#[test]
fn empty_base_url_rejected() {
    let config = LadderConfig::from_toml_str("[api]\nbase_url = \"\"\n").unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn zero_freshness_rejected() {
    let config = LadderConfig::from_toml_str("[cache]\nfreshness_secs = 0\n").unwrap();
    let err = config.validate().unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid config: cache.freshness_secs must be positive"
    );
}
