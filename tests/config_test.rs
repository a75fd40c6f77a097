use assert_matches::assert_matches;

use movieo_sync::ConfigError;
use movieo_sync::achievement::CategoryTable;
use movieo_sync::global::config::{AppConfig, LogRotation};

const MINIMAL: &str = r#"
[app]
log_level = "debug"

[api]
base_url = "https://api.movieo.test/api"
"#;

#[test]
fn minimal_config_uses_defaults() {
    let config = AppConfig::from_toml_str(MINIMAL).unwrap();

    assert_eq!(config.app.log_level, "debug");
    assert!(!config.app.logging.log_to_file);
    assert_eq!(config.app.logging.log_rotation, LogRotation::Daily);
    assert_eq!(config.api.token, None);
    assert_eq!(config.api.timeout_seconds, 30);
    assert_eq!(config.api.retry.max_retries, 3);
    assert_eq!(config.achievements.min_check_interval_ms, 2000);
    assert!(!config.achievements.trigger_server_check);

    let keys: Vec<_> = config
        .category_table()
        .unwrap()
        .iter()
        .map(|c| c.key.clone())
        .collect();
    assert_eq!(keys, ["anime", "movies", "tv", "manga"]);
}

#[test]
fn categories_from_config_define_the_order() {
    let source = format!(
        "{}{}",
        MINIMAL,
        r#"
[achievements]
trigger_server_check = true

[[achievements.categories]]
key = "manga"
label = "Manga"
unit = "chapters"

[[achievements.categories]]
key = "movies"
label = "Movies"
unit = "movies"
icon = "film"
"#
    );

    let config = AppConfig::from_toml_str(&source).unwrap();
    let table = config.category_table().unwrap();

    assert!(config.achievements.trigger_server_check);
    assert_eq!(table.len(), 2);
    assert_eq!(table.position("manga"), Some(0));
    assert_eq!(table.position("movies"), Some(1));
    assert_eq!(table.get("movies").map(|c| c.icon.as_str()), Some("film"));
    assert_eq!(table.position("anime"), None);
}

#[test]
fn duplicate_category_is_rejected() {
    let source = format!(
        "{}{}",
        MINIMAL,
        r#"
[[achievements.categories]]
key = "tv"
label = "TV"
unit = "episodes"

[[achievements.categories]]
key = "tv"
label = "Shows"
unit = "episodes"
"#
    );

    let config = AppConfig::from_toml_str(&source).unwrap();

    assert_matches!(config.category_table(), Err(ConfigError::Invalid(msg)) if msg.contains("'tv'"));
}

#[test]
fn non_http_base_url_is_rejected() {
    let source = MINIMAL.replace("https://api.movieo.test/api", "ftp://api.movieo.test");

    assert_matches!(AppConfig::from_toml_str(&source), Err(ConfigError::Invalid(_)));
}

#[test]
fn zero_check_interval_is_rejected() {
    let source = format!("{}\n[achievements]\nmin_check_interval_ms = 0\n", MINIMAL);

    assert_matches!(AppConfig::from_toml_str(&source), Err(ConfigError::Invalid(msg)) if msg.contains("min_check_interval_ms"));
}

#[test]
fn missing_api_section_fails_to_load() {
    let source = "[app]\nlog_level = \"info\"\n";

    assert_matches!(AppConfig::from_toml_str(source), Err(ConfigError::LoadFailed(_)));
}

#[test]
fn debug_output_redacts_the_token() {
    let source = MINIMAL.replace(
        "base_url = \"https://api.movieo.test/api\"",
        "base_url = \"https://api.movieo.test/api\"\ntoken = \"s3cr3t-bearer\"",
    );
    let config = AppConfig::from_toml_str(&source).unwrap();
    let printed = format!("{:?}", config);

    assert_eq!(config.api.token.as_deref(), Some("s3cr3t-bearer"));
    assert!(!printed.contains("s3cr3t-bearer"));
    assert!(printed.contains("<redacted>"));
    assert!(printed.contains("https://api.movieo.test/api"));
}

#[test]
fn sample_config_matches_builtin_categories() {
    let config = AppConfig::from_toml_str(include_str!("../config.toml")).unwrap();

    assert_eq!(config.category_table().unwrap(), CategoryTable::default());
}
