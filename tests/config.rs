mod common;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::json;

use dd_headers::config::{ConfigLoader, Profile};
use dd_headers::domain::MatchMode;
use dd_headers::error::HeaderError;

use common::Fixture;

#[test]
fn resolves_defaults() {
    let fixture = Fixture::new();
    let config = fixture.config(false);

    assert_eq!(config.logging.log_level, "info");
    assert!(!config.retrieval.stage);
    assert_eq!(config.retrieval.bundle_marker, ".tar");
    assert_eq!(config.paths.manifest_dir, fixture.manifest_dir());
    assert_eq!(config.extraction.dump_tool, "ncdump");
    assert_eq!(config.extraction.dump_args, vec!["-h".to_string()]);
    assert_eq!(config.database.application_name, "data_discovery_header_dump");
    assert_eq!(config.database.password.as_deref(), Some("secret"));
    assert!(config.publish.destination.is_none());
    assert!(!config.skip.rules().is_empty());
}

#[test]
fn skip_entries_accept_shorthand_and_explicit_mode() {
    let fixture = Fixture::new();
    let mut value = fixture.config_json(true);
    value["skip"] = json!([
        ".png",
        { "pattern": ".txt.tar", "match": "suffix" },
        { "pattern": "^sgp.*\\.raw$", "match": "regex" }
    ]);
    let config = ConfigLoader::resolve_str(&value.to_string()).unwrap();

    let modes: Vec<MatchMode> = config.skip.rules().iter().map(|rule| rule.mode()).collect();
    assert_eq!(
        modes,
        vec![MatchMode::Substring, MatchMode::Suffix, MatchMode::Regex]
    );
    assert!(config.retrieval.stage);
}

#[test]
fn invalid_skip_regex_is_a_configuration_error() {
    let fixture = Fixture::new();
    let mut value = fixture.config_json(false);
    value["skip"] = json!([{ "pattern": "[", "match": "regex" }]);
    let err = ConfigLoader::resolve_str(&value.to_string()).unwrap_err();
    assert_matches!(err, HeaderError::InvalidSkipRule { .. });
    assert!(err.is_configuration());
}

#[test]
fn scratch_directories_must_differ() {
    let fixture = Fixture::new();
    let mut value = fixture.config_json(false);
    value["paths"]["extraction_loc"] = value["paths"]["download_loc"].clone();
    let err = ConfigLoader::resolve_str(&value.to_string()).unwrap_err();
    assert_matches!(err, HeaderError::InvalidConfig(_));
}

#[test]
fn manifest_dir_cannot_be_scratch() {
    let fixture = Fixture::new();
    let mut value = fixture.config_json(false);
    value["paths"]["manifest_dir"] = json!(fixture.download_loc().join("lists").as_str());
    let err = ConfigLoader::resolve_str(&value.to_string()).unwrap_err();
    assert_matches!(err, HeaderError::InvalidConfig(_));
}

#[test]
fn staging_requires_userid() {
    let fixture = Fixture::new();
    let mut value = fixture.config_json(true);
    value["retrieval"]["userid"] = json!("");
    let err = ConfigLoader::resolve_str(&value.to_string()).unwrap_err();
    assert_matches!(err, HeaderError::InvalidConfig(_));
}

#[test]
fn missing_sections_fail_to_parse() {
    let err = ConfigLoader::resolve_str(r#"{ "logging": { "log_dir": "/tmp" } }"#).unwrap_err();
    assert_matches!(err, HeaderError::ConfigParse(_));
}

#[test]
fn missing_file_is_reported() {
    let fixture = Fixture::new();
    let path = fixture.root.join("absent.json");
    let err = ConfigLoader::resolve(Some(path.as_str()), Profile::Production).unwrap_err();
    assert_matches!(err, HeaderError::MissingConfig(_));
}

#[test]
fn loads_profile_file_from_explicit_path() {
    let fixture = Fixture::new();
    let path: Utf8PathBuf = fixture.root.join("dd-headers.dev.json");
    std::fs::write(path.as_std_path(), fixture.config_json(false).to_string()).unwrap();
    let config = ConfigLoader::resolve(Some(path.as_str()), Profile::Test).unwrap();
    assert_eq!(config.paths.header_dir, fixture.header_dir());
    assert_eq!(Profile::Test.default_config_file(), "dd-headers.dev.json");
    assert_eq!(Profile::Production.default_config_file(), "dd-headers.prod.json");
}
