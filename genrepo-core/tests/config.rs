use genrepo_core::config::{ConfigError, ConfigProperties, ConfigValue, GenrepoConfig};
use genrepo_core::DefaultSecretResolver;
use serial_test::serial;

#[test]
fn test_empty_config() {
    let config = GenrepoConfig::empty();
    assert!(matches!(
        config.get::<String>("genrepo.datasource.url"),
        Err(ConfigError::NotFound(_))
    ));
    assert_eq!(config.profile(), "test");
}

#[test]
fn test_set_get_and_defaults() {
    let mut config = GenrepoConfig::empty();
    config.set("genrepo.datasource.max_connections", ConfigValue::Integer(3));
    assert_eq!(config.get::<u32>("genrepo.datasource.max_connections").unwrap(), 3);
    assert_eq!(config.get_or("genrepo.repository.max_page_size", 100u64), 100);
    assert_eq!(config.get_opt::<u64>("missing").unwrap(), None);
}

#[test]
fn test_get_opt_reports_type_mismatch() {
    let mut config = GenrepoConfig::empty();
    config.set("flag", ConfigValue::String("maybe".into()));
    assert!(matches!(
        config.get_opt::<bool>("flag"),
        Err(ConfigError::TypeMismatch { expected: "bool", .. })
    ));
}

#[test]
fn test_yaml_document() {
    let yaml = r#"
genrepo:
  datasource:
    url: "sqlite::memory:"
    max_connections: 4
  repository:
    tracking: no-tracking
"#;
    let config = GenrepoConfig::from_yaml_str(yaml, "dev").unwrap();
    assert_eq!(
        config.get::<String>("genrepo.datasource.url").unwrap(),
        "sqlite::memory:"
    );
    assert_eq!(config.get::<i64>("genrepo.datasource.max_connections").unwrap(), 4);
    assert_eq!(config.profile(), "dev");
}

#[test]
fn test_invalid_yaml_is_a_load_error() {
    let err = GenrepoConfig::from_yaml_str("genrepo: [unclosed", "dev").unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

struct PoolSection {
    size: u32,
    label: Option<String>,
}

impl ConfigProperties for PoolSection {
    fn prefix() -> &'static str {
        "genrepo.pool"
    }

    fn from_config(config: &GenrepoConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            size: config.get_or(&Self::key("size"), 5),
            label: config.get_opt(&Self::key("label"))?,
        })
    }
}

#[test]
fn test_typed_section() {
    let config = GenrepoConfig::from_yaml_str("genrepo:\n  pool:\n    label: main\n", "dev").unwrap();
    let section: PoolSection = config.section().unwrap();
    assert_eq!(section.size, 5);
    assert_eq!(section.label.as_deref(), Some("main"));
}

#[test]
#[serial]
fn test_profile_files_and_env_overlay() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("application.yaml"),
        "genrepo:\n  datasource:\n    url: sqlite://base.db\n    max_connections: 2\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("application-prod.yaml"),
        "genrepo:\n  datasource:\n    url: sqlite://prod.db\n",
    )
    .unwrap();

    unsafe { std::env::set_var("GENREPO_DATASOURCE_MAX_CONNECTIONS", "8") };
    let config = GenrepoConfig::load_from(dir.path(), "prod", &DefaultSecretResolver).unwrap();
    unsafe { std::env::remove_var("GENREPO_DATASOURCE_MAX_CONNECTIONS") };

    assert_eq!(
        config.get::<String>("genrepo.datasource.url").unwrap(),
        "sqlite://prod.db"
    );
    assert_eq!(config.get::<u32>("genrepo.datasource.max_connections").unwrap(), 8);
}

#[test]
#[serial]
fn test_placeholders_resolved_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("application.yaml"),
        "genrepo:\n  datasource:\n    url: \"sqlite://${GENREPO_TEST_DB_DIR}/app.db\"\n",
    )
    .unwrap();

    unsafe { std::env::set_var("GENREPO_TEST_DB_DIR", "/var/data") };
    let config = GenrepoConfig::load_from(dir.path(), "dev", &DefaultSecretResolver).unwrap();
    unsafe { std::env::remove_var("GENREPO_TEST_DB_DIR") };

    assert_eq!(
        config.get::<String>("genrepo.datasource.url").unwrap(),
        "sqlite:///var/data/app.db"
    );
}
