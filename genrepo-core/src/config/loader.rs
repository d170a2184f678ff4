use std::collections::HashMap;
use std::path::Path;

use super::value::ConfigValue;
use super::ConfigError;

/// Prefix an environment variable needs to be considered a config override.
const ENV_PREFIX: &str = "GENREPO_";

/// Merge a YAML file into `values`. A missing file is not an error.
pub(crate) fn merge_yaml_file(
    path: &Path,
    values: &mut HashMap<String, ConfigValue>,
) -> Result<(), ConfigError> {
    if !path.exists() {
        return Ok(());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    merge_yaml_str(&content, values)
}

pub(crate) fn merge_yaml_str(
    content: &str,
    values: &mut HashMap<String, ConfigValue>,
) -> Result<(), ConfigError> {
    let doc: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;
    flatten("", &doc, values);
    Ok(())
}

/// Flatten nested mappings into dot-separated keys. Sequences are stored
/// whole under their parent key.
fn flatten(prefix: &str, node: &serde_yaml::Value, out: &mut HashMap<String, ConfigValue>) {
    match node {
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                let segment = match k {
                    serde_yaml::Value::String(s) => s.clone(),
                    other => ConfigValue::from_yaml(other).to_string(),
                };
                let key = if prefix.is_empty() {
                    segment
                } else {
                    format!("{prefix}.{segment}")
                };
                flatten(&key, v, out);
            }
        }
        leaf if !prefix.is_empty() => {
            out.insert(prefix.to_string(), ConfigValue::from_yaml(leaf));
        }
        _ => {}
    }
}

/// Overlay `GENREPO_*` environment variables.
///
/// A variable replaces the existing key whose upper-cased, underscore-joined
/// form equals the variable name (so `GENREPO_DATASOURCE_MAX_CONNECTIONS`
/// targets `genrepo.datasource.max_connections`). Unknown variables become a
/// new dot-separated key.
pub(crate) fn overlay_env(
    vars: impl IntoIterator<Item = (String, String)>,
    values: &mut HashMap<String, ConfigValue>,
) {
    for (name, raw) in vars {
        if !name.starts_with(ENV_PREFIX) {
            continue;
        }
        let existing = values
            .keys()
            .find(|key| env_name(key) == name)
            .cloned();
        let key = existing.unwrap_or_else(|| name.to_lowercase().replace('_', "."));
        values.insert(key, ConfigValue::String(raw));
    }
}

fn env_name(key: &str) -> String {
    key.to_uppercase().replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_mappings() {
        let mut values = HashMap::new();
        merge_yaml_str("genrepo:\n  datasource:\n    url: sqlite::memory:\n", &mut values).unwrap();
        assert!(matches!(
            values.get("genrepo.datasource.url"),
            Some(ConfigValue::String(s)) if s == "sqlite::memory:"
        ));
    }

    #[test]
    fn env_overlay_targets_existing_underscored_key() {
        let mut values = HashMap::new();
        values.insert(
            "genrepo.datasource.max_connections".to_string(),
            ConfigValue::Integer(5),
        );
        overlay_env(
            vec![
                ("GENREPO_DATASOURCE_MAX_CONNECTIONS".to_string(), "9".to_string()),
                ("PATH".to_string(), "/usr/bin".to_string()),
            ],
            &mut values,
        );
        assert!(matches!(
            values.get("genrepo.datasource.max_connections"),
            Some(ConfigValue::String(s)) if s == "9"
        ));
        assert!(!values.contains_key("path"));
    }

    #[test]
    fn env_overlay_creates_new_key() {
        let mut values = HashMap::new();
        overlay_env(
            vec![("GENREPO_DATASOURCE_URL".to_string(), "sqlite://x.db".to_string())],
            &mut values,
        );
        assert!(values.contains_key("genrepo.datasource.url"));
    }
}
