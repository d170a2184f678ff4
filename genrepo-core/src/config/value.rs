use std::time::Duration;

use super::ConfigError;

/// A single configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
    List(Vec<ConfigValue>),
}

impl ConfigValue {
    pub(crate) fn from_yaml(node: &serde_yaml::Value) -> Self {
        match node {
            serde_yaml::Value::Null => ConfigValue::Null,
            serde_yaml::Value::Bool(b) => ConfigValue::Bool(*b),
            serde_yaml::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => ConfigValue::Integer(i),
                (None, Some(f)) => ConfigValue::Float(f),
                (None, None) => ConfigValue::String(n.to_string()),
            },
            serde_yaml::Value::String(s) => ConfigValue::String(s.clone()),
            serde_yaml::Value::Sequence(items) => {
                ConfigValue::List(items.iter().map(ConfigValue::from_yaml).collect())
            }
            // Nested mappings are flattened by the loader before reaching here.
            other => ConfigValue::String(format!("{other:?}")),
        }
    }

    fn mismatch(key: &str, expected: &'static str) -> ConfigError {
        ConfigError::TypeMismatch {
            key: key.to_string(),
            expected,
        }
    }
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::String(s) => f.write_str(s),
            ConfigValue::Integer(i) => write!(f, "{i}"),
            ConfigValue::Float(x) => write!(f, "{x}"),
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Null => f.write_str("null"),
            ConfigValue::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Conversion from a raw `ConfigValue` into a concrete type.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be read from the configuration",
    note = "built-in types: String, i64, f64, bool, integers, Duration (seconds), Option<T>, Vec<T>"
)]
pub trait FromConfigValue: Sized {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError>;
}

impl FromConfigValue for String {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::Null | ConfigValue::List(_) => Err(ConfigValue::mismatch(key, "String")),
            scalar => Ok(scalar.to_string()),
        }
    }
}

impl FromConfigValue for i64 {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::Integer(i) => Ok(*i),
            ConfigValue::String(s) => s.trim().parse().map_err(|_| ConfigValue::mismatch(key, "i64")),
            _ => Err(ConfigValue::mismatch(key, "i64")),
        }
    }
}

impl FromConfigValue for f64 {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::Float(x) => Ok(*x),
            ConfigValue::Integer(i) => Ok(*i as f64),
            ConfigValue::String(s) => s.trim().parse().map_err(|_| ConfigValue::mismatch(key, "f64")),
            _ => Err(ConfigValue::mismatch(key, "f64")),
        }
    }
}

impl FromConfigValue for bool {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::Bool(b) => Ok(*b),
            ConfigValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(ConfigValue::mismatch(key, "bool")),
            },
            _ => Err(ConfigValue::mismatch(key, "bool")),
        }
    }
}

/// Durations are expressed in whole seconds.
impl FromConfigValue for Duration {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        let secs = u64::from_config_value(value, key)?;
        Ok(Duration::from_secs(secs))
    }
}

impl<T: FromConfigValue> FromConfigValue for Option<T> {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::Null => Ok(None),
            other => T::from_config_value(other, key).map(Some),
        }
    }
}

impl<T: FromConfigValue> FromConfigValue for Vec<T> {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| T::from_config_value(item, &format!("{key}[{i}]")))
                .collect(),
            ConfigValue::String(s) => s
                .split(',')
                .map(|part| T::from_config_value(&ConfigValue::String(part.trim().to_string()), key))
                .collect(),
            other => Ok(vec![T::from_config_value(other, key)?]),
        }
    }
}

macro_rules! narrow_integer {
    ($($ty:ty),+) => {
        $(
            impl FromConfigValue for $ty {
                fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
                    let wide = i64::from_config_value(value, key)?;
                    <$ty>::try_from(wide).map_err(|_| ConfigValue::mismatch(key, stringify!($ty)))
                }
            }
        )+
    };
}

narrow_integer!(u8, u16, u32, u64, usize, i8, i16, i32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_range_checked() {
        let err = u8::from_config_value(&ConfigValue::Integer(300), "pool").unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { expected: "u8", .. }));
        assert_eq!(u32::from_config_value(&ConfigValue::Integer(7), "pool").unwrap(), 7);
    }

    #[test]
    fn strings_from_env_parse_into_scalars() {
        let v = ConfigValue::String(" 42 ".into());
        assert_eq!(i64::from_config_value(&v, "k").unwrap(), 42);
        assert!(bool::from_config_value(&ConfigValue::String("YES".into()), "k").unwrap());
    }

    #[test]
    fn duration_reads_seconds() {
        let d = Duration::from_config_value(&ConfigValue::Integer(3), "timeout").unwrap();
        assert_eq!(d, Duration::from_secs(3));
    }

    #[test]
    fn comma_separated_string_becomes_list() {
        let v = ConfigValue::String("a, b,c".into());
        let list: Vec<String> = Vec::from_config_value(&v, "k").unwrap();
        assert_eq!(list, vec!["a", "b", "c"]);
    }
}
