use super::ConfigError;

/// Resolves the reference inside a `${...}` placeholder.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<String, ConfigError>;
}

/// Default resolver.
///
/// - `${NAME}` / `${env:NAME}`: environment variable
/// - `${file:/path/to/secret}`: file contents, trimmed
/// - `${NAME:fallback}`: environment variable with a literal fallback
pub struct DefaultSecretResolver;

impl SecretResolver for DefaultSecretResolver {
    fn resolve(&self, reference: &str) -> Result<String, ConfigError> {
        let reference = reference.trim();
        if let Some(path) = reference.strip_prefix("file:") {
            let path = path.trim();
            return std::fs::read_to_string(path)
                .map(|s| s.trim().to_string())
                .map_err(|e| ConfigError::Load(format!("secret file '{path}': {e}")));
        }
        let name = reference.strip_prefix("env:").unwrap_or(reference);
        let (name, fallback) = match name.split_once(':') {
            Some((n, f)) => (n.trim(), Some(f)),
            None => (name.trim(), None),
        };
        match (std::env::var(name), fallback) {
            (Ok(v), _) => Ok(v),
            (Err(_), Some(f)) => Ok(f.to_string()),
            (Err(_), None) => Err(ConfigError::NotFound(format!("env:{name}"))),
        }
    }
}

/// Replace every `${...}` placeholder in `value`.
pub fn resolve_placeholders(
    value: &str,
    resolver: &dyn SecretResolver,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ConfigError::Load(format!("unclosed placeholder in '{value}'")))?;
        out.push_str(&resolver.resolve(&after[..end])?);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl SecretResolver for Fixed {
        fn resolve(&self, reference: &str) -> Result<String, ConfigError> {
            Ok(format!("<{reference}>"))
        }
    }

    #[test]
    fn replaces_every_placeholder() {
        let out = resolve_placeholders("sqlite://${DIR}/${NAME}.db", &Fixed).unwrap();
        assert_eq!(out, "sqlite://<DIR>/<NAME>.db");
    }

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(resolve_placeholders("plain", &Fixed).unwrap(), "plain");
    }

    #[test]
    fn unclosed_placeholder_is_an_error() {
        assert!(resolve_placeholders("${OPEN", &Fixed).is_err());
    }

    #[test]
    fn fallback_used_when_variable_missing() {
        let out = DefaultSecretResolver
            .resolve("GENREPO_SURELY_UNSET_VARIABLE:sqlite::memory:")
            .unwrap();
        assert_eq!(out, "sqlite::memory:");
    }

    #[test]
    fn file_reference_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db-url");
        std::fs::write(&path, "sqlite://secret.db\n").unwrap();
        let out = DefaultSecretResolver
            .resolve(&format!("file:{}", path.display()))
            .unwrap();
        assert_eq!(out, "sqlite://secret.db");
    }
}
