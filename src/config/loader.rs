//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config: GatewayConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    apply_env_overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides to a configuration.
///
/// `PROXY_AUTH_TOKEN` wins over the file-supplied secret so deployments can
/// keep the token out of the config file.
pub fn apply_env_overrides(config: &mut GatewayConfig) {
    if let Ok(secret) = std::env::var("PROXY_AUTH_TOKEN") {
        if !secret.is_empty() {
            config.auth.secret = Some(secret);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_round_trip() {
        let mut file = tempfile_path("gateway-config-ok.toml");
        write!(
            file.1,
            r#"
            [listener]
            bind_address = "127.0.0.1:3999"

            [auth]
            secret = "secret123"

            [engine]
            default = "plain"
            "#
        )
        .unwrap();
        drop(file.1);

        let config = load_config(&file.0).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:3999");
        assert_eq!(config.auth.effective_secret(), Some("secret123"));
        std::fs::remove_file(&file.0).ok();
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let mut file = tempfile_path("gateway-config-bad.toml");
        write!(file.1, "listener = 12").unwrap();
        drop(file.1);

        match load_config(&file.0) {
            Err(ConfigError::Parse(_)) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
        std::fs::remove_file(&file.0).ok();
    }

    fn tempfile_path(name: &str) -> (std::path::PathBuf, std::fs::File) {
        let path = std::env::temp_dir().join(name);
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
