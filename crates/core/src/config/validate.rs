use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - At least one build slot and a non-empty event buffer
/// - A builder image is named
/// - Artifact URLs are http(s)
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.orchestrator.max_concurrent_builds == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_concurrent_builds cannot be 0".to_string(),
        ));
    }

    if config.orchestrator.event_buffer_size == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.event_buffer_size cannot be 0".to_string(),
        ));
    }

    if config.docker.image.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "docker.image cannot be empty".to_string(),
        ));
    }

    let base_url = &config.storage.public_base_url;
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::ValidationError(format!(
            "storage.public_base_url must be an http(s) URL, got '{}'",
            base_url
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::net::IpAddr;

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse::<IpAddr>().unwrap(),
                port: 0,
            },
            ..Config::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_slots_fails() {
        let mut config = Config::default();
        config.orchestrator.max_concurrent_builds = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("max_concurrent_builds"));
    }

    #[test]
    fn test_validate_zero_event_buffer_fails() {
        let mut config = Config::default();
        config.orchestrator.event_buffer_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_image_fails() {
        let mut config = Config::default();
        config.docker.image = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("docker.image"));
    }

    #[test]
    fn test_validate_public_base_url_scheme() {
        let mut config = Config::default();
        config.storage.public_base_url = "ftp://files.example.com".to_string();
        assert!(validate_config(&config).is_err());

        config.storage.public_base_url = "https://files.example.com".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
