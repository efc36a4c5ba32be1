use crate::config::types::{CoverConfig, ListConfig, NetworkConfig, ScraperConfig};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &ScraperConfig) -> ConfigResult<()> {
    validate_list_config(&config.list)?;
    validate_cover_config(&config.covers)?;
    validate_network_config(&config.network)?;
    validate_output_config(config)?;
    Ok(())
}

/// Validates the list identifier, page range and base URL
fn validate_list_config(config: &ListConfig) -> ConfigResult<()> {
    if config.id.is_empty() {
        return Err(ConfigError::Validation("list id cannot be empty".to_string()));
    }

    if config
        .id
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == '?' || c == '#')
    {
        return Err(ConfigError::Validation(format!(
            "list id must not contain whitespace, '/', '?' or '#', got '{}'",
            config.id
        )));
    }

    if config.start_page < 1 {
        return Err(ConfigError::Validation(format!(
            "start_page must be >= 1, got {}",
            config.start_page
        )));
    }

    if config.end_page < config.start_page {
        return Err(ConfigError::Validation(format!(
            "end_page ({}) must be >= start_page ({})",
            config.end_page, config.start_page
        )));
    }

    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use HTTP or HTTPS",
            config.base_url
        )));
    }

    Ok(())
}

/// Validates cover download settings
fn validate_cover_config(config: &CoverConfig) -> ConfigResult<()> {
    validate_delay("covers.delay", config.delay)?;

    if config.enabled && config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "covers directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates pacing and retry settings
fn validate_network_config(config: &NetworkConfig) -> ConfigResult<()> {
    validate_delay("network.delay_between_pages", config.delay_between_pages)?;
    validate_delay("network.rate_limit_wait", config.rate_limit_wait)?;

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be >= 1s, got {}s",
            config.request_timeout
        )));
    }

    if config.retry_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "retry_attempts must be >= 1, got {}",
            config.retry_attempts
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &ScraperConfig) -> ConfigResult<()> {
    if config.csv_path().as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "csv_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Delays are seconds and must be finite and non-negative
fn validate_delay(name: &str, value: f64) -> ConfigResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, value
        )));
    }
    Ok(())
}
