use crate::config::types::{ConfigOverrides, ScraperConfig};
use crate::config::validation::validate;
use crate::ConfigResult;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(ScraperConfig)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use shelf_scrape::config::load_config;
///
/// let config = load_config(Path::new("scrape.toml")).unwrap();
/// println!("Pages: {}-{}", config.list.start_page, config.list.end_page);
/// ```
pub fn load_config(path: &Path) -> ConfigResult<ScraperConfig> {
    let config = read_config(path)?;
    validate(&config)?;
    Ok(config)
}

/// Reads and parses a configuration file without validating it
fn read_config(path: &Path) -> ConfigResult<ScraperConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: ScraperConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so two runs can be told apart by their settings.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Builds the effective configuration for a run
///
/// Starts from the file at `path` (or the defaults when no file is given),
/// applies the command-line overrides on top, and validates the result. The
/// returned hash is `None` when no file was used.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> ConfigResult<(ScraperConfig, Option<String>)> {
    let (mut config, hash) = match path {
        Some(path) => (read_config(path)?, Some(compute_config_hash(path)?)),
        None => (ScraperConfig::default(), None),
    };

    overrides.apply(&mut config);
    validate(&config)?;

    Ok((config, hash))
}
