//! Configuration module for Shelf-Scrape
//!
//! This module handles loading, parsing, and validating the optional TOML
//! configuration file and layering command-line overrides on top of it.
//!
//! # Example
//!
//! ```no_run
//! use shelf_scrape::config::{resolve_config, ConfigOverrides};
//! use std::path::Path;
//!
//! let overrides = ConfigOverrides { end_page: Some(3), ..Default::default() };
//! let (config, _hash) = resolve_config(Some(Path::new("scrape.toml")), &overrides).unwrap();
//! println!("Scraping list {}", config.list.id);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ConfigOverrides, CoverConfig, ListConfig, NetworkConfig, OutputConfig, ScraperConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, resolve_config};
pub use validation::validate;
