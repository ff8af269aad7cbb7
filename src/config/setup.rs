//! Interactive setup wizard for first-time configuration
//!
//! Asks where media files live and under which URL they are served, then
//! writes the configuration with defaults for everything else.

use super::{SlugshotConfig, StorageConfig};
use config::ConfigError;
use dialoguer::{Input, theme::ColorfulTheme};
use std::path::PathBuf;

/// Interactive first-time setup - prompts for the storage root and base URL
///
/// # Errors
///
/// Returns `ConfigError` if user input cannot be read or the configuration
/// cannot be saved.
pub fn first_time_setup() -> Result<SlugshotConfig, ConfigError> {
    println!("Welcome to slugshot! Let's point it at your media.\n");

    let defaults = StorageConfig::default();

    let root: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Storage root")
        .default(defaults.root.to_string_lossy().to_string())
        .interact_text()
        .map_err(|e| ConfigError::Message(format!("Failed to read input: {e}")))?;

    let base_url: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Public URL of the storage root")
        .default(defaults.base_url)
        .interact_text()
        .map_err(|e| ConfigError::Message(format!("Failed to read input: {e}")))?;

    let config = SlugshotConfig {
        storage: StorageConfig {
            root: PathBuf::from(root),
            base_url,
        },
        ..SlugshotConfig::default()
    };

    config.save()?;

    println!("\nConfiguration saved successfully!");
    Ok(config)
}
