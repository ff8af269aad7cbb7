//! Slugshot - featured image renaming, WebP variants and self-hosted updates
//!
//! This library keeps a media library's featured-image files named after the
//! titles of the content that uses them. Renames happen when content is saved
//! or in bulk through a paginated, resumable batch protocol. It also derives
//! WebP siblings for uploaded images and discovers new releases of itself from
//! a GitHub-style release registry.

use thiserror::Error;

pub mod bulk;
pub mod cli;
pub mod config;
pub mod endpoints;
pub mod library;
pub mod logging;
pub mod metadata;
pub mod options;
pub mod pipeline;
pub mod release;
pub mod rename;
pub mod slug;
pub mod variants;

#[cfg(test)]
pub mod testing;

/// Slug under which this tool advertises itself to the host's updater
pub const PLUGIN_SLUG: &str = "slugshot";

/// Identifier of the installed package (`<dir>/<entry>`)
pub const PLUGIN_FILE: &str = "slugshot/slugshot";

/// Human readable product name
pub const PLUGIN_NAME: &str = "Slugshot";

/// Installed version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Oldest host version this release supports
pub const MIN_HOST_VERSION: &str = "6.8.2";

/// Oldest runtime version this release supports
pub const MIN_RUNTIME_VERSION: &str = "8.0";

/// Error enum, contains all failure states of the program
#[derive(Debug, Error)]
pub enum SlugshotError {
    /// Library (content store) error
    #[error("Library error: {0}")]
    LibraryError(#[from] library::LibraryError),
    /// Endpoint dispatch error
    #[error("Endpoint error: {0}")]
    EndpointError(#[from] endpoints::EndpointError),
    /// Image metadata error
    #[error("Metadata error: {0}")]
    MetadataError(#[from] metadata::MetadataError),
    /// WebP variant error
    #[error("Variant error: {0}")]
    VariantError(#[from] variants::VariantError),
    /// Release registry error
    #[error("Release error: {0}")]
    ReleaseError(#[from] release::ReleaseError),
    /// Represents a configuration error
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ::config::ConfigError),
    /// Represents an I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
