//! Option flags
//!
//! Feature switches are persisted as string values in an [`OptionStore`]
//! and read into a [`Settings`] struct once per operation. Components take
//! a `&Settings` instead of looking options up on their own.

use std::fmt;
use std::str::FromStr;

use crate::library::LibraryError;

/// Durable key/value option storage
pub trait OptionStore {
    /// Read a raw option value
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the underlying store cannot be read.
    fn get_option(&self, key: &str) -> Result<Option<String>, LibraryError>;

    /// Write a raw option value
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the underlying store cannot be written.
    fn set_option(&self, key: &str, value: &str) -> Result<(), LibraryError>;
}

/// Boolean feature flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    RenameOnSave,
    AutoUpdate,
    CreateIntermediateThumbnails,
    EnableOptimization,
    EnableWebpGeneration,
}

impl Flag {
    pub const ALL: [Self; 5] = [
        Self::RenameOnSave,
        Self::AutoUpdate,
        Self::CreateIntermediateThumbnails,
        Self::EnableOptimization,
        Self::EnableWebpGeneration,
    ];

    /// Key under which the flag is stored
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::RenameOnSave => "rename_on_save",
            Self::AutoUpdate => "auto_update",
            Self::CreateIntermediateThumbnails => "create_intermediate_thumbnails",
            Self::EnableOptimization => "enable_optimization",
            Self::EnableWebpGeneration => "enable_webp_generation",
        }
    }

    #[must_use]
    pub const fn default_value(self) -> bool {
        match self {
            Self::RenameOnSave | Self::AutoUpdate | Self::CreateIntermediateThumbnails => true,
            Self::EnableOptimization | Self::EnableWebpGeneration => false,
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::RenameOnSave => "Rename the featured image when content is saved",
            Self::AutoUpdate => "Allow the host to auto-install new releases",
            Self::CreateIntermediateThumbnails => "Create size variants when metadata is generated",
            Self::EnableOptimization => "Enable image optimization",
            Self::EnableWebpGeneration => "Generate WebP siblings for JPEG and PNG images",
        }
    }

    /// Read this flag from a store, falling back to its default
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the store cannot be read.
    pub fn read(self, store: &impl OptionStore) -> Result<bool, LibraryError> {
        Ok(store
            .get_option(self.key())?
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(self.default_value()))
    }

    /// Persist this flag as `1` or `0`
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the store cannot be written.
    pub fn write(self, store: &impl OptionStore, value: bool) -> Result<(), LibraryError> {
        store.set_option(self.key(), if value { "1" } else { "0" })
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Flag {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|flag| flag.key() == normalized)
            .ok_or_else(|| {
                let keys: Vec<&str> = Self::ALL.iter().map(|f| f.key()).collect();
                LibraryError::InvalidInput(format!(
                    "Unknown setting '{s}'. Available settings: {}",
                    keys.join(", ")
                ))
            })
    }
}

/// Parse a stored flag value
///
/// Accepts the spellings a settings form or a hand-edited store may produce.
#[must_use]
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Snapshot of every feature flag, built once per operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub rename_on_save: bool,
    pub auto_update: bool,
    pub create_intermediate_thumbnails: bool,
    pub enable_optimization: bool,
    pub enable_webp_generation: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rename_on_save: Flag::RenameOnSave.default_value(),
            auto_update: Flag::AutoUpdate.default_value(),
            create_intermediate_thumbnails: Flag::CreateIntermediateThumbnails.default_value(),
            enable_optimization: Flag::EnableOptimization.default_value(),
            enable_webp_generation: Flag::EnableWebpGeneration.default_value(),
        }
    }
}

impl Settings {
    /// Read all flags from a store
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the store cannot be read.
    pub fn load(store: &impl OptionStore) -> Result<Self, LibraryError> {
        Ok(Self {
            rename_on_save: Flag::RenameOnSave.read(store)?,
            auto_update: Flag::AutoUpdate.read(store)?,
            create_intermediate_thumbnails: Flag::CreateIntermediateThumbnails.read(store)?,
            enable_optimization: Flag::EnableOptimization.read(store)?,
            enable_webp_generation: Flag::EnableWebpGeneration.read(store)?,
        })
    }

    #[must_use]
    pub const fn get(&self, flag: Flag) -> bool {
        match flag {
            Flag::RenameOnSave => self.rename_on_save,
            Flag::AutoUpdate => self.auto_update,
            Flag::CreateIntermediateThumbnails => self.create_intermediate_thumbnails,
            Flag::EnableOptimization => self.enable_optimization,
            Flag::EnableWebpGeneration => self.enable_webp_generation,
        }
    }

    /// WebP siblings are generated only when both optimization switches are on
    #[must_use]
    pub const fn webp_enabled(&self) -> bool {
        self.enable_optimization && self.enable_webp_generation
    }
}
