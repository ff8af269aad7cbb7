//! Library-specific error types
//!
//! This module defines all error types that can occur while reading or
//! writing the content store.
//!
//! # Error Types
//!
//! - **`SledError`**: Errors from the underlying sled embedded database
//! - **`DecodeError`**: Failures when deserializing records from the database
//! - **`EncodeError`**: Failures when serializing records to the database
//! - **`ItemNotFound`** / **`AttachmentNotFound`**: Lookups of unknown ids

use thiserror::Error;

/// Library-specific errors
#[derive(Debug, Error)]
pub enum LibraryError {
    /// Represents a sled database error
    #[error("Database error: {0}")]
    SledError(#[from] sled::Error),

    /// Represents a bincode decoding error
    #[error("Error while decoding data: {0}")]
    DecodeError(#[from] bincode::error::DecodeError),

    /// Represents a bincode encoding error
    #[error("Error while encoding data: {0}")]
    EncodeError(#[from] bincode::error::EncodeError),

    /// No content item with this id
    #[error("Content item not found: {0}")]
    ItemNotFound(u64),

    /// No attachment with this id
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(u64),

    /// Invalid input provided (e.g., an unknown status name)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
