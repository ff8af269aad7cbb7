//! Server side of the bulk rename protocol
//!
//! Each request is stateless: `prepare` counts the work, `process` handles
//! one page of it. Items are paged in ascending id order, so a client that
//! walks pages 1, 2, ... sees every eligible item exactly once as long as
//! the set does not change underneath it.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::progress::BatchTally;
use crate::config::{BulkConfig, DEFAULT_BATCH_SIZE};
use crate::library::{Library, LibraryError};
use crate::rename::{RenameEngine, RenameOutcome, SkipReason};

/// Smallest batch size suggested to clients
pub const MIN_SUGGESTED_BATCH: u32 = 5;

/// Largest batch size suggested to clients
pub const MAX_SUGGESTED_BATCH: u32 = 50;

/// Largest batch a single process request may ask for
pub const MAX_PROCESS_BATCH: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareResponse {
    /// Eligible items at the time of the request
    pub total: u64,
    /// Suggested page size
    pub batch: u32,
}

const fn default_page() -> i64 {
    1
}

const fn default_batch() -> i64 {
    DEFAULT_BATCH_SIZE as i64
}

/// One page of work, as sent by a client
///
/// Values are taken by magnitude and clamped, so a malformed request still
/// addresses a valid page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRequest {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_batch")]
    pub batch: i64,
}

impl Default for ProcessRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            batch: default_batch(),
        }
    }
}

impl ProcessRequest {
    #[must_use]
    pub const fn new(page: u32, batch: u32) -> Self {
        Self {
            page: page as i64,
            batch: batch as i64,
        }
    }

    /// Page number, at least 1
    #[must_use]
    pub fn page(&self) -> usize {
        usize::try_from(self.page.unsigned_abs()).unwrap_or(usize::MAX).max(1)
    }

    /// Batch size in `1..=MAX_PROCESS_BATCH`
    #[must_use]
    pub fn batch(&self) -> usize {
        let clamped = self.batch.unsigned_abs().clamp(1, u64::from(MAX_PROCESS_BATCH));
        usize::try_from(clamped).unwrap_or(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub processed: u64,
    pub renamed: u64,
    pub skipped: u64,
    pub errors: u64,
    /// No further pages hold items
    pub done: bool,
}

/// Count the work and suggest a batch size
///
/// # Errors
///
/// Returns `LibraryError` if the library cannot be read.
pub fn prepare(library: &Library, config: &BulkConfig) -> Result<PrepareResponse, LibraryError> {
    let total = library.count_bulk_eligible()? as u64;
    let batch = config
        .batch_size
        .clamp(MIN_SUGGESTED_BATCH, MAX_SUGGESTED_BATCH);
    info!(total, batch, "prepared bulk rename");
    Ok(PrepareResponse { total, batch })
}

/// Rename the featured images of one page of eligible items
///
/// Per-item failures are counted, never propagated.
///
/// # Errors
///
/// Returns `LibraryError` only if the page itself cannot be loaded, in which
/// case no item has been touched.
pub fn process(
    library: &Library,
    engine: &RenameEngine<'_>,
    request: ProcessRequest,
) -> Result<ProcessResponse, LibraryError> {
    let (page, batch) = (request.page(), request.batch());
    let items = library.bulk_page(page, batch)?;

    let mut tally = BatchTally::default();
    for item in &items {
        let outcome = match item.featured_image {
            Some(attachment) => engine.rename(attachment, item.id),
            None => RenameOutcome::Skipped(SkipReason::MissingFile),
        };
        tally.record(&outcome);
    }

    let processed = items.len() as u64;
    let done = items.len() < batch || items.is_empty();
    debug!(page, batch, processed, done, "processed bulk page");

    Ok(ProcessResponse {
        processed,
        renamed: tally.renamed,
        skipped: tally.skipped,
        errors: tally.errors,
        done,
    })
}
