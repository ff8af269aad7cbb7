//! Counters for bulk runs

use colored::Colorize;

use super::orchestrator::ProcessResponse;
use crate::rename::RenameOutcome;

/// Outcome counts for a single page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub renamed: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl BatchTally {
    pub fn record(&mut self, outcome: &RenameOutcome) {
        match outcome {
            RenameOutcome::Renamed { .. } => self.renamed += 1,
            RenameOutcome::Skipped(_) => self.skipped += 1,
            RenameOutcome::Failed(_) => self.errors += 1,
        }
    }
}

/// Running totals on the client side of a bulk run
///
/// Never persisted; a new run starts from zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub total: u64,
    pub processed: u64,
    pub renamed: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Next page to request
    pub page: u32,
}

impl BatchProgress {
    #[must_use]
    pub const fn new(total: u64) -> Self {
        Self {
            total,
            processed: 0,
            renamed: 0,
            skipped: 0,
            errors: 0,
            page: 1,
        }
    }

    /// Add a page's counts and advance to the next page
    pub const fn absorb(&mut self, response: &ProcessResponse) {
        self.processed += response.processed;
        self.renamed += response.renamed;
        self.skipped += response.skipped;
        self.errors += response.errors;
        self.page += 1;
    }

    /// Share of the work done, in `0.0..=1.0`
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.processed as f64 / self.total as f64;
        ratio.min(1.0)
    }

    /// [`ratio`](Self::ratio) as a rounded percentage
    #[must_use]
    pub fn percent(&self) -> u8 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = (self.ratio() * 100.0).round() as u8;
        percent
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.processed >= self.total
    }

    /// One-line status, e.g. `Processed: 3 of 10 | Renamed: 2 | Skipped: 1 | Errors: 0`
    #[must_use]
    pub fn stats_line(&self) -> String {
        format!(
            "Processed: {} of {} | Renamed: {} | Skipped: {} | Errors: {}",
            self.processed, self.total, self.renamed, self.skipped, self.errors
        )
    }

    /// Progress bar of `width` cells followed by the stats line
    #[must_use]
    pub fn bar(&self, width: usize) -> String {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let filled = ((self.ratio() * width as f64).round() as usize).min(width);
        let cells = format!("{}{}", "█".repeat(filled), "░".repeat(width - filled));
        let cells = if self.percent() == 100 {
            cells.green()
        } else {
            cells.blue()
        };
        format!("{cells} {:>3}%  {}", self.percent(), self.stats_line())
    }

    pub fn print(&self, operation: &str) {
        println!("\n{}", format!("=== {operation} Summary ===").bold());
        println!("  {} {} of {}", "Processed:".bold(), self.processed, self.total);
        println!("  {} {}", "✓ Renamed:".green(), self.renamed);
        if self.skipped > 0 {
            println!("  {} {}", "⊘ Skipped:".yellow(), self.skipped);
        }
        if self.errors > 0 {
            println!("  {} {}", "✗ Errors:".red(), self.errors);
        }
        if self.is_complete() {
            println!("  {}", "✔ Completed".green().bold());
        }
    }
}
