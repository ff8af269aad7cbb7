//! Bulk renaming of featured images
//!
//! The server side ([`orchestrator`]) answers stateless prepare/process
//! requests; the client side ([`client`]) drives them page by page and
//! accumulates [`BatchProgress`].

pub mod client;
pub mod orchestrator;
pub mod progress;

pub use client::{BulkClient, BulkTransport, LocalTransport, RunStatus};
pub use orchestrator::{PrepareResponse, ProcessRequest, ProcessResponse, prepare, process};
pub use progress::{BatchProgress, BatchTally};
