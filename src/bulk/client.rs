//! Client side of the bulk rename protocol

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use super::orchestrator::{PrepareResponse, ProcessRequest, ProcessResponse};
use super::progress::BatchProgress;
use crate::endpoints::{Caller, EndpointError, Endpoints, PREPARE_ACTION, PROCESS_ACTION, Request};

/// Carries prepare/process calls to a server
pub trait BulkTransport {
    /// # Errors
    ///
    /// Returns `EndpointError` if the request fails or is rejected.
    fn prepare(&mut self) -> Result<PrepareResponse, EndpointError>;

    /// # Errors
    ///
    /// Returns `EndpointError` if the request fails or is rejected.
    fn process(&mut self, page: u32, batch: u32) -> Result<ProcessResponse, EndpointError>;
}

/// Talks to in-process [`Endpoints`], minting a fresh token per call
pub struct LocalTransport<'e, 'a> {
    endpoints: &'e Endpoints<'a>,
    caller: Caller,
}

impl<'e, 'a> LocalTransport<'e, 'a> {
    #[must_use]
    pub const fn new(endpoints: &'e Endpoints<'a>, caller: Caller) -> Self {
        Self { endpoints, caller }
    }

    fn call<T: DeserializeOwned>(&self, action: &str, params: Value) -> Result<T, EndpointError> {
        let request = Request {
            action: action.to_string(),
            token: self.endpoints.token_for(action, &self.caller)?,
            params,
        };
        let data = self.endpoints.dispatch(&self.caller, &request).into_result()?;
        serde_json::from_value(data).map_err(|e| EndpointError::BadRequest(e.to_string()))
    }
}

impl BulkTransport for LocalTransport<'_, '_> {
    fn prepare(&mut self) -> Result<PrepareResponse, EndpointError> {
        self.call(PREPARE_ACTION, Value::Null)
    }

    fn process(&mut self, page: u32, batch: u32) -> Result<ProcessResponse, EndpointError> {
        let params = serde_json::to_value(ProcessRequest::new(page, batch))
            .map_err(|e| EndpointError::BadRequest(e.to_string()))?;
        self.call(PROCESS_ACTION, params)
    }
}

/// How a bulk run ended
#[derive(Debug)]
pub enum RunStatus {
    /// Nothing was eligible
    NothingToDo,
    Completed(BatchProgress),
    /// A request failed; the run stopped without retrying
    Failed {
        progress: BatchProgress,
        error: EndpointError,
    },
}

impl RunStatus {
    /// Final counters, if any request succeeded
    #[must_use]
    pub const fn progress(&self) -> Option<&BatchProgress> {
        match self {
            Self::NothingToDo => None,
            Self::Completed(progress) | Self::Failed { progress, .. } => Some(progress),
        }
    }
}

/// Drives a bulk run one page at a time
pub struct BulkClient<T> {
    transport: T,
}

impl<T: BulkTransport> BulkClient<T> {
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Prepare, then process pages until the server reports `done` or the
    /// prepared total is reached
    ///
    /// `on_progress` is called after every successful request.
    pub fn run(&mut self, mut on_progress: impl FnMut(&BatchProgress)) -> RunStatus {
        let prepared = match self.transport.prepare() {
            Ok(prepared) => prepared,
            Err(error) => {
                warn!("bulk prepare failed: {error}");
                return RunStatus::Failed {
                    progress: BatchProgress::default(),
                    error,
                };
            }
        };

        let mut progress = BatchProgress::new(prepared.total);
        on_progress(&progress);
        if prepared.total == 0 {
            return RunStatus::NothingToDo;
        }

        loop {
            let response = match self.transport.process(progress.page, prepared.batch) {
                Ok(response) => response,
                Err(error) => {
                    warn!(page = progress.page, "bulk page failed: {error}");
                    return RunStatus::Failed { progress, error };
                }
            };

            progress.absorb(&response);
            on_progress(&progress);

            if response.done || progress.is_complete() {
                info!(
                    processed = progress.processed,
                    renamed = progress.renamed,
                    skipped = progress.skipped,
                    errors = progress.errors,
                    "bulk run finished"
                );
                return RunStatus::Completed(progress);
            }
        }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}
