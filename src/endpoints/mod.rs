//! Request endpoints for bulk clients
//!
//! A small dispatch table maps action names to handlers. Every request must
//! come from a caller holding [`Capability::ManageLibrary`] and carry a token
//! minted for the action's scope. Responses use a `{ "success", "data" }`
//! envelope; failures carry `{ "code", "message" }` as data.

pub mod token;

pub use token::{TOKEN_LIFETIME, TokenIssuer};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::bulk::orchestrator::{self, ProcessRequest};
use crate::library::LibraryError;
use crate::pipeline::Pipeline;

/// Token scope of `prepare_bulk`
pub const PREPARE_SCOPE: &str = "slugshot_prepare";

/// Token scope of `process_bulk`
pub const PROCESS_SCOPE: &str = "slugshot_process";

pub const PREPARE_ACTION: &str = "prepare_bulk";
pub const PROCESS_ACTION: &str = "process_bulk";

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Caller lacks the required capability")]
    Forbidden,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Library error: {0}")]
    LibraryError(#[from] LibraryError),

    /// A failure reported by a remote endpoint
    #[error("{code}: {message}")]
    Rejected { code: String, message: String },
}

impl EndpointError {
    /// Machine-readable error code
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::UnknownAction(_) => "unknown_action",
            Self::Forbidden => "forbidden",
            Self::InvalidToken => "invalid_token",
            Self::BadRequest(_) => "bad_request",
            Self::LibraryError(_) => "library_error",
            Self::Rejected { code, .. } => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManageLibrary,
}

/// Who is making a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl Caller {
    /// A caller allowed to manage the library
    #[must_use]
    pub fn manager(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            capabilities: vec![Capability::ManageLibrary],
        }
    }

    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// An incoming request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub action: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub params: Value,
}

/// The response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
}

impl Response {
    #[must_use]
    pub const fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
        }
    }

    #[must_use]
    pub fn error(error: &EndpointError) -> Self {
        Self {
            success: false,
            data: json!({ "code": error.code(), "message": error.to_string() }),
        }
    }

    /// The data of a successful response, or the error it describes
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::Rejected` for an unsuccessful response.
    pub fn into_result(self) -> Result<Value, EndpointError> {
        if self.success {
            return Ok(self.data);
        }
        let field = |name: &str| {
            self.data
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string()
        };
        Err(EndpointError::Rejected {
            code: field("code"),
            message: field("message"),
        })
    }
}

type Handler = fn(&Endpoints<'_>, &Value) -> Result<Value, EndpointError>;

struct Route {
    action: &'static str,
    scope: &'static str,
    capability: Capability,
    handler: Handler,
}

const ROUTES: &[Route] = &[
    Route {
        action: PREPARE_ACTION,
        scope: PREPARE_SCOPE,
        capability: Capability::ManageLibrary,
        handler: prepare_bulk,
    },
    Route {
        action: PROCESS_ACTION,
        scope: PROCESS_SCOPE,
        capability: Capability::ManageLibrary,
        handler: process_bulk,
    },
];

/// Token scope required by `action`
#[must_use]
pub fn scope_for(action: &str) -> Option<&'static str> {
    ROUTES.iter().find(|r| r.action == action).map(|r| r.scope)
}

fn prepare_bulk(endpoints: &Endpoints<'_>, _params: &Value) -> Result<Value, EndpointError> {
    let pipeline = endpoints.pipeline;
    let response = orchestrator::prepare(pipeline.library(), &pipeline.config().bulk)?;
    serde_json::to_value(response).map_err(|e| EndpointError::BadRequest(e.to_string()))
}

fn process_bulk(endpoints: &Endpoints<'_>, params: &Value) -> Result<Value, EndpointError> {
    let request = if params.is_null() {
        ProcessRequest::default()
    } else {
        serde_json::from_value(params.clone()).map_err(|e| EndpointError::BadRequest(e.to_string()))?
    };
    let pipeline = endpoints.pipeline;
    let engine = pipeline.rename_engine();
    let response = orchestrator::process(pipeline.library(), &engine, request)?;
    serde_json::to_value(response).map_err(|e| EndpointError::BadRequest(e.to_string()))
}

/// The endpoint dispatch table
pub struct Endpoints<'a> {
    pipeline: &'a Pipeline<'a>,
    tokens: TokenIssuer,
}

impl<'a> Endpoints<'a> {
    #[must_use]
    pub const fn new(pipeline: &'a Pipeline<'a>, tokens: TokenIssuer) -> Self {
        Self { pipeline, tokens }
    }

    #[must_use]
    pub const fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Mint a token for `action` on behalf of `caller`
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::UnknownAction` if no such action exists.
    pub fn token_for(&self, action: &str, caller: &Caller) -> Result<String, EndpointError> {
        let scope = scope_for(action).ok_or_else(|| EndpointError::UnknownAction(action.into()))?;
        Ok(self.tokens.issue(scope, &caller.user))
    }

    /// Authorize and run a request
    ///
    /// # Errors
    ///
    /// Returns `EndpointError` if the action is unknown, the caller is not
    /// authorized, the token does not match, or the handler fails.
    pub fn handle(&self, caller: &Caller, request: &Request) -> Result<Value, EndpointError> {
        let route = ROUTES
            .iter()
            .find(|r| r.action == request.action)
            .ok_or_else(|| EndpointError::UnknownAction(request.action.clone()))?;

        if !caller.can(route.capability) {
            return Err(EndpointError::Forbidden);
        }
        if !self.tokens.verify(&request.token, route.scope, &caller.user) {
            return Err(EndpointError::InvalidToken);
        }

        debug!(action = route.action, user = %caller.user, "dispatching request");
        (route.handler)(self, &request.params)
    }

    /// [`handle`](Self::handle) wrapped in the response envelope
    #[must_use]
    pub fn dispatch(&self, caller: &Caller, request: &Request) -> Response {
        match self.handle(caller, request) {
            Ok(data) => Response::ok(data),
            Err(e) => {
                warn!(action = %request.action, user = %caller.user, "request rejected: {e}");
                Response::error(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlugshotConfig;
    use crate::library::ContentStatus;
    use crate::options::Settings;
    use crate::testing::TestLibrary;

    fn config(t: &TestLibrary) -> SlugshotConfig {
        let mut config = SlugshotConfig::default();
        config.storage.root = t.storage_root().to_path_buf();
        config
    }

    fn request(action: &str, token: String, params: Value) -> Request {
        Request {
            action: action.into(),
            token,
            params,
        }
    }

    #[test]
    fn test_prepare_with_valid_token() {
        let t = TestLibrary::new();
        let a = t.add_image("a.png", 2, 2);
        t.add_item("Title", ContentStatus::Publish, Some(a.id));
        let config = config(&t);
        let settings = Settings::default();
        let pipeline = Pipeline::new(t.library(), &config, &settings);
        let endpoints = Endpoints::new(&pipeline, TokenIssuer::load_or_create(t.library()).unwrap());
        let admin = Caller::manager("admin");

        let token = endpoints.token_for(PREPARE_ACTION, &admin).unwrap();
        let response = endpoints.dispatch(&admin, &request(PREPARE_ACTION, token, Value::Null));
        assert!(response.success);
        assert_eq!(response.data, json!({ "total": 1, "batch": 25 }));
    }

    #[test]
    fn test_process_defaults_and_envelope() {
        let t = TestLibrary::new();
        let a = t.add_image("a.png", 2, 2);
        t.add_item("New Name", ContentStatus::Publish, Some(a.id));
        let config = config(&t);
        let settings = Settings::default();
        let pipeline = Pipeline::new(t.library(), &config, &settings);
        let endpoints = Endpoints::new(&pipeline, TokenIssuer::load_or_create(t.library()).unwrap());
        let admin = Caller::manager("admin");

        let token = endpoints.token_for(PROCESS_ACTION, &admin).unwrap();
        let response = endpoints.dispatch(&admin, &request(PROCESS_ACTION, token, json!({ "page": 1 })));
        assert!(response.success);
        assert_eq!(response.data["renamed"], 1);
        assert_eq!(response.data["done"], true);
        assert!(t.storage_root().join("new-name.png").exists());
    }

    #[test]
    fn test_token_scope_is_enforced() {
        let t = TestLibrary::new();
        let config = config(&t);
        let settings = Settings::default();
        let pipeline = Pipeline::new(t.library(), &config, &settings);
        let endpoints = Endpoints::new(&pipeline, TokenIssuer::load_or_create(t.library()).unwrap());
        let admin = Caller::manager("admin");

        let prepare_token = endpoints.token_for(PREPARE_ACTION, &admin).unwrap();
        let err = endpoints
            .handle(&admin, &request(PROCESS_ACTION, prepare_token, Value::Null))
            .unwrap_err();
        assert!(matches!(err, EndpointError::InvalidToken));

        let response = endpoints.dispatch(&admin, &request(PROCESS_ACTION, "00".into(), Value::Null));
        assert!(!response.success);
        assert_eq!(response.data["code"], "invalid_token");
    }

    #[test]
    fn test_other_users_token_and_missing_capability() {
        let t = TestLibrary::new();
        let config = config(&t);
        let settings = Settings::default();
        let pipeline = Pipeline::new(t.library(), &config, &settings);
        let endpoints = Endpoints::new(&pipeline, TokenIssuer::load_or_create(t.library()).unwrap());
        let admin = Caller::manager("admin");
        let editor = Caller::manager("editor");

        let token = endpoints.token_for(PREPARE_ACTION, &admin).unwrap();
        assert!(matches!(
            endpoints.handle(&editor, &request(PREPARE_ACTION, token.clone(), Value::Null)),
            Err(EndpointError::InvalidToken)
        ));

        let guest = Caller {
            user: "admin".into(),
            capabilities: vec![],
        };
        assert!(matches!(
            endpoints.handle(&guest, &request(PREPARE_ACTION, token, Value::Null)),
            Err(EndpointError::Forbidden)
        ));
    }

    #[test]
    fn test_unknown_action_and_bad_params() {
        let t = TestLibrary::new();
        let config = config(&t);
        let settings = Settings::default();
        let pipeline = Pipeline::new(t.library(), &config, &settings);
        let endpoints = Endpoints::new(&pipeline, TokenIssuer::load_or_create(t.library()).unwrap());
        let admin = Caller::manager("admin");

        assert!(matches!(
            endpoints.handle(&admin, &request("delete_everything", String::new(), Value::Null)),
            Err(EndpointError::UnknownAction(_))
        ));

        let token = endpoints.token_for(PROCESS_ACTION, &admin).unwrap();
        assert!(matches!(
            endpoints.handle(&admin, &request(PROCESS_ACTION, token, json!({ "page": "two" }))),
            Err(EndpointError::BadRequest(_))
        ));
    }

    #[test]
    fn test_into_result() {
        let ok = Response::ok(json!({ "total": 0 }));
        assert_eq!(ok.into_result().unwrap(), json!({ "total": 0 }));

        let err = Response::error(&EndpointError::Forbidden).into_result().unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }
}
