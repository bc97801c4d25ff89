use http::Method;
use thiserror::Error;

use crate::binding::AmbientKind;
use crate::logic::InvokeError;
use crate::value::EncodeError;

/// The definition is structurally invalid; nothing was synthesized.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("action {endpoint} is invalid: {}", errors.join("; "))]
pub struct ValidationError {
    pub endpoint: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("action {endpoint} binds route parameter '{parameter}' which is not present in '{template}'")]
pub struct RouteParameterMismatchError {
    pub endpoint: String,
    pub parameter: String,
    pub template: String,
}

/// Underlying cause of a [`SynthesisError`]. Steps are 0-based, positions 1-based.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SynthesisFailure {
    #[error("step {step} declares {declared} bindings but its logic takes {accepted} arguments")]
    Arity {
        step: usize,
        declared: usize,
        accepted: usize,
    },
    #[error("step {step} takes {arity} arguments, more than the supported {max}")]
    UnsupportedArity { step: usize, arity: usize, max: usize },
    #[error("step {step} argument {position} is bound as {bound} but the logic expects {expected}")]
    ArgumentType {
        step: usize,
        position: usize,
        bound: &'static str,
        expected: &'static str,
    },
    #[error("step {step} declares return type {declared} but its logic returns {actual}")]
    ReturnType {
        step: usize,
        declared: &'static str,
        actual: &'static str,
    },
    #[error("step {step} declares suspends = {declared}, which disagrees with its logic")]
    Suspension { step: usize, declared: bool },
    #[error("step {step} binds ambient {kind:?} as {bound}, expected {expected}")]
    AmbientType {
        step: usize,
        kind: AmbientKind,
        bound: &'static str,
        expected: &'static str,
    },
    #[error("step {step} binding {binding} has no parameter slot")]
    MissingSlot { step: usize, binding: String },
    #[error("step {step} has no logic to register")]
    MissingLogic { step: usize },
    #[error("render step {step} has no target")]
    MissingRenderTarget { step: usize },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to synthesize action {endpoint}")]
pub struct SynthesisError {
    pub endpoint: String,
    #[source]
    pub source: SynthesisFailure,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    RouteParameterMismatch(#[from] RouteParameterMismatchError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

impl CompileError {
    /// `[METHOD]/route` of the failing endpoint.
    pub fn endpoint(&self) -> &str {
        match self {
            CompileError::Validation(e) => &e.endpoint,
            CompileError::RouteParameterMismatch(e) => &e.endpoint,
            CompileError::Synthesis(e) => &e.endpoint,
        }
    }
}

/// Request input could not be turned into a synthesized parameter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("missing required {source_kind} '{name}'")]
    Missing {
        source_kind: &'static str,
        name: String,
    },
    #[error("invalid value for {source_kind} '{name}': {reason}")]
    Invalid {
        source_kind: &'static str,
        name: String,
        reason: String,
    },
    #[error("request body could not be decoded: {reason}")]
    Body { reason: String },
    #[error("request body could not be read: {reason}")]
    BodyRead { reason: String },
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("service '{service}' is not registered")]
    ServiceUnavailable { service: &'static str },
    #[error("resolver '{resolver}' failed: {reason}")]
    Resolver {
        resolver: &'static str,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("view '{target}' is not registered")]
    NotFound { target: String },
    #[error("rendering '{target}' failed: {reason}")]
    Render { target: String, reason: String },
    #[error("view model could not be encoded")]
    Model(#[from] EncodeError),
}

/// Serve-time failure of a compiled unit.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unit suspends and cannot be invoked immediately")]
    WouldSuspend,
    #[error("handler '{key}' is not registered")]
    UnknownHandler { key: String },
    #[error("argument slot {position} was not supplied")]
    MissingArgument { position: usize },
    #[error("ambient {kind:?} is not available from the host")]
    MissingAmbient { kind: AmbientKind },
    #[error("step {step} reads a previous result that does not exist")]
    NoPreviousResult { step: usize },
    #[error("step {step} invocation failed")]
    Invoke {
        step: usize,
        #[source]
        source: InvokeError,
    },
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("route [{method}]{path} is already served by '{existing}'")]
    DuplicateRoute {
        method: Method,
        path: String,
        existing: String,
    },
    #[error("route {path} conflicts with '{existing}' which names its parameters differently")]
    ConflictingRoute { path: String, existing: String },
    #[error("method '{method}' cannot be routed")]
    UnsupportedMethod { method: Method },
}
