//! # actionkit - fluent action endpoints
//!
//! Declare an HTTP endpoint as a chain of "bindings + handler" steps and let
//! the compiler turn it into a [`DispatchUnit`] the host can discover and
//! serve, as if a hand-written handler existed.
//!
//! ```rust,ignore
//! use actionkit::{ActionBuilder, ActionCompiler, ActionHost, BindingSpec, HostConfig};
//!
//! let def = ActionBuilder::get("/users/{userId}")
//!     .title("Get user name")
//!     .using(BindingSpec::route::<i32>("userId"))
//!     .using(BindingSpec::service::<UserRepo>())
//!     .to(|id: i32, repo: Arc<UserRepo>| repo.name_of(id))
//!     .build();
//!
//! let endpoint = ActionCompiler::new().compile(def, None)?;
//! let mut host = ActionHost::new(HostConfig::default()).with_services(services);
//! host.add(endpoint)?;
//! let router = host.into_router()?;
//! ```
//!
//! Compilation runs validate → route check → plan → synthesize. Each handler
//! step's logic is stored in the [`HandlerRegistry`] and looked up by key when
//! the unit runs.

pub use inventory;

pub mod binding;
pub mod builder;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod host;
pub mod logic;
pub mod model;
pub mod plan;
pub mod registry;
pub mod route;
pub mod services;
pub mod synth;
pub mod unit;
pub mod validate;
pub mod value;

pub use binding::{
    AmbientKind, BindingKind, BindingSource, BindingSpec, IdentityKey, RequestContext,
    ResolveContext, ValueResolver,
};
pub use builder::ActionBuilder;
pub use compiler::{compile, ActionCompiler, ActionRegistrator, BatchReport, CompiledEndpoint};
pub use config::{ActionsConfig, CompilerConfig, HostConfig};
pub use diagnostics::{CollectingSink, DiagnosticRecord, DiagnosticSink};
pub use error::{
    BindingError, CompileError, DispatchError, HostError, RouteParameterMismatchError,
    SynthesisError, SynthesisFailure, ValidationError, ViewError,
};
pub use host::{ActionHost, FnViews, NoViews, OperationSpec, Problem, ViewEngine};
pub use logic::{AsyncLogic, SyncLogic, MAX_HANDLER_ARITY};
pub use model::{ActionDefinition, Annotation, HandlerStep, RenderKind, StepKind, ViewTarget};
pub use plan::{plan, ParameterPlan};
pub use registry::{HandlerKey, HandlerRegistry};
pub use services::ServiceProvider;
pub use unit::{
    ActionOutcome, Arguments, BindingMarker, DetachedHost, DispatchUnit, HostContext,
    InvocationStrategy, Rendered, ReturnShape, ACTION_METHOD_NAME,
};
pub use validate::{validate, ValidationResult};
pub use value::{TypedValue, Value, ValueType};
