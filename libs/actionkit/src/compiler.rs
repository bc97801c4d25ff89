//! Compiler façade: validate, check routes, plan, synthesize.

use std::fmt;
use std::sync::Arc;

use crate::config::CompilerConfig;
use crate::diagnostics::{DiagnosticSink, Diagnostics};
use crate::error::{CompileError, DispatchError};
use crate::model::ActionDefinition;
use crate::plan::plan;
use crate::registry::HandlerRegistry;
use crate::route::check_route_parameters;
use crate::synth::synthesize;
use crate::unit::{ActionOutcome, Arguments, DispatchUnit, HostContext};
use crate::validate::validate;

/// Produces a definition for start-up discovery; submit with `inventory::submit!`.
///
/// ```ignore
/// inventory::submit! {
///     actionkit::ActionRegistrator(|| ActionBuilder::get("/ping").to(|| "pong").build())
/// }
/// ```
pub struct ActionRegistrator(pub fn() -> ActionDefinition);

inventory::collect!(ActionRegistrator);

/// A compiled endpoint, read-only once handed to the host.
#[derive(Clone)]
pub struct CompiledEndpoint {
    pub id: String,
    /// `[METHOD]/route`
    pub name: String,
    pub action_method_name: &'static str,
    pub unit: Arc<DispatchUnit>,
    pub definition: Arc<ActionDefinition>,
}

impl CompiledEndpoint {
    pub async fn invoke(
        &self,
        args: Arguments,
        host: &dyn HostContext,
    ) -> Result<ActionOutcome, DispatchError> {
        self.unit.invoke(args, host).await
    }
}

impl fmt::Debug for CompiledEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledEndpoint")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("unit", &self.unit.type_name())
            .finish()
    }
}

/// Outcome of compiling several definitions.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub compiled: Vec<CompiledEndpoint>,
    pub failures: Vec<CompileError>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ActionCompiler {
    registry: Arc<HandlerRegistry>,
    config: CompilerConfig,
}

impl Default for ActionCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionCompiler {
    /// Compiler registering logic in the process-wide registry.
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::global(),
            config: CompilerConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile(
        &self,
        def: ActionDefinition,
        sink: Option<&dyn DiagnosticSink>,
    ) -> Result<CompiledEndpoint, CompileError> {
        let endpoint = def.display();
        let diag = Diagnostics::new(sink, endpoint.clone());
        diag.debug("compiling action", &[("steps", def.steps.len().to_string())]);

        if let Err(e) = validate(&def).into_result(endpoint) {
            diag.warn("action failed validation", &[("errors", e.errors.join("; "))]);
            return Err(e.into());
        }
        if let Err(e) = check_route_parameters(&def) {
            diag.warn(
                "route parameter is not in template",
                &[("parameter", e.parameter.clone())],
            );
            return Err(e.into());
        }

        let plan = plan(&def);
        synthesize(Arc::new(def), &plan, &self.registry, &self.config, sink).map_err(|e| {
            diag.warn("synthesis failed", &[("cause", e.source.to_string())]);
            CompileError::from(e)
        })
    }

    /// Compiles each definition independently. A failure never aborts the
    /// rest of the batch unless `fail_fast` is configured.
    pub fn compile_all<I>(&self, defs: I, sink: Option<&dyn DiagnosticSink>) -> BatchReport
    where
        I: IntoIterator<Item = ActionDefinition>,
    {
        let mut report = BatchReport::default();
        for def in defs {
            match self.compile(def, sink) {
                Ok(endpoint) => report.compiled.push(endpoint),
                Err(e) => {
                    tracing::error!(endpoint = %e.endpoint(), error = %e, "failed to compile action");
                    report.failures.push(e);
                    if self.config.fail_fast {
                        break;
                    }
                }
            }
        }
        tracing::info!(
            compiled = report.compiled.len(),
            failed = report.failures.len(),
            "action batch compiled"
        );
        report
    }

    /// Compiles every definition submitted through [`ActionRegistrator`].
    pub fn discover(&self, sink: Option<&dyn DiagnosticSink>) -> BatchReport {
        let defs = inventory::iter::<ActionRegistrator>
            .into_iter()
            .map(|r| (r.0)())
            .collect::<Vec<_>>();
        tracing::debug!(count = defs.len(), "discovered action registrators");
        self.compile_all(defs, sink)
    }
}

/// Compiles `def` with the process-wide registry and default settings.
pub fn compile(
    def: ActionDefinition,
    sink: Option<&dyn DiagnosticSink>,
) -> Result<CompiledEndpoint, CompileError> {
    ActionCompiler::new().compile(def, sink)
}
