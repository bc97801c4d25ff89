//! The synthesized dispatch unit and its serve-time interpreter.
//!
//! A [`DispatchUnit`] is what the host discovers: a named shape with an
//! annotated action method whose formal parameters carry binding markers.
//! Instead of emitted code the method body is a list of [`StepCall`]s that
//! [`DispatchUnit::invoke`] walks strictly in order, awaiting every
//! suspending step before the next one starts.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use http::Method;

use crate::binding::{AmbientKind, BindingSource, BindingSpec, ResolverRef};
use crate::error::{DispatchError, ViewError};
use crate::logic::{LogicOutput, LogicRef};
use crate::model::{Annotation, RenderKind, StepKind, ViewTarget};
use crate::registry::{HandlerKey, HandlerRegistry};
use crate::services::ServiceProvider;
use crate::value::{TypedValue, Value, ValueType};

/// Name of the single action method of every synthesized unit.
pub const ACTION_METHOD_NAME: &str = "HandlerAction";

/// Base a unit derives from when the definition does not name one.
pub const DEFAULT_BASE: &str = "ActionController";

#[derive(Debug, Clone)]
pub struct UnitShape {
    pub type_name: String,
    pub base: String,
    pub annotations: Vec<Annotation>,
}

/// Binding-source marker read by the host's model binder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingMarker {
    FromServices,
    FromRoute { name: String },
    FromQuery { name: String },
    FromHeader { name: String },
    FromBody,
    FromForm,
    FromFormKey { key: String },
    ModelBinder { resolver: ResolverRef },
}

impl BindingMarker {
    /// Marker for a method-level binding source; `None` for ambient and previous-result.
    pub fn for_source(source: &BindingSource) -> Option<Self> {
        Some(match source {
            BindingSource::Service => BindingMarker::FromServices,
            BindingSource::RouteParameter { name } => BindingMarker::FromRoute { name: name.clone() },
            BindingSource::QueryParameter { name } => BindingMarker::FromQuery { name: name.clone() },
            BindingSource::Header { name } => BindingMarker::FromHeader { name: name.clone() },
            BindingSource::Body => BindingMarker::FromBody,
            BindingSource::Form => BindingMarker::FromForm,
            BindingSource::FormValue { key } => BindingMarker::FromFormKey { key: key.clone() },
            BindingSource::CustomResolver { resolver } => BindingMarker::ModelBinder {
                resolver: resolver.clone(),
            },
            BindingSource::PreviousHandlerResult | BindingSource::AmbientContext { .. } => {
                return None
            }
        })
    }

    /// Name or key as supplied in the originating binding.
    pub fn name(&self) -> Option<&str> {
        match self {
            BindingMarker::FromRoute { name }
            | BindingMarker::FromQuery { name }
            | BindingMarker::FromHeader { name } => Some(name),
            BindingMarker::FromFormKey { key } => Some(key),
            _ => None,
        }
    }
}

/// One formal parameter of the action method.
#[derive(Clone)]
pub struct ParameterInfo {
    /// 1-based slot.
    pub position: usize,
    pub name: String,
    pub marker: BindingMarker,
    pub value_type: ValueType,
    pub optional: bool,
    pub default: Option<Value>,
    pub binding: BindingSpec,
}

impl fmt::Debug for ParameterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterInfo")
            .field("position", &self.position)
            .field("name", &self.name)
            .field("marker", &self.marker)
            .field("value_type", &self.value_type)
            .field("optional", &self.optional)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    Immediate,
    Suspending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStrategy {
    /// A single suspending step whose pending result is returned as is.
    Direct,
    /// Steps run in order, threading each result into the next.
    Sequenced,
}

/// Where a step argument is read from at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentSource {
    Slot(usize),
    Ambient(AmbientKind),
    Previous,
}

/// Compiled form of one handler step.
#[derive(Debug, Clone)]
pub struct StepCall {
    pub kind: StepKind,
    /// Registry key of the step's logic; `None` for render steps.
    pub key: Option<HandlerKey>,
    pub args: Vec<ArgumentSource>,
    pub suspends: bool,
    pub returns: Option<ValueType>,
    pub render: Option<ViewTarget>,
}

#[derive(Debug, Clone)]
pub struct ActionMethod {
    pub name: &'static str,
    pub http_method: Method,
    pub annotations: Vec<Annotation>,
    pub parameters: Vec<ParameterInfo>,
    pub returns: ReturnShape,
    pub strategy: InvocationStrategy,
    pub body: Vec<StepCall>,
    /// Definition-level view target applied after the last step.
    pub final_render: Option<ViewTarget>,
}

/// Values for the action method's parameters, addressed by 1-based slot.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    slots: Vec<Option<Value>>,
}

impl Arguments {
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            slots: values.into_iter().map(Some).collect(),
        }
    }

    /// Stores `value` in slot `position`, growing as needed.
    pub fn set(&mut self, position: usize, value: Value) {
        if position == 0 {
            return;
        }
        if self.slots.len() < position {
            self.slots.resize(position, None);
        }
        self.slots[position - 1] = Some(value);
    }

    pub fn get(&self, position: usize) -> Option<&Value> {
        position
            .checked_sub(1)
            .and_then(|i| self.slots.get(i))
            .and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Input to the host's render operation.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub kind: RenderKind,
    pub target: String,
    pub model: TypedValue,
}

/// A rendered response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub content_type: String,
    pub body: String,
}

impl Rendered {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            content_type: "text/html; charset=utf-8".to_string(),
            body: body.into(),
        }
    }
}

/// What a unit needs from its host while running.
pub trait HostContext: Send + Sync {
    fn ambient(&self, kind: AmbientKind) -> Option<Value>;

    fn render(&self, request: RenderRequest) -> Result<Rendered, DispatchError>;
}

/// Host for invoking a unit outside of any server.
///
/// Only [`AmbientKind::Services`] is available; rendering always fails.
#[derive(Debug, Clone, Default)]
pub struct DetachedHost {
    services: ServiceProvider,
}

impl DetachedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_services(services: ServiceProvider) -> Self {
        Self { services }
    }
}

impl HostContext for DetachedHost {
    fn ambient(&self, kind: AmbientKind) -> Option<Value> {
        match kind {
            AmbientKind::Services => Some(Arc::new(self.services.clone())),
            _ => None,
        }
    }

    fn render(&self, request: RenderRequest) -> Result<Rendered, DispatchError> {
        Err(ViewError::NotFound {
            target: request.target,
        }
        .into())
    }
}

#[derive(Debug, Clone)]
pub enum ActionOutcome {
    Value(TypedValue),
    Rendered(Rendered),
}

impl ActionOutcome {
    pub fn value(&self) -> Option<&TypedValue> {
        match self {
            ActionOutcome::Value(v) => Some(v),
            ActionOutcome::Rendered(_) => None,
        }
    }

    pub fn downcast_ref<T: std::any::Any>(&self) -> Option<&T> {
        self.value().and_then(TypedValue::downcast_ref::<T>)
    }
}

/// Runtime-built artifact handed to the host.
pub struct DispatchUnit {
    pub shape: UnitShape,
    pub method: ActionMethod,
    registry: Arc<HandlerRegistry>,
}

impl DispatchUnit {
    pub(crate) fn new(shape: UnitShape, method: ActionMethod, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            shape,
            method,
            registry,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.shape.type_name
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.method.parameters
    }

    pub fn suspends(&self) -> bool {
        self.method.returns == ReturnShape::Suspending
    }

    /// Registry keys of every logic-bearing step, in step order.
    pub fn handler_keys(&self) -> Vec<&HandlerKey> {
        self.method.body.iter().filter_map(|c| c.key.as_ref()).collect()
    }

    /// Runs the action method.
    pub async fn invoke(
        &self,
        args: Arguments,
        host: &dyn HostContext,
    ) -> Result<ActionOutcome, DispatchError> {
        match self.method.strategy {
            InvocationStrategy::Direct => self.invoke_direct(&args, host).await,
            InvocationStrategy::Sequenced => self.invoke_sequenced(&args, host).await,
        }
    }

    /// Runs a unit whose return shape is immediate without an executor.
    pub fn invoke_immediate(
        &self,
        args: Arguments,
        host: &dyn HostContext,
    ) -> Result<ActionOutcome, DispatchError> {
        if self.suspends() {
            return Err(DispatchError::WouldSuspend);
        }
        self.invoke(args, host)
            .now_or_never()
            .unwrap_or(Err(DispatchError::WouldSuspend))
    }

    async fn invoke_direct(
        &self,
        args: &Arguments,
        host: &dyn HostContext,
    ) -> Result<ActionOutcome, DispatchError> {
        let Some(call) = self.method.body.first() else {
            return Err(DispatchError::NoPreviousResult { step: 0 });
        };
        let value = self.run_step(0, call, args, host, None).await?;
        let ty = call.returns.unwrap_or_else(ValueType::of::<()>);
        Ok(ActionOutcome::Value(TypedValue::new(value, ty)))
    }

    async fn invoke_sequenced(
        &self,
        args: &Arguments,
        host: &dyn HostContext,
    ) -> Result<ActionOutcome, DispatchError> {
        let mut previous: Option<TypedValue> = None;

        for (i, call) in self.method.body.iter().enumerate() {
            if let Some(target) = &call.render {
                let model = previous.take().ok_or(DispatchError::NoPreviousResult { step: i })?;
                return self.render(target, model, host);
            }

            let value = self.run_step(i, call, args, host, previous.as_ref()).await?;
            // the scratch slot always holds the most recent step's result
            previous = call.returns.map(|ty| TypedValue::new(value, ty));
        }

        let result = previous.ok_or(DispatchError::NoPreviousResult {
            step: self.method.body.len(),
        })?;
        match &self.method.final_render {
            Some(target) => self.render(target, result, host),
            None => Ok(ActionOutcome::Value(result)),
        }
    }

    async fn run_step(
        &self,
        index: usize,
        call: &StepCall,
        args: &Arguments,
        host: &dyn HostContext,
        previous: Option<&TypedValue>,
    ) -> Result<Value, DispatchError> {
        let logic = self.logic(call)?;
        let values = self.resolve_args(index, call, args, host, previous)?;
        let output = logic
            .call(values)
            .map_err(|source| DispatchError::Invoke {
                step: index,
                source,
            })?;
        Ok(match output {
            LogicOutput::Ready(value) => value,
            LogicOutput::Pending(fut) => fut.await,
        })
    }

    fn logic(&self, call: &StepCall) -> Result<LogicRef, DispatchError> {
        let key = call.key.as_ref().ok_or_else(|| DispatchError::UnknownHandler {
            key: String::new(),
        })?;
        self.registry
            .get(key)
            .ok_or_else(|| DispatchError::UnknownHandler {
                key: key.to_string(),
            })
    }

    fn resolve_args(
        &self,
        index: usize,
        call: &StepCall,
        args: &Arguments,
        host: &dyn HostContext,
        previous: Option<&TypedValue>,
    ) -> Result<Vec<Value>, DispatchError> {
        call.args
            .iter()
            .map(|source| match *source {
                ArgumentSource::Slot(position) => args
                    .get(position)
                    .cloned()
                    .or_else(|| self.default_for(position))
                    .ok_or(DispatchError::MissingArgument { position }),
                ArgumentSource::Ambient(kind) => host
                    .ambient(kind)
                    .ok_or(DispatchError::MissingAmbient { kind }),
                ArgumentSource::Previous => previous
                    .map(|p| p.value().clone())
                    .ok_or(DispatchError::NoPreviousResult { step: index }),
            })
            .collect()
    }

    fn default_for(&self, position: usize) -> Option<Value> {
        self.method
            .parameters
            .get(position.checked_sub(1)?)
            .and_then(|p| p.default.clone())
    }

    fn render(
        &self,
        target: &ViewTarget,
        model: TypedValue,
        host: &dyn HostContext,
    ) -> Result<ActionOutcome, DispatchError> {
        let rendered = host.render(RenderRequest {
            kind: target.kind,
            target: target.target.clone(),
            model,
        })?;
        Ok(ActionOutcome::Rendered(rendered))
    }
}

impl fmt::Debug for DispatchUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchUnit")
            .field("shape", &self.shape)
            .field("method", &self.method)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_are_one_based() {
        let mut args = Arguments::with_len(2);
        assert!(args.get(0).is_none());
        assert!(args.get(1).is_none());
        args.set(2, Arc::new(5u8));
        assert_eq!(args.get(2).and_then(|v| v.downcast_ref::<u8>()), Some(&5));
        args.set(4, Arc::new(1u8));
        assert_eq!(args.len(), 4);
        assert!(args.get(3).is_none());
    }

    #[test]
    fn markers_follow_sources() {
        let marker = BindingMarker::for_source(BindingSpec::route::<i32>("userId").source());
        assert_eq!(
            marker,
            Some(BindingMarker::FromRoute {
                name: "userId".into()
            })
        );
        assert_eq!(marker.as_ref().and_then(|m| m.name()), Some("userId"));
        assert!(BindingMarker::for_source(BindingSpec::previous::<u8>().source()).is_none());
        assert_eq!(
            BindingMarker::for_source(BindingSpec::form::<String>().source()),
            Some(BindingMarker::FromForm)
        );
    }

    #[test]
    fn detached_host_exposes_only_services() {
        let host = DetachedHost::new();
        assert!(host.ambient(AmbientKind::Method).is_none());
        let services = host.ambient(AmbientKind::Services).unwrap();
        assert!(services.downcast_ref::<ServiceProvider>().is_some());
        let err = host
            .render(RenderRequest {
                kind: RenderKind::View,
                target: "Index".into(),
                model: TypedValue::new(Arc::new(1u8), ValueType::serializable::<u8>()),
            })
            .unwrap_err();
        assert!(matches!(err, DispatchError::View(ViewError::NotFound { .. })));
    }
}
