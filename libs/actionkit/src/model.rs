//! In-memory representation of one declared endpoint.

use std::collections::BTreeMap;
use std::fmt;

use http::Method;

use crate::binding::BindingSpec;
use crate::logic::LogicRef;
use crate::value::ValueType;

/// What a handler step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// Invokes logic and produces a value.
    Function,
    /// Invokes logic for its effect only; produces nothing.
    SideEffect,
    ViewRender,
    PartialViewRender,
    ComponentRender,
    /// Forwards to an existing, named handler.
    PassThroughTarget,
}

impl StepKind {
    pub fn is_render(&self) -> bool {
        matches!(
            self,
            StepKind::ViewRender | StepKind::PartialViewRender | StepKind::ComponentRender
        )
    }

    /// Steps that invoke registered logic.
    pub fn invokes_logic(&self) -> bool {
        matches!(
            self,
            StepKind::Function | StepKind::SideEffect | StepKind::PassThroughTarget
        )
    }

    pub(crate) fn render_kind(&self) -> Option<RenderKind> {
        match self {
            StepKind::ViewRender => Some(RenderKind::View),
            StepKind::PartialViewRender => Some(RenderKind::PartialView),
            StepKind::ComponentRender => Some(RenderKind::Component),
            _ => None,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderKind {
    View,
    PartialView,
    Component,
}

/// A view, partial view or component to render the final result with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewTarget {
    pub kind: RenderKind,
    pub target: String,
}

impl ViewTarget {
    pub fn view(target: impl Into<String>) -> Self {
        Self {
            kind: RenderKind::View,
            target: target.into(),
        }
    }

    pub fn partial(target: impl Into<String>) -> Self {
        Self {
            kind: RenderKind::PartialView,
            target: target.into(),
        }
    }

    pub fn component(target: impl Into<String>) -> Self {
        Self {
            kind: RenderKind::Component,
            target: target.into(),
        }
    }
}

/// Metadata attached to a synthesized unit or its action method.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    /// Controls whether and under which group the endpoint is documented.
    ApiExplorer {
        group_name: Option<String>,
        ignore: bool,
    },
    Custom {
        name: String,
        properties: BTreeMap<String, serde_json::Value>,
    },
}

impl Annotation {
    pub fn custom(name: impl Into<String>) -> Self {
        Annotation::Custom {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds a property to a `Custom` annotation; no-op for other variants.
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if let Annotation::Custom { properties, .. } = &mut self {
            properties.insert(key.into(), value);
        }
        self
    }

    pub fn is_api_explorer(&self) -> bool {
        matches!(self, Annotation::ApiExplorer { .. })
    }
}

/// One link of an endpoint's processing chain.
#[derive(Clone)]
pub struct HandlerStep {
    pub kind: StepKind,
    /// Arguments in declaration order.
    pub bindings: Vec<BindingSpec>,
    /// `None` only for side effects and render steps.
    pub return_type: Option<ValueType>,
    pub suspends: bool,
    pub logic: Option<LogicRef>,
    pub view_target: Option<String>,
    /// Name of the target handler for `PassThroughTarget`.
    pub component_ref: Option<String>,
}

impl HandlerStep {
    /// Step wrapping `logic`; return type and suspend flag are taken from it.
    pub fn with_logic(kind: StepKind, bindings: Vec<BindingSpec>, logic: LogicRef) -> Self {
        let return_type = match kind {
            StepKind::SideEffect => None,
            _ => Some(logic.return_type()),
        };
        Self {
            kind,
            bindings,
            return_type,
            suspends: logic.suspends(),
            logic: Some(logic),
            view_target: None,
            component_ref: None,
        }
    }

    pub fn render(target: ViewTarget, bindings: Vec<BindingSpec>) -> Self {
        let kind = match target.kind {
            RenderKind::View => StepKind::ViewRender,
            RenderKind::PartialView => StepKind::PartialViewRender,
            RenderKind::Component => StepKind::ComponentRender,
        };
        let (view_target, component_ref) = match target.kind {
            RenderKind::Component => (None, Some(target.target)),
            _ => (Some(target.target), None),
        };
        Self {
            kind,
            bindings,
            return_type: None,
            suspends: false,
            logic: None,
            view_target,
            component_ref,
        }
    }

    /// Render target of a render step.
    pub fn render_target(&self) -> Option<ViewTarget> {
        let kind = self.kind.render_kind()?;
        let target = match kind {
            RenderKind::Component => self.component_ref.clone()?,
            _ => self.view_target.clone()?,
        };
        Some(ViewTarget { kind, target })
    }
}

impl fmt::Debug for HandlerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerStep")
            .field("kind", &self.kind)
            .field("bindings", &self.bindings)
            .field("return_type", &self.return_type)
            .field("suspends", &self.suspends)
            .field("has_logic", &self.logic.is_some())
            .field("view_target", &self.view_target)
            .field("component_ref", &self.component_ref)
            .finish()
    }
}

/// Declarative description of an endpoint, immutable once handed to the compiler.
#[derive(Debug, Clone)]
pub struct ActionDefinition {
    pub route_template: String,
    pub method: Method,
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Documentation group; drives the auto-derived `ApiExplorer` annotation.
    pub group_name: Option<String>,
    pub ignore_api: bool,
    pub steps: Vec<HandlerStep>,
    /// Attached to the action method.
    pub annotations: Vec<Annotation>,
    /// Attached to the synthesized unit.
    pub class_annotations: Vec<Annotation>,
    /// Base the synthesized unit declares it derives from.
    pub parent_type: Option<String>,
    /// Applied to the final result after the last step.
    pub view_target: Option<ViewTarget>,
}

impl ActionDefinition {
    pub fn new(method: Method, route_template: impl Into<String>) -> Self {
        Self {
            route_template: route_template.into(),
            method,
            id: None,
            title: None,
            description: None,
            group_name: None,
            ignore_api: false,
            steps: Vec::new(),
            annotations: Vec::new(),
            class_annotations: Vec::new(),
            parent_type: None,
            view_target: None,
        }
    }

    /// Route template with a guaranteed leading slash.
    pub fn path(&self) -> String {
        if self.route_template.starts_with('/') {
            self.route_template.clone()
        } else {
            format!("/{}", self.route_template)
        }
    }

    /// `[METHOD]/route`, used in errors and diagnostics.
    pub fn display(&self) -> String {
        format!("[{}]{}", self.method, self.path())
    }

    /// Iterates every binding of every step, in step order.
    pub fn all_bindings(&self) -> impl Iterator<Item = (usize, &BindingSpec)> {
        self.steps
            .iter()
            .enumerate()
            .flat_map(|(i, step)| step.bindings.iter().map(move |b| (i, b)))
    }

    /// The render target in effect after the chain, whether declared as a
    /// terminal render step or at definition level.
    pub fn final_render_target(&self) -> Option<ViewTarget> {
        self.view_target
            .clone()
            .or_else(|| self.steps.last().and_then(HandlerStep::render_target))
    }
}

impl fmt::Display for ActionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}
