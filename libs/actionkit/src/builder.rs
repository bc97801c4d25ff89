//! Fluent declaration of an [`ActionDefinition`].
//!
//! Bindings collected with [`ActionBuilder::using`] are consumed by the next
//! step added to the chain:
//!
//! ```ignore
//! let def = ActionBuilder::get("/users/{userId}")
//!     .title("Get user")
//!     .using(BindingSpec::route::<i32>("userId"))
//!     .to(|id: i32| id.to_string())
//!     .build();
//! ```

use http::Method;

use crate::binding::BindingSpec;
use crate::logic::{AsyncLogic, SyncLogic};
use crate::model::{ActionDefinition, Annotation, HandlerStep, StepKind, ViewTarget};

#[must_use]
pub struct ActionBuilder {
    def: ActionDefinition,
    pending: Vec<BindingSpec>,
}

impl ActionBuilder {
    pub fn new(method: Method, route: impl Into<String>) -> Self {
        Self {
            def: ActionDefinition::new(method, route),
            pending: Vec::new(),
        }
    }

    pub fn get(route: impl Into<String>) -> Self {
        Self::new(Method::GET, route)
    }

    pub fn post(route: impl Into<String>) -> Self {
        Self::new(Method::POST, route)
    }

    pub fn put(route: impl Into<String>) -> Self {
        Self::new(Method::PUT, route)
    }

    pub fn delete(route: impl Into<String>) -> Self {
        Self::new(Method::DELETE, route)
    }

    pub fn patch(route: impl Into<String>) -> Self {
        Self::new(Method::PATCH, route)
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.def.id = Some(id.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.def.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.def.description = Some(description.into());
        self
    }

    /// Documentation group (becomes the OpenAPI tag).
    pub fn group_by(mut self, group: impl Into<String>) -> Self {
        self.def.group_name = Some(group.into());
        self
    }

    /// Hide the endpoint from generated API documentation.
    pub fn ignore_api(mut self) -> Self {
        self.def.ignore_api = true;
        self
    }

    /// Annotation on the action method.
    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.def.annotations.push(annotation);
        self
    }

    /// Annotation on the synthesized unit.
    pub fn annotate_class(mut self, annotation: Annotation) -> Self {
        self.def.class_annotations.push(annotation);
        self
    }

    pub fn inherit(mut self, base: impl Into<String>) -> Self {
        self.def.parent_type = Some(base.into());
        self
    }

    /// Adds an argument binding for the next step.
    pub fn using(mut self, binding: BindingSpec) -> Self {
        self.pending.push(binding);
        self
    }

    pub fn to<F, Args, R>(self, f: F) -> Self
    where
        F: SyncLogic<Args, R>,
    {
        let logic = f.into_logic();
        self.push_logic(StepKind::Function, logic)
    }

    pub fn to_async<F, Args, R>(self, f: F) -> Self
    where
        F: AsyncLogic<Args, R>,
    {
        let logic = f.into_logic();
        self.push_logic(StepKind::Function, logic)
    }

    pub fn side_effect<F, Args, R>(self, f: F) -> Self
    where
        F: SyncLogic<Args, R>,
    {
        let logic = f.into_logic();
        self.push_logic(StepKind::SideEffect, logic)
    }

    pub fn side_effect_async<F, Args, R>(self, f: F) -> Self
    where
        F: AsyncLogic<Args, R>,
    {
        let logic = f.into_logic();
        self.push_logic(StepKind::SideEffect, logic)
    }

    /// Forwards to an existing handler, recorded by `name`.
    pub fn to_target<F, Args, R>(self, name: impl Into<String>, f: F) -> Self
    where
        F: SyncLogic<Args, R>,
    {
        let logic = f.into_logic();
        let mut this = self.push_logic(StepKind::PassThroughTarget, logic);
        if let Some(step) = this.def.steps.last_mut() {
            step.component_ref = Some(name.into());
        }
        this
    }

    pub fn to_view(self, target: impl Into<String>) -> Self {
        self.push_render(ViewTarget::view(target))
    }

    pub fn to_partial_view(self, target: impl Into<String>) -> Self {
        self.push_render(ViewTarget::partial(target))
    }

    pub fn to_component(self, target: impl Into<String>) -> Self {
        self.push_render(ViewTarget::component(target))
    }

    /// Renders the chain's final result with `target`.
    pub fn with_view(mut self, target: ViewTarget) -> Self {
        self.def.view_target = Some(target);
        self
    }

    /// Finishes the declaration. Bindings not consumed by a step are dropped.
    pub fn build(self) -> ActionDefinition {
        if !self.pending.is_empty() {
            tracing::warn!(
                endpoint = %self.def.display(),
                dropped = self.pending.len(),
                "bindings declared after the last step are ignored"
            );
        }
        self.def
    }

    fn push_logic(mut self, kind: StepKind, logic: crate::logic::LogicRef) -> Self {
        let bindings = std::mem::take(&mut self.pending);
        self.def
            .steps
            .push(HandlerStep::with_logic(kind, bindings, logic));
        self
    }

    fn push_render(mut self, target: ViewTarget) -> Self {
        let bindings = std::mem::take(&mut self.pending);
        self.def.steps.push(HandlerStep::render(target, bindings));
        self
    }
}
