//! Well-formedness checks run before synthesis.
//!
//! Every rule is evaluated; the result carries all violations at once.

use crate::binding::BindingKind;
use crate::error::ValidationError;
use crate::model::{ActionDefinition, StepKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn into_result(self, endpoint: impl Into<String>) -> Result<(), ValidationError> {
        if self.valid {
            Ok(())
        } else {
            Err(ValidationError {
                endpoint: endpoint.into(),
                errors: self.errors,
            })
        }
    }
}

pub fn validate(def: &ActionDefinition) -> ValidationResult {
    let mut errors = Vec::new();

    if def.steps.is_empty() {
        errors.push("Action definition must contain at least one handler step".to_string());
    }

    let last = def.steps.len().saturating_sub(1);
    for (i, step) in def.steps.iter().enumerate() {
        let needs_value = matches!(step.kind, StepKind::Function | StepKind::PassThroughTarget);
        if needs_value && step.return_type.is_none() {
            errors.push(format!(
                "Handler step {i} ({}) must declare a return type",
                step.kind
            ));
        }
        if step.kind.invokes_logic() && step.logic.is_none() {
            errors.push(format!("Handler step {i} ({}) has no logic to invoke", step.kind));
        }
        if step.kind.is_render() && i != last {
            errors.push(format!("Render step {i} must terminate the handler chain"));
        }
        if step.kind.is_render() && i == last && def.view_target.is_some() {
            errors.push(format!(
                "Definition-level view target conflicts with render step {i}"
            ));
        }
        if step.kind.is_render() {
            if !step.bindings.is_empty() {
                errors.push(format!("Render step {i} cannot declare bindings"));
            }
            if i == 0 || def.steps[i - 1].return_type.is_none() {
                errors.push(format!("Render step {i} has no result to render"));
            }
        }

        for binding in &step.bindings {
            if binding.kind() == BindingKind::PreviousHandlerResult {
                check_previous(def, i, binding.value_type(), &mut errors);
            }
            if let Some(default) = binding.default_value() {
                if !binding.value_type().matches(default) {
                    errors.push(format!(
                        "Default value for {binding} on step {i} is not a {}",
                        binding.value_type()
                    ));
                }
            }
        }
    }

    if def.steps.last().map(|s| s.kind) == Some(StepKind::SideEffect) {
        errors.push("A side-effect step cannot terminate a handler chain".to_string());
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

fn check_previous(
    def: &ActionDefinition,
    i: usize,
    expected: crate::value::ValueType,
    errors: &mut Vec<String>,
) {
    if i == 0 {
        errors.push("PreviousHandlerResult on step 0 has no preceding step".to_string());
        return;
    }
    let prev = &def.steps[i - 1];
    match prev.return_type {
        None => errors.push(format!(
            "PreviousHandlerResult must reference the immediately preceding step; step {} produces no value",
            i - 1
        )),
        Some(actual) if actual != expected => errors.push(format!(
            "PreviousHandlerResult on step {i} expects {expected} but step {} returns {actual}",
            i - 1
        )),
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingSpec;
    use crate::builder::ActionBuilder;
    use crate::model::HandlerStep;
    use http::Method;

    #[test]
    fn well_formed_chain_is_valid() {
        let def = ActionBuilder::get("/users/{id}")
            .using(BindingSpec::route::<i32>("id"))
            .to(|id: i32| id + 1)
            .using(BindingSpec::previous::<i32>())
            .to(|v: i32| v.to_string())
            .build();
        let result = validate(&def);
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.into_result(def.display()).is_ok());
    }

    #[test]
    fn empty_definition() {
        let def = ActionDefinition::new(Method::GET, "/");
        let result = validate(&def);
        assert_eq!(
            result.errors,
            vec!["Action definition must contain at least one handler step"]
        );
    }

    #[test]
    fn side_effect_cannot_terminate() {
        let def = ActionBuilder::post("/ping").side_effect(|| ()).build();
        let err = validate(&def).into_result(def.display()).unwrap_err();
        assert_eq!(err.endpoint, "[POST]/ping");
        assert_eq!(
            err.errors,
            vec!["A side-effect step cannot terminate a handler chain"]
        );
    }

    #[test]
    fn all_violations_are_reported_together() {
        let mut def = ActionBuilder::get("/x")
            .to(|| 1u8)
            .using(BindingSpec::previous::<u8>())
            .side_effect(|_v: u8| ())
            .build();
        def.steps[0].return_type = None;

        let result = validate(&def);
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![
                "Handler step 0 (Function) must declare a return type",
                "PreviousHandlerResult must reference the immediately preceding step; step 0 produces no value",
                "A side-effect step cannot terminate a handler chain",
            ]
        );
    }

    #[test]
    fn previous_result_rules() {
        let def = ActionBuilder::get("/x")
            .using(BindingSpec::previous::<u8>())
            .to(|v: u8| v)
            .build();
        assert_eq!(
            validate(&def).errors,
            vec!["PreviousHandlerResult on step 0 has no preceding step"]
        );

        let def = ActionBuilder::get("/x")
            .to(|| 1u8)
            .using(BindingSpec::previous::<String>())
            .to(|s: String| s)
            .build();
        let errors = validate(&def).errors;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("PreviousHandlerResult on step 1 expects alloc::string::String"));
        assert!(errors[0].ends_with("step 0 returns u8"));
    }

    #[test]
    fn render_and_view_rules() {
        let def = ActionBuilder::get("/x")
            .to(|| 1u8)
            .to_view("Index")
            .to(|| 2u8)
            .build();
        assert_eq!(
            validate(&def).errors,
            vec!["Render step 1 must terminate the handler chain"]
        );

        let def = ActionBuilder::get("/x")
            .to(|| 1u8)
            .to_view("Index")
            .with_view(crate::model::ViewTarget::view("Other"))
            .build();
        assert_eq!(
            validate(&def).errors,
            vec!["Definition-level view target conflicts with render step 1"]
        );
    }

    #[test]
    fn render_step_needs_a_model() {
        let def = ActionBuilder::get("/x")
            .using(BindingSpec::query::<u32>("page"))
            .to_view("Index")
            .build();
        assert_eq!(
            validate(&def).errors,
            vec![
                "Render step 0 cannot declare bindings",
                "Render step 0 has no result to render",
            ]
        );
    }

    #[test]
    fn missing_logic_and_bad_default() {
        let mut def = ActionDefinition::new(Method::GET, "/x");
        let mut step = HandlerStep::render(crate::model::ViewTarget::view("V"), vec![]);
        step.kind = StepKind::Function;
        step.return_type = Some(crate::value::ValueType::of::<u8>());
        step.bindings
            .push(BindingSpec::query::<u32>("page").with_default("one".to_string()));
        def.steps.push(step);

        assert_eq!(
            validate(&def).errors,
            vec![
                "Handler step 0 (Function) has no logic to invoke",
                "Default value for QueryParameter<u32>(\"page\") on step 0 is not a u32",
            ]
        );
    }
}
