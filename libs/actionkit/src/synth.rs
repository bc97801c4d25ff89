//! Builds a [`DispatchUnit`] from a validated definition and its plan.
//!
//! All consistency checks run before any logic is registered, so a failing
//! endpoint leaves no keys behind in the handler registry.

use std::sync::Arc;

use uuid::Uuid;

use crate::binding::{BindingSource, BindingSpec};
use crate::compiler::CompiledEndpoint;
use crate::config::CompilerConfig;
use crate::diagnostics::{DiagnosticSink, Diagnostics};
use crate::error::{SynthesisError, SynthesisFailure};
use crate::logic::{LogicRef, MAX_HANDLER_ARITY};
use crate::model::{ActionDefinition, Annotation, HandlerStep};
use crate::plan::ParameterPlan;
use crate::registry::HandlerRegistry;
use crate::unit::{
    ActionMethod, ArgumentSource, BindingMarker, DispatchUnit, InvocationStrategy, ParameterInfo,
    ReturnShape, StepCall, UnitShape, ACTION_METHOD_NAME, DEFAULT_BASE,
};

pub fn synthesize(
    def: Arc<ActionDefinition>,
    plan: &ParameterPlan,
    registry: &Arc<HandlerRegistry>,
    config: &CompilerConfig,
    sink: Option<&dyn DiagnosticSink>,
) -> Result<CompiledEndpoint, SynthesisError> {
    let endpoint = def.display();
    let diag = Diagnostics::new(sink, endpoint.clone());
    let fail = |source: SynthesisFailure| SynthesisError {
        endpoint: endpoint.clone(),
        source,
    };

    let parameters = plan
        .ordered()
        .iter()
        .map(|p| parameter_info(p.slot, &p.binding).ok_or(p))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|p| {
            fail(SynthesisFailure::MissingSlot {
                step: 0,
                binding: p.binding.to_string(),
            })
        })?;

    let mut prepared = Vec::with_capacity(def.steps.len());
    for (i, step) in def.steps.iter().enumerate() {
        prepared.push(prepare_step(i, step, plan).map_err(&fail)?);
    }

    let mut body = Vec::with_capacity(prepared.len());
    for (i, (mut call, logic)) in prepared.into_iter().enumerate() {
        if let Some(logic) = logic {
            let key = registry.add(logic);
            diag.debug(
                "registered step logic",
                &[("step", i.to_string()), ("key", key.to_string())],
            );
            call.key = Some(key);
        }
        body.push(call);
    }

    let returns = if body.iter().any(|c| c.suspends) {
        ReturnShape::Suspending
    } else {
        ReturnShape::Immediate
    };
    let strategy = match body.as_slice() {
        [only] if only.suspends && only.render.is_none() && def.view_target.is_none() => {
            InvocationStrategy::Direct
        }
        _ => InvocationStrategy::Sequenced,
    };

    let shape = UnitShape {
        type_name: format!("{}_{}", config.unit_name_prefix, Uuid::new_v4().simple()),
        base: def
            .parent_type
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE.to_string()),
        annotations: class_annotations(&def),
    };

    if config.log_plans {
        let slots = parameters
            .iter()
            .map(|p| format!("{}:{}", p.position, p.binding))
            .collect::<Vec<_>>()
            .join(", ");
        diag.debug(
            "planned parameters",
            &[("count", parameters.len().to_string()), ("slots", slots)],
        );
    }

    let method = ActionMethod {
        name: ACTION_METHOD_NAME,
        http_method: def.method.clone(),
        annotations: def.annotations.clone(),
        parameters,
        returns,
        strategy,
        body,
        final_render: def.view_target.clone(),
    };

    diag.info(
        "synthesized dispatch unit",
        &[
            ("unit", shape.type_name.clone()),
            ("strategy", format!("{strategy:?}")),
            ("returns", format!("{returns:?}")),
        ],
    );

    let unit = DispatchUnit::new(shape, method, registry.clone());
    Ok(CompiledEndpoint {
        id: def.id.clone().unwrap_or_else(|| endpoint_id(&def)),
        name: endpoint,
        action_method_name: ACTION_METHOD_NAME,
        unit: Arc::new(unit),
        definition: def,
    })
}

fn parameter_info(position: usize, binding: &BindingSpec) -> Option<ParameterInfo> {
    let marker = BindingMarker::for_source(binding.source())?;
    let name = match binding.source() {
        BindingSource::Service => format!("service{position}"),
        BindingSource::Body => format!("body{position}"),
        BindingSource::Form => format!("form{position}"),
        BindingSource::CustomResolver { .. } => format!("custom{position}"),
        _ => binding.name().unwrap_or_default().to_string(),
    };
    Some(ParameterInfo {
        position,
        name,
        marker,
        value_type: binding.value_type(),
        optional: binding.default_value().is_some(),
        default: binding.default_value().cloned(),
        binding: binding.clone(),
    })
}

fn prepare_step(
    i: usize,
    step: &HandlerStep,
    plan: &ParameterPlan,
) -> Result<(StepCall, Option<LogicRef>), SynthesisFailure> {
    if step.bindings.len() > MAX_HANDLER_ARITY {
        return Err(SynthesisFailure::UnsupportedArity {
            step: i,
            arity: step.bindings.len(),
            max: MAX_HANDLER_ARITY,
        });
    }

    let mut args = Vec::with_capacity(step.bindings.len());
    for binding in &step.bindings {
        let source = match binding.source() {
            BindingSource::PreviousHandlerResult => ArgumentSource::Previous,
            BindingSource::AmbientContext { kind } => {
                let expected = kind.value_type();
                if binding.value_type() != expected {
                    return Err(SynthesisFailure::AmbientType {
                        step: i,
                        kind: *kind,
                        bound: binding.value_type().name(),
                        expected: expected.name(),
                    });
                }
                ArgumentSource::Ambient(*kind)
            }
            _ => ArgumentSource::Slot(plan.slot_of(binding).ok_or_else(|| {
                SynthesisFailure::MissingSlot {
                    step: i,
                    binding: binding.to_string(),
                }
            })?),
        };
        args.push(source);
    }

    if step.kind.is_render() {
        let target = step
            .render_target()
            .ok_or(SynthesisFailure::MissingRenderTarget { step: i })?;
        let call = StepCall {
            kind: step.kind,
            key: None,
            args,
            suspends: false,
            returns: None,
            render: Some(target),
        };
        return Ok((call, None));
    }

    let logic = step
        .logic
        .clone()
        .ok_or(SynthesisFailure::MissingLogic { step: i })?;
    if logic.arity() > MAX_HANDLER_ARITY {
        return Err(SynthesisFailure::UnsupportedArity {
            step: i,
            arity: logic.arity(),
            max: MAX_HANDLER_ARITY,
        });
    }
    if logic.arity() != step.bindings.len() {
        return Err(SynthesisFailure::Arity {
            step: i,
            declared: step.bindings.len(),
            accepted: logic.arity(),
        });
    }
    for (j, (binding, expected)) in step.bindings.iter().zip(logic.param_types()).enumerate() {
        if binding.value_type() != *expected {
            return Err(SynthesisFailure::ArgumentType {
                step: i,
                position: j + 1,
                bound: binding.value_type().name(),
                expected: expected.name(),
            });
        }
    }

    if let Some(declared) = step.return_type {
        if declared != logic.return_type() {
            return Err(SynthesisFailure::ReturnType {
                step: i,
                declared: declared.name(),
                actual: logic.return_type().name(),
            });
        }
    }
    if step.suspends != logic.suspends() {
        return Err(SynthesisFailure::Suspension {
            step: i,
            declared: step.suspends,
        });
    }

    let call = StepCall {
        kind: step.kind,
        key: None,
        args,
        suspends: step.suspends,
        returns: step.return_type,
        render: None,
    };
    Ok((call, Some(logic)))
}

/// Explicit class annotations plus a derived `ApiExplorer` one when the
/// definition groups or hides itself and does not carry its own.
fn class_annotations(def: &ActionDefinition) -> Vec<Annotation> {
    let mut annotations = def.class_annotations.clone();
    let explicit = def
        .class_annotations
        .iter()
        .chain(&def.annotations)
        .any(Annotation::is_api_explorer);
    if !explicit && (def.group_name.is_some() || def.ignore_api) {
        annotations.push(Annotation::ApiExplorer {
            group_name: def.group_name.clone(),
            ignore: def.ignore_api,
        });
    }
    annotations
}

/// `get_users_userid` for `[GET]/users/{userId}`.
fn endpoint_id(def: &ActionDefinition) -> String {
    let mut id = def.method.as_str().to_lowercase();
    for part in def
        .route_template
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|p| !p.is_empty())
    {
        id.push('_');
        id.push_str(&part.to_lowercase());
    }
    id
}
