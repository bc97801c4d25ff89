//! Deduplicated, ordered parameter list of a synthesized action method.

use std::collections::HashMap;

use crate::binding::{BindingSpec, IdentityKey};
use crate::model::ActionDefinition;

/// A method-level binding and the 1-based slot it occupies.
#[derive(Debug, Clone)]
pub struct PlannedParameter {
    pub slot: usize,
    pub binding: BindingSpec,
}

#[derive(Debug, Clone, Default)]
pub struct ParameterPlan {
    params: Vec<PlannedParameter>,
    slots: HashMap<IdentityKey, usize>,
}

impl ParameterPlan {
    /// Parameters in slot order.
    pub fn ordered(&self) -> &[PlannedParameter] {
        &self.params
    }

    /// Slot shared by every binding with the same identity as `binding`.
    pub fn slot_of(&self, binding: &BindingSpec) -> Option<usize> {
        self.slots.get(&binding.identity()).copied()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Walks every step's bindings in order, keeping the first occurrence of each
/// method-level identity. Ambient and previous-result bindings get no slot.
pub fn plan(def: &ActionDefinition) -> ParameterPlan {
    let mut out = ParameterPlan::default();
    for (_, binding) in def.all_bindings() {
        if !binding.is_method_level() {
            continue;
        }
        let key = binding.identity();
        if out.slots.contains_key(&key) {
            continue;
        }
        let slot = out.params.len() + 1;
        out.slots.insert(key, slot);
        out.params.push(PlannedParameter {
            slot,
            binding: binding.clone(),
        });
    }
    out
}
