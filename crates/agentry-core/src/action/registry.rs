//! Per-agent action registry.
//!
//! Built once from a list of descriptors and immutable afterwards, so it can
//! be shared across concurrent dispatches without locking.

use std::collections::HashMap;

use agentry_types::action::ActionSummary;
use agentry_types::error::RegistryError;

use super::descriptor::ActionDescriptor;

/// Immutable name -> descriptor mapping for one agent.
///
/// Iteration order lists initializers first, keeping registration order
/// within each group.
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    actions: Vec<ActionDescriptor>,
    index: HashMap<String, usize>,
}

impl ActionRegistry {
    /// Build a registry, rejecting duplicate action names.
    pub fn new(descriptors: Vec<ActionDescriptor>) -> Result<Self, RegistryError> {
        let (mut actions, resumers): (Vec<_>, Vec<_>) =
            descriptors.into_iter().partition(|d| d.is_initializer());
        actions.extend(resumers);

        let mut index = HashMap::with_capacity(actions.len());
        for (i, descriptor) in actions.iter().enumerate() {
            if index.insert(descriptor.name().to_string(), i).is_some() {
                return Err(RegistryError::DuplicateAction(descriptor.name().to_string()));
            }
        }
        Ok(Self { actions, index })
    }

    pub fn get(&self, name: &str) -> Option<&ActionDescriptor> {
        self.index.get(name).map(|&i| &self.actions[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionDescriptor> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn has_initializer(&self) -> bool {
        self.actions.iter().any(ActionDescriptor::is_initializer)
    }

    /// Names of the actions that may run from `state`, in registry order.
    pub fn available_actions(&self, state: &str) -> Vec<String> {
        self.actions
            .iter()
            .filter(|d| d.allows(state))
            .map(|d| d.name().to_string())
            .collect()
    }

    pub fn summaries(&self) -> Vec<ActionSummary> {
        self.actions.iter().map(ActionDescriptor::summary).collect()
    }
}
