//! Action descriptors: name, gating states, schemas and handler.

use std::collections::BTreeSet;

use agentry_types::action::ActionSummary;
use agentry_types::error::RegistryError;
use agentry_types::process::{TERMINATED, UNINITIALIZED};
use serde_json::{Value, json};

use super::handler::{ActionHandler, BoxActionHandler};

/// Builds a JSON Schema from a descriptor. Must be pure.
pub type SchemaBuilder = fn(&ActionDescriptor) -> Value;

/// Schema for any JSON object, titled after the action.
pub fn open_input_schema(descriptor: &ActionDescriptor) -> Value {
    json!({
        "title": format!("{}Input", descriptor.name()),
        "type": "object",
    })
}

/// Schema for arbitrary snapshot data.
pub fn open_output_schema(_descriptor: &ActionDescriptor) -> Value {
    json!({})
}

/// Schema generated from a Rust type, for use as a [`SchemaBuilder`].
pub fn schema_of<T: schemars::JsonSchema>(_descriptor: &ActionDescriptor) -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}

/// A registered action.
///
/// `allowed_states` is never empty, never contains `terminated`, and is
/// exactly `{UNINITIALIZED}` for initializers.
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    name: String,
    allowed_states: BTreeSet<String>,
    description: Option<String>,
    input_schema: SchemaBuilder,
    output_schema: SchemaBuilder,
    handler: BoxActionHandler,
}

impl ActionDescriptor {
    /// Start describing an action backed by `handler`.
    pub fn builder(name: impl Into<String>, handler: impl ActionHandler + 'static) -> ActionDescriptorBuilder {
        ActionDescriptorBuilder {
            name: name.into(),
            allowed_states: BTreeSet::new(),
            description: None,
            input_schema: open_input_schema,
            output_schema: open_output_schema,
            handler: BoxActionHandler::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn allowed_states(&self) -> &BTreeSet<String> {
        &self.allowed_states
    }

    pub fn handler(&self) -> &BoxActionHandler {
        &self.handler
    }

    /// True when the action creates processes rather than resuming them.
    pub fn is_initializer(&self) -> bool {
        self.allowed_states.len() == 1 && self.allowed_states.contains(UNINITIALIZED)
    }

    /// True when the action may run against a process in `state`.
    pub fn allows(&self, state: &str) -> bool {
        self.allowed_states.contains(state)
    }

    pub fn input_schema(&self) -> Value {
        (self.input_schema)(self)
    }

    /// Schema of the snapshot returned by a synchronous dispatch of this action.
    pub fn output_schema(&self) -> Value {
        json!({
            "title": format!("{}Response", self.name),
            "type": "object",
            "properties": {
                "process_id": {"type": "string"},
                "state": {"type": "string"},
                "data": (self.output_schema)(self),
                "available_actions": {"type": "array", "items": {"type": "string"}},
            },
            "required": ["process_id", "state", "data", "available_actions"],
        })
    }

    pub fn summary(&self) -> ActionSummary {
        ActionSummary {
            name: self.name.clone(),
            allowed_states: self.allowed_states.iter().cloned().collect(),
            description: self.description.clone(),
            input_schema: self.input_schema(),
            output_schema: self.output_schema(),
            initializer: self.is_initializer(),
        }
    }
}

/// Builder for [`ActionDescriptor`]; validation happens in [`build`](Self::build).
pub struct ActionDescriptorBuilder {
    name: String,
    allowed_states: BTreeSet<String>,
    description: Option<String>,
    input_schema: SchemaBuilder,
    output_schema: SchemaBuilder,
    handler: BoxActionHandler,
}

impl ActionDescriptorBuilder {
    /// Mark the action as an initializer (allowed only from `UNINITIALIZED`).
    pub fn initializer(mut self) -> Self {
        self.allowed_states = BTreeSet::from([UNINITIALIZED.to_string()]);
        self
    }

    pub fn allowed_states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_states.extend(states.into_iter().map(Into::into));
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn input_schema(mut self, builder: SchemaBuilder) -> Self {
        self.input_schema = builder;
        self
    }

    pub fn output_schema(mut self, builder: SchemaBuilder) -> Self {
        self.output_schema = builder;
        self
    }

    pub fn build(self) -> Result<ActionDescriptor, RegistryError> {
        if self.allowed_states.is_empty() {
            return Err(RegistryError::EmptyStates(self.name));
        }
        if self.allowed_states.contains(TERMINATED) {
            return Err(RegistryError::TerminatedState(self.name));
        }
        if self.allowed_states.contains(UNINITIALIZED) && self.allowed_states.len() > 1 {
            return Err(RegistryError::MixedInitializer(self.name));
        }
        Ok(ActionDescriptor {
            name: self.name,
            allowed_states: self.allowed_states,
            description: self.description,
            input_schema: self.input_schema,
            output_schema: self.output_schema,
            handler: self.handler,
        })
    }
}
