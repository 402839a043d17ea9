//! Environment variables and evaluation context inputs.
//!
//! Variables are owned by the external environment store; the evaluator
//! receives a read-only [`EnvironmentSnapshot`] per evaluation call and
//! builds a transient name-to-value context from it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single user-defined variable scoped to one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name. Unique within its environment.
    pub name: String,

    /// Variable value. May itself contain `${...}` expressions referencing
    /// other variables; those are resolved during context building.
    pub value: String,

    /// Name of the environment this variable belongs to.
    pub environment: String,

    /// Disabled variables are excluded from context building.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Variable {
    /// Creates an enabled variable in the given environment.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            environment: environment.into(),
            enabled: true,
        }
    }
}

/// An ordered list of variables. Name uniqueness is only guaranteed within
/// one environment; the list may mix environments.
pub type VariableSet = Vec<Variable>;

/// Read-only snapshot of the environment store taken per evaluation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    /// Name of the active environment. Context building only admits
    /// variables belonging to it.
    pub name: String,

    /// The complete variable set as stored.
    #[serde(default)]
    pub variables: VariableSet,

    /// Host-provided system variables, included only when the caller opts
    /// in, at the lowest precedence.
    #[serde(default)]
    pub system_variables: HashMap<String, String>,
}

impl EnvironmentSnapshot {
    /// Creates an empty snapshot for the named environment.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            system_variables: HashMap::new(),
        }
    }

    /// Adds a variable belonging to this snapshot's environment.
    pub fn add_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let environment = self.name.clone();
        self.variables.push(Variable::new(name, value, environment));
    }

    /// Merges the raw (unresolved) variable values into a flat map:
    /// system variables first when requested, then enabled variables of the
    /// active environment in list order, then caller overrides.
    pub fn merge_raw(
        &self,
        overrides: &HashMap<String, String>,
        include_system: bool,
    ) -> HashMap<String, String> {
        let mut merged = HashMap::new();

        if include_system {
            for (name, value) in &self.system_variables {
                merged.insert(name.clone(), value.clone());
            }
        }

        for variable in &self.variables {
            if variable.enabled && variable.environment == self.name {
                merged.insert(variable.name.clone(), variable.value.clone());
            }
        }

        for (name, value) in overrides {
            merged.insert(name.clone(), value.clone());
        }

        merged
    }
}
