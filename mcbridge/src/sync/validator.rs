//! Whole-state validation rules.

use crate::sync::path::{get_path, has_path};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// JSON value kinds usable in type constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// `true` or `false`.
    Bool,
    /// Integer or float.
    Number,
    /// String.
    String,
    /// Array.
    Array,
    /// Object.
    Object,
}

impl ValueKind {
    /// Returns the kind of a non-null value.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Number(_) => Some(ValueKind::Number),
            Value::String(_) => Some(ValueKind::String),
            Value::Array(_) => Some(ValueKind::Array),
            Value::Object(_) => Some(ValueKind::Object),
        }
    }

    /// Returns the kind name.
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A custom predicate over the whole state.
pub type ValidationRule = Arc<dyn Fn(&Map<String, Value>) -> Result<(), String> + Send + Sync>;

/// Required keys, type constraints and custom rules checked on every commit.
///
/// # Examples
///
/// ```rust
/// use mcbridge::{StateValidator, ValueKind};
/// use serde_json::json;
///
/// let mut validator = StateValidator::new();
/// validator.add_required_key("game.started");
/// validator.add_type_constraint("game.started", ValueKind::Bool);
///
/// let ok = json!({"game": {"started": true}});
/// assert!(validator.validate(ok.as_object().unwrap()).is_ok());
///
/// let bad = json!({"game": {"started": "yes"}});
/// assert!(validator.validate(bad.as_object().unwrap()).is_err());
/// ```
#[derive(Clone, Default)]
pub struct StateValidator {
    required_keys: BTreeSet<String>,
    type_constraints: BTreeMap<String, ValueKind>,
    rules: Vec<(String, ValidationRule)>,
}

impl std::fmt::Debug for StateValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateValidator")
            .field("required_keys", &self.required_keys)
            .field("type_constraints", &self.type_constraints)
            .field(
                "rules",
                &self.rules.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl StateValidator {
    /// Creates a validator with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the validator for bot state.
    ///
    /// Requires `minecraft.spawned` (bool), constrains `minecraft.bot.health`
    /// and `minecraft.bot.food` to numbers, requires numeric position
    /// coordinates and health within `0..=20`.
    pub fn minecraft_defaults() -> Self {
        let mut validator = Self::new();
        validator.add_required_key("minecraft.spawned");
        validator.add_type_constraint("minecraft.spawned", ValueKind::Bool);
        validator.add_type_constraint("minecraft.bot.health", ValueKind::Number);
        validator.add_type_constraint("minecraft.bot.food", ValueKind::Number);

        validator.add_rule("position", |state| {
            let Some(position) = get_path(state, "minecraft.bot.position").and_then(Value::as_object)
            else {
                return Ok(());
            };
            for coord in ["x", "y", "z"] {
                if let Some(value) = position.get(coord) {
                    if !value.is_number() {
                        return Err(format!("Position {} must be numeric", coord));
                    }
                }
            }
            Ok(())
        });

        validator.add_rule("health", |state| {
            match get_path(state, "minecraft.bot.health").and_then(Value::as_f64) {
                Some(health) if !(0.0..=20.0).contains(&health) => {
                    Err("Health must be between 0 and 20".to_string())
                }
                _ => Ok(()),
            }
        });

        validator
    }

    /// Requires a dot path to exist.
    pub fn add_required_key<S: Into<String>>(&mut self, key: S) {
        self.required_keys.insert(key.into());
    }

    /// Constrains a dot path to a kind when it holds a non-null value.
    pub fn add_type_constraint<S: Into<String>>(&mut self, key: S, kind: ValueKind) {
        self.type_constraints.insert(key.into(), kind);
    }

    /// Adds a named rule, replacing any rule with the same name.
    pub fn add_rule<S, F>(&mut self, name: S, rule: F)
    where
        S: Into<String>,
        F: Fn(&Map<String, Value>) -> Result<(), String> + Send + Sync + 'static,
    {
        let name = name.into();
        let rule: ValidationRule = Arc::new(rule);
        match self.rules.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = rule,
            None => self.rules.push((name, rule)),
        }
    }

    /// Returns the number of custom rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Returns the number of required keys.
    pub fn required_key_count(&self) -> usize {
        self.required_keys.len()
    }

    /// Checks the state against every rule, collecting all errors.
    pub fn validate(&self, state: &Map<String, Value>) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for key in &self.required_keys {
            if !has_path(state, key) {
                errors.push(format!("Missing required key: {}", key));
            }
        }

        for (key, expected) in &self.type_constraints {
            if let Some(actual) = get_path(state, key).and_then(ValueKind::of) {
                if actual != *expected {
                    errors.push(format!(
                        "Type mismatch for {}: expected {}, got {}",
                        key, expected, actual
                    ));
                }
            }
        }

        for (name, rule) in &self.rules {
            if let Err(message) = rule(state) {
                errors.push(format!("Validation rule '{}' failed: {}", name, message));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
