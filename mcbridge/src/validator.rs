//! Payload validation and normalization.
//!
//! Validation runs in two phases. The first normalizes the raw JSON payload:
//! positions become canonical float or integer triples, item stacks get a
//! trimmed lowercase name and a clamped count, and anything that cannot be
//! normalized is replaced by `null` with a warning. The second decodes the
//! normalized payload into the typed [`EventPayload`] registered for the
//! event type. Only the timestamp check and the typed decode produce errors.

use crate::event::{short_type_of, unix_millis, InboundEvent};
use crate::payload::EventPayload;
use crate::registry::EventRegistry;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::warn;

/// How far in the future an event timestamp may lie.
pub const FUTURE_TOLERANCE_MS: i64 = 60_000;

/// Largest absolute entity coordinate.
pub const MAX_ENTITY_COORDINATE: f64 = 30_000_000.0;

/// Largest absolute horizontal block coordinate.
pub const MAX_BLOCK_HORIZONTAL: i64 = 29_999_984;

/// Lowest block Y coordinate.
pub const MIN_BLOCK_Y: i64 = -2048;

/// Highest block Y coordinate.
pub const MAX_BLOCK_Y: i64 = 2047;

/// Largest item stack.
pub const MAX_ITEM_COUNT: i64 = 64;

/// Longest accepted item name.
pub const MAX_ITEM_NAME_LEN: usize = 100;

/// Outcome of validating one payload.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Whether the payload may continue through the pipeline.
    pub valid: bool,
    /// Problems that make the payload invalid.
    pub errors: Vec<String>,
    /// Problems that were tolerated.
    pub warnings: Vec<String>,
    /// The normalized payload, present only when valid.
    pub normalized: Option<Map<String, Value>>,
    /// The typed payload, present when valid and the type is registered.
    pub typed: Option<EventPayload>,
}

impl ValidationReport {
    fn invalid(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
            warnings,
            normalized: None,
            typed: None,
        }
    }
}

/// Validates and normalizes event payloads against the registry's schemas.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use mcbridge::{EventRegistry, PayloadValidator};
/// use serde_json::json;
///
/// let validator = PayloadValidator::new(Arc::new(EventRegistry::with_defaults()));
/// let now = chrono::Utc::now().timestamp_millis();
///
/// let payload = json!({"item": {"name": "  Diamond_Sword "}, "time": now});
/// let report = validator.validate("minecraft:item_pickup", payload.as_object().unwrap());
///
/// assert!(report.valid);
/// let normalized = report.normalized.unwrap();
/// assert_eq!(normalized["item"]["name"], "diamond_sword");
/// assert_eq!(normalized["item"]["count"], 1);
/// ```
#[derive(Debug, Clone)]
pub struct PayloadValidator {
    registry: Arc<EventRegistry>,
}

impl PayloadValidator {
    /// Creates a validator backed by a registry.
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry this validator decodes against.
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Validates an inbound event, falling back to the record timestamp when
    /// the payload carries no `time` field.
    pub fn validate_event(&self, event: &InboundEvent) -> ValidationReport {
        if event.data.contains_key("time") {
            return self.validate(&event.event_type, &event.data);
        }
        match event.timestamp {
            Some(timestamp) => {
                let mut payload = event.data.clone();
                payload.insert("time".to_string(), json!(timestamp));
                self.validate(&event.event_type, &payload)
            }
            None => self.validate(&event.event_type, &event.data),
        }
    }

    /// Validates and normalizes a payload for the given event type.
    pub fn validate(&self, event_type: &str, payload: &Map<String, Value>) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut normalized = payload.clone();

        match payload.get("time") {
            None => errors.push("Missing required field 'time'".to_string()),
            Some(raw) => match check_timestamp(raw, unix_millis()) {
                Ok(time) => {
                    normalized.insert("time".to_string(), json!(time));
                }
                Err(error) => errors.push(error),
            },
        }

        let schema = self.registry.metadata(event_type).map(|m| m.payload_schema());
        let block_position = schema.map(|s| s.uses_block_position()).unwrap_or(false);

        if block_position {
            normalize_field(&mut normalized, "position", &mut warnings, normalize_block_position);
        } else {
            normalize_field(&mut normalized, "position", &mut warnings, normalize_position);
        }
        normalize_field(&mut normalized, "velocity", &mut warnings, normalize_position);
        for field in ["old_position", "new_position", "container_position"] {
            normalize_field(&mut normalized, field, &mut warnings, normalize_block_position);
        }
        for field in ["item", "result_item"] {
            normalize_field(&mut normalized, field, &mut warnings, normalize_item);
        }
        if let Some(Value::Array(ingredients)) = normalized.get_mut("ingredients") {
            for ingredient in ingredients.iter_mut() {
                match normalize_item(ingredient) {
                    Ok(item) => *ingredient = item,
                    Err(reason) => {
                        warn!(field = "ingredients", error = %reason, "Failed to normalize item");
                        warnings.push(format!("Failed to normalize ingredients: {}", reason));
                        *ingredient = Value::Null;
                    }
                }
            }
        }

        check_event_warnings(event_type, &normalized, &mut warnings);

        if !errors.is_empty() {
            return ValidationReport::invalid(errors, warnings);
        }

        let typed = match schema {
            Some(schema) => match schema.decode(&normalized) {
                Ok(typed) => Some(typed),
                Err(reason) => {
                    errors.push(format!("Payload does not match schema: {}", reason));
                    return ValidationReport::invalid(errors, warnings);
                }
            },
            None => {
                warnings.push(format!("Unregistered event type '{}'", event_type));
                None
            }
        };

        ValidationReport {
            valid: true,
            errors,
            warnings,
            normalized: Some(normalized),
            typed,
        }
    }
}

fn check_timestamp(raw: &Value, now_ms: i64) -> Result<i64, String> {
    let time = raw
        .as_f64()
        .filter(|t| t.is_finite())
        .ok_or_else(|| "Timestamp must be a number".to_string())? as i64;
    if time <= 0 {
        return Err("Timestamp must be positive".to_string());
    }
    if time > now_ms + FUTURE_TOLERANCE_MS {
        return Err("Timestamp cannot be more than 1 minute in the future".to_string());
    }
    Ok(time)
}

fn normalize_field(
    payload: &mut Map<String, Value>,
    field: &str,
    warnings: &mut Vec<String>,
    normalize: fn(&Value) -> Result<Value, String>,
) {
    let Some(value) = payload.get_mut(field) else {
        return;
    };
    if value.is_null() {
        return;
    }
    match normalize(value) {
        Ok(normalized) => *value = normalized,
        Err(reason) => {
            warn!(field, error = %reason, "Failed to normalize payload field");
            warnings.push(format!("Failed to normalize {}: {}", field, reason));
            *value = Value::Null;
        }
    }
}

fn coordinate(object: &Map<String, Value>, axis: &str) -> Result<f64, String> {
    object
        .get(axis)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("coordinate {} must be a finite number", axis))
}

/// Normalizes an entity position into `{x, y, z}` within the world border.
///
/// Extra fields are dropped. Each coordinate keeps its JSON number form, so
/// integral input stays integral.
pub fn normalize_position(value: &Value) -> Result<Value, String> {
    let object = value.as_object().ok_or("position must be an object")?;
    let mut position = Map::new();
    for axis in ["x", "y", "z"] {
        let v = coordinate(object, axis)?;
        if v.abs() > MAX_ENTITY_COORDINATE {
            return Err(format!("coordinate {} exceeds world boundary", axis));
        }
        let number = object.get(axis).cloned().unwrap_or_else(|| json!(v));
        position.insert(axis.to_string(), number);
    }
    Ok(Value::Object(position))
}

/// Normalizes a block position into integer `{x, y, z}`, truncating floats.
pub fn normalize_block_position(value: &Value) -> Result<Value, String> {
    let object = value.as_object().ok_or("block position must be an object")?;
    let x = coordinate(object, "x")? as i64;
    let y = coordinate(object, "y")? as i64;
    let z = coordinate(object, "z")? as i64;

    if x.abs() > MAX_BLOCK_HORIZONTAL || z.abs() > MAX_BLOCK_HORIZONTAL {
        return Err("block coordinate exceeds world boundary".to_string());
    }
    if !(MIN_BLOCK_Y..=MAX_BLOCK_Y).contains(&y) {
        return Err(format!(
            "Y coordinate must be between {} and {}",
            MIN_BLOCK_Y, MAX_BLOCK_Y
        ));
    }
    Ok(json!({"x": x, "y": y, "z": z}))
}

/// Normalizes an item stack: trimmed lowercase name, count clamped to `0..=64`.
pub fn normalize_item(value: &Value) -> Result<Value, String> {
    let object = value.as_object().ok_or("item must be an object")?;
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .ok_or("item name must be a non-empty string")?;
    if name.chars().count() > MAX_ITEM_NAME_LEN {
        return Err("item name too long".to_string());
    }

    let count = match object.get("count") {
        None | Some(Value::Null) => 1,
        Some(count) => count
            .as_f64()
            .filter(|c| c.is_finite())
            .ok_or("item count must be a number")? as i64,
    }
    .clamp(0, MAX_ITEM_COUNT);

    let mut item = Map::new();
    item.insert("name".to_string(), json!(name));
    item.insert("count".to_string(), json!(count));

    match object.get("slot") {
        None | Some(Value::Null) => {}
        Some(slot) => match slot.as_i64() {
            Some(slot) if (0..=255).contains(&slot) => {
                item.insert("slot".to_string(), json!(slot));
            }
            _ => return Err("item slot must be between 0 and 255".to_string()),
        },
    }
    if let Some(metadata) = object.get("metadata").filter(|m| m.is_object()) {
        item.insert("metadata".to_string(), metadata.clone());
    }

    Ok(Value::Object(item))
}

fn check_event_warnings(event_type: &str, payload: &Map<String, Value>, warnings: &mut Vec<String>) {
    match short_type_of(event_type) {
        "spawn" => {
            if !payload.contains_key("spawned") {
                warnings.push("Spawn event missing 'spawned' field".to_string());
            }
        }
        "health" => {
            if let Some(health) = payload.get("health").and_then(Value::as_f64) {
                if !(0.0..=20.0).contains(&health) {
                    warnings.push(format!(
                        "Health value {} is outside normal range (0-20)",
                        health
                    ));
                }
            }
        }
        "inventory_change" => {
            if let Some(slot) = payload.get("slot").and_then(Value::as_i64) {
                if !(0..=45).contains(&slot) {
                    warnings.push(format!(
                        "Inventory slot {} is outside normal range (0-45)",
                        slot
                    ));
                }
            }
        }
        _ => {}
    }
}
