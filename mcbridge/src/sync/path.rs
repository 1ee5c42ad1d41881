//! Dot-path access into nested JSON objects.

use serde_json::{Map, Value};

/// Returns the value at a dot-delimited path such as `minecraft.bot.health`.
pub fn get_path<'a>(state: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = state.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Returns `true` if every segment of the path exists.
pub fn has_path(state: &Map<String, Value>, path: &str) -> bool {
    get_path(state, path).is_some()
}

/// Sets the value at a dot path, creating intermediate objects.
///
/// Non-object values met along the way are replaced by empty objects.
pub fn set_path(state: &mut Map<String, Value>, path: &str, value: Value) {
    let mut parts: Vec<&str> = path.split('.').collect();
    let Some(last) = parts.pop() else {
        return;
    };

    let mut current = state;
    for part in parts {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Some(map) = entry.as_object_mut() else {
            return;
        };
        current = map;
    }
    current.insert(last.to_string(), value);
}

/// Removes the value at a dot path, returning it if it existed.
///
/// Parents left empty are kept.
pub fn delete_path(state: &mut Map<String, Value>, path: &str) -> Option<Value> {
    let mut parts: Vec<&str> = path.split('.').collect();
    let last = parts.pop()?;

    let mut current = state;
    for part in parts {
        current = current.get_mut(part)?.as_object_mut()?;
    }
    current.remove(last)
}
