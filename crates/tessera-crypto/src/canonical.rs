use serde_json::{Map, Value};

/// Rebuild `value` with every object's keys in lexicographic order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compact, key-sorted JSON text. Two values that differ only in key order or
/// whitespace produce identical output.
pub fn canonical_string(value: &Value) -> String {
    canonicalize(value).to_string()
}
