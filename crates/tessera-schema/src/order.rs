use serde_json::{Map, Value};

/// Reorder every object in `doc` so its keys follow the order the governing
/// schema declares them in `properties`. Keys the schema does not declare
/// keep their relative order and go last. Follows local `$ref`s and array
/// `items`.
///
/// Returns `true` if anything moved.
pub fn reorder_properties(doc: &mut Value, schema: &Value) -> bool {
    reorder_at(doc, schema, schema, 0)
}

const MAX_DEPTH: usize = 128;

fn reorder_at(doc: &mut Value, root: &Value, current: &Value, depth: usize) -> bool {
    if depth > MAX_DEPTH || !current.is_object() {
        return false;
    }
    if let Some(reference) = current.get("$ref").and_then(Value::as_str) {
        return match reference.strip_prefix('#').and_then(|p| root.pointer(p)) {
            Some(target) => reorder_at(doc, root, target, depth + 1),
            None => false,
        };
    }
    match doc {
        Value::Object(obj) => reorder_object(obj, root, current, depth),
        Value::Array(items) => {
            let Some(item_schema) = current.get("items").filter(|s| s.is_object()) else {
                return false;
            };
            let mut changed = false;
            for item in items.iter_mut() {
                changed |= reorder_at(item, root, item_schema, depth + 1);
            }
            changed
        }
        _ => false,
    }
}

fn reorder_object(obj: &mut Map<String, Value>, root: &Value, current: &Value, depth: usize) -> bool {
    let Some(properties) = current.get("properties").and_then(Value::as_object) else {
        return false;
    };
    let declared: Vec<&String> = properties.keys().collect();
    let mut changed = false;

    if !in_declared_order(obj, &declared) {
        let mut remaining = std::mem::take(obj);
        for name in &declared {
            if let Some(value) = remaining.shift_remove(name.as_str()) {
                obj.insert((*name).clone(), value);
            }
        }
        obj.extend(remaining);
        changed = true;
    }

    for (key, value) in obj.iter_mut() {
        if let Some(sub) = properties.get(key) {
            changed |= reorder_at(value, root, sub, depth + 1);
        }
    }
    changed
}

/// Declared keys appear in ascending declaration order, and no declared key
/// follows an undeclared one.
fn in_declared_order(obj: &Map<String, Value>, declared: &[&String]) -> bool {
    let mut last: Option<usize> = None;
    let mut seen_undeclared = false;
    for key in obj.keys() {
        match declared.iter().position(|d| *d == key) {
            None => seen_undeclared = true,
            Some(_) if seen_undeclared => return false,
            Some(index) => {
                if last.is_some_and(|l| index <= l) {
                    return false;
                }
                last = Some(index);
            }
        }
    }
    true
}
