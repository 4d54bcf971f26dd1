//! RFC 6901 JSON pointers.
//!
//! Reads go through `serde_json::Value::pointer`; writes are implemented here
//! so stages can edit a single owned working tree.

use serde_json::Value;

use crate::error::{SchemaError, SchemaResult};

/// Escape one reference token (`~` → `~0`, `/` → `~1`).
pub fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Inverse of [`escape`].
pub fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Pointer to the child `token` of `base`.
pub fn child(base: &str, token: &str) -> String {
    format!("{base}/{}", escape(token))
}

/// Pointer to element `index` of the array at `base`.
pub fn index_child(base: &str, index: usize) -> String {
    format!("{base}/{index}")
}

/// Split a pointer into unescaped tokens. The empty pointer is the root.
pub fn tokens(pointer: &str) -> SchemaResult<Vec<String>> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    if !pointer.starts_with('/') {
        return Err(SchemaError::InvalidPointer(pointer.to_string()));
    }
    Ok(pointer[1..].split('/').map(unescape).collect())
}

pub fn get<'a>(root: &'a Value, pointer: &str) -> Option<&'a Value> {
    root.pointer(pointer)
}

pub fn get_str<'a>(root: &'a Value, pointer: &str) -> Option<&'a str> {
    root.pointer(pointer).and_then(Value::as_str)
}

/// Replace or insert the value at `pointer`. The parent must already exist.
///
/// Existing object keys keep their position. For arrays, an index equal to
/// the length (or `-`) appends.
pub fn set(root: &mut Value, pointer: &str, value: Value) -> SchemaResult<()> {
    let mut toks = tokens(pointer)?;
    let Some(last) = toks.pop() else {
        *root = value;
        return Ok(());
    };
    let parent_ptr = parent_pointer(pointer);
    let parent = root
        .pointer_mut(parent_ptr)
        .ok_or_else(|| SchemaError::MissingParent(pointer.to_string()))?;
    match parent {
        Value::Object(map) => {
            map.insert(last, value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            let index: usize = last
                .parse()
                .map_err(|_| SchemaError::InvalidPointer(pointer.to_string()))?;
            if index < items.len() {
                items[index] = value;
                Ok(())
            } else if index == items.len() {
                items.push(value);
                Ok(())
            } else {
                Err(SchemaError::MissingParent(pointer.to_string()))
            }
        }
        _ => Err(SchemaError::MissingParent(pointer.to_string())),
    }
}

/// Remove and return the value at `pointer`, preserving sibling order.
pub fn remove(root: &mut Value, pointer: &str) -> Option<Value> {
    let mut toks = tokens(pointer).ok()?;
    let last = toks.pop()?;
    let parent = root.pointer_mut(parent_pointer(pointer))?;
    match parent {
        Value::Object(map) => map.shift_remove(&last),
        Value::Array(items) => {
            let index: usize = last.parse().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}

fn parent_pointer(pointer: &str) -> &str {
    match pointer.rfind('/') {
        Some(pos) => &pointer[..pos],
        None => "",
    }
}
