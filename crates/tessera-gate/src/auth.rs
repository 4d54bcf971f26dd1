//! Reads and writes of `auth`-annotated fields outside the pipeline.

use serde_json::Value;
use tessera_schema::{pointer, AuthKind, PointerMap};

use crate::error::GateResult;

/// Whether the document carries an `auth:username` field.
pub fn is_user(pointers: &PointerMap) -> bool {
    pointers.first_auth_pointer(AuthKind::Username).is_some()
}

/// The `auth:accountActive` flag.
///
/// A document without the field is active. A present field that is not
/// `true` is inactive.
pub fn is_account_active(json: &Value, pointers: &PointerMap) -> bool {
    match pointers
        .first_auth_pointer(AuthKind::AccountActive)
        .and_then(|ptr| pointer::get(json, ptr))
    {
        Some(flag) => flag.as_bool().unwrap_or(false),
        None => true,
    }
}

/// The `auth:requirePasswordChange` flag; absent means `false`.
pub fn requires_password_change(json: &Value, pointers: &PointerMap) -> bool {
    pointers
        .first_auth_pointer(AuthKind::RequirePasswordChange)
        .and_then(|ptr| pointer::get(json, ptr))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Write `value` into every `auth:requirePasswordChange` field.
/// Returns whether any field exists.
pub fn set_require_password_change(json: &mut Value, pointers: &PointerMap, value: bool) -> GateResult<bool> {
    write_all(json, pointers, AuthKind::RequirePasswordChange, Value::Bool(value))
}

/// Write a plaintext password into every `auth:password` field, ready for
/// the pipeline to hash. Returns whether any field exists.
pub fn set_password(json: &mut Value, pointers: &PointerMap, password: &str) -> GateResult<bool> {
    write_all(json, pointers, AuthKind::Password, Value::String(password.to_string()))
}

fn write_all(json: &mut Value, pointers: &PointerMap, kind: AuthKind, value: Value) -> GateResult<bool> {
    let targets = pointers.auth_pointers(kind);
    for (ptr, _) in &targets {
        pointer::set(json, ptr, value.clone())?;
    }
    Ok(!targets.is_empty())
}
