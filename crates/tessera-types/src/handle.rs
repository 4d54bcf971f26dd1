use crate::error::TypeError;

/// Fixed id of the singleton design object.
pub const DESIGN_OBJECT_ID: &str = "design";

/// Type name of the meta-type whose objects define schemas.
pub const SCHEMA_TYPE: &str = "Schema";

/// Returns `true` if `handle` is usable as an object id.
///
/// A handle is non-empty, contains a `/` separating prefix from suffix, and
/// does not start with `/` or `.`.
pub fn is_valid_handle(handle: &str) -> bool {
    !handle.is_empty()
        && !handle.starts_with('/')
        && !handle.starts_with('.')
        && handle.contains('/')
}

/// Like [`is_valid_handle`] but returns the offending handle as an error.
pub fn validate_handle(handle: &str) -> Result<(), TypeError> {
    if is_valid_handle(handle) {
        Ok(())
    } else {
        Err(TypeError::InvalidHandle(handle.to_string()))
    }
}
