use serde_json::Value;
use tessera_schema::{pointer, Annotation, PointerMap};
use tracing::debug;

use crate::error::{GateError, GateResult};
use crate::stage::FieldLookups;
use crate::stages::text_of;

struct Reference<'a> {
    pointer: &'a str,
    handle: String,
    types: &'a [String],
    exclude_types: &'a [String],
}

/// Check every `handleReference` location against the referenced object.
///
/// All referenced ids are resolved in a single lookup. A reference fails if
/// the object is missing, has an excluded type, or is not one of the
/// allowed types (when any are listed).
pub fn check_handle_references(
    json: &Value,
    pointers: &PointerMap,
    minting_prefix: Option<&str>,
    lookups: &dyn FieldLookups,
) -> GateResult<()> {
    let mut references = Vec::new();
    for (ptr, annotation) in pointers.find(|a| matches!(a, Annotation::HandleReference { .. })) {
        let Annotation::HandleReference {
            types,
            exclude_types,
            prefixing,
        } = annotation
        else {
            continue;
        };
        let Some(value) = pointer::get(json, ptr) else {
            return Err(GateError::invalid_at(
                ptr,
                format!("Unexpected missing handle reference node {ptr}"),
            ));
        };
        references.push(Reference {
            pointer: ptr,
            handle: prefixing.apply(&text_of(value), minting_prefix),
            types,
            exclude_types,
        });
    }
    if references.is_empty() {
        return Ok(());
    }

    let ids: Vec<String> = references.iter().map(|r| r.handle.clone()).collect();
    let found = lookups.object_types(&ids)?;
    debug!(references = ids.len(), found = found.len(), "resolved handle references");

    for reference in &references {
        let Some(found_type) = found.get(&reference.handle) else {
            return Err(GateError::invalid_at(
                reference.pointer,
                format!("Unexpected missing object {} at {}", reference.handle, reference.pointer),
            ));
        };
        if reference.exclude_types.contains(found_type) {
            return Err(GateError::invalid_at(
                reference.pointer,
                format!(
                    "Object {} referenced at {} has type {} which is not permitted.",
                    reference.handle, reference.pointer, found_type
                ),
            ));
        }
        if !reference.types.is_empty() && !reference.types.contains(found_type) {
            return Err(GateError::invalid_at(
                reference.pointer,
                format!(
                    "Object {} referenced at {} has type {}, expected {:?}",
                    reference.handle, reference.pointer, found_type, reference.types
                ),
            ));
        }
    }
    Ok(())
}
