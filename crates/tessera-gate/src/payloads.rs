use std::collections::HashSet;

use tessera_types::Payload;

use crate::error::{GateError, GateResult};

/// Every payload needs a non-empty name, and names are unique.
pub fn validate_payloads(payloads: &[Payload]) -> GateResult<()> {
    let mut names = HashSet::new();
    for payload in payloads {
        if payload.name.is_empty() {
            return Err(match &payload.filename {
                Some(filename) => GateError::invalid(format!("Payload for filename {filename} missing name")),
                None => GateError::invalid("Payload missing name"),
            });
        }
        if !names.insert(payload.name.as_str()) {
            return Err(GateError::invalid(format!("Duplicate payload {}", payload.name)));
        }
    }
    Ok(())
}
