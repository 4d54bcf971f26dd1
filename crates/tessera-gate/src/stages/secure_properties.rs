use serde_json::{Map, Value};
use tessera_crypto::{KdfAlgorithm, SecretHash};
use tessera_schema::{pointer, Annotation};
use tessera_types::internal;

use crate::error::{GateError, GateResult};
use crate::stage::{FieldStage, StageContext, StageEffect};

/// Hashes every `secureProperty` string into
/// `internalMetadata.secureProperties[<pointer>]`.
///
/// Works like the password stage, per pointer. Records for pointers that
/// are no longer present or no longer flagged are pruned.
pub struct SecurePropertyStage;

impl FieldStage for SecurePropertyStage {
    fn name(&self) -> &str {
        "secure_properties"
    }

    fn apply(&self, ctx: &mut StageContext<'_>) -> GateResult<StageEffect> {
        let mut records = match ctx.object.metadata.internal_metadata.get(internal::SECURE_PROPERTIES) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        let mut seen: Vec<&str> = Vec::new();
        let mut changed = false;

        for (ptr, _) in ctx.pointers.find(|a| matches!(a, Annotation::SecureProperty)) {
            let Some(value) = pointer::get(ctx.json, ptr) else {
                continue;
            };
            let Some(secret) = value.as_str().map(str::to_string) else {
                return Err(GateError::invalid_at(
                    ptr,
                    "The \"secureProperty\" flag can only be used on properties of type \"string\".",
                ));
            };
            seen.push(ptr);
            let has_hash = records
                .get(ptr)
                .and_then(|r| r.get(internal::HASH))
                .is_some();
            if secret.is_empty() && has_hash {
                continue;
            }
            let record = SecretHash::generate(&secret, ctx.settings.hash_iterations, KdfAlgorithm::default())?;
            records.insert(ptr.to_string(), record.to_json());
            pointer::set(ctx.json, ptr, Value::String(String::new()))?;
            changed = true;
        }

        records.retain(|ptr, _| seen.contains(&ptr.as_str()));
        if records.is_empty() {
            ctx.object.metadata.remove_internal(internal::SECURE_PROPERTIES);
        } else {
            ctx.object
                .metadata
                .set_internal(internal::SECURE_PROPERTIES, Value::Object(records));
        }
        Ok(StageEffect::json(changed))
    }
}
