use serde_json::Value;
use tessera_crypto::{KdfAlgorithm, SecretHash};
use tessera_schema::{pointer, AuthKind};
use tessera_types::internal;

use crate::error::{GateError, GateResult};
use crate::stage::{FieldStage, StageContext, StageEffect};
use crate::stages::text_of;

/// Hashes the `auth:password` field into internal metadata.
///
/// The field itself is blanked. Submitting an empty password for an object
/// that already has a hash keeps the existing hash.
pub struct PasswordStage;

/// What to do with a submitted password.
enum PasswordChange {
    Keep,
    Set(String),
}

impl PasswordStage {
    fn classify(submitted: String, has_hash: bool, min_length: usize, ptr: &str) -> GateResult<PasswordChange> {
        if submitted.is_empty() && has_hash {
            return Ok(PasswordChange::Keep);
        }
        if submitted.chars().count() < min_length {
            return Err(GateError::invalid_at(
                ptr,
                format!("Password does not meet minimum length of {min_length}"),
            ));
        }
        Ok(PasswordChange::Set(submitted))
    }
}

impl FieldStage for PasswordStage {
    fn name(&self) -> &str {
        "password"
    }

    fn apply(&self, ctx: &mut StageContext<'_>) -> GateResult<StageEffect> {
        let mut changed = false;
        for (ptr, _) in ctx.pointers.auth_pointers(AuthKind::Password) {
            let Some(value) = pointer::get(ctx.json, ptr) else {
                continue;
            };
            let has_hash = ctx.object.metadata.internal_str(internal::HASH).is_some();
            let change = Self::classify(text_of(value), has_hash, ctx.settings.min_password_length, ptr)?;
            let PasswordChange::Set(password) = change else {
                continue;
            };
            let record = SecretHash::generate(&password, ctx.settings.hash_iterations, KdfAlgorithm::default())?;
            pointer::set(ctx.json, ptr, Value::String(String::new()))?;
            record.write_into(&mut ctx.object.metadata.internal_metadata);
            changed = true;
        }
        Ok(StageEffect::json(changed))
    }
}
