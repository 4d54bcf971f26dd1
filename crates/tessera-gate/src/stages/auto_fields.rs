use serde_json::Value;
use tessera_schema::{pointer, Annotation, AutoField};

use crate::error::{GateError, GateResult};
use crate::stage::{FieldStage, StageContext, StageEffect};

/// Identity recorded for writes with no acting user.
pub const ANONYMOUS: &str = "anonymous";

/// Overwrites `autoGeneratedField` locations with system values.
pub struct AutoFieldStage;

impl AutoFieldStage {
    fn value_for(field: &AutoField, ctx: &StageContext<'_>) -> GateResult<String> {
        let md = &ctx.object.metadata;
        Ok(match field {
            AutoField::Handle => ctx.object.id.clone(),
            AutoField::CreationDate => md.created_on.unwrap_or(ctx.now).format(),
            AutoField::ModificationDate => ctx.now.format(),
            AutoField::CreatedBy => md
                .created_by
                .clone()
                .unwrap_or_else(|| ANONYMOUS.to_string()),
            AutoField::ModifiedBy => ctx.acting_user.unwrap_or(ANONYMOUS).to_string(),
            AutoField::Type => ctx.object.object_type.clone(),
            AutoField::Unknown(name) => {
                return Err(GateError::invalid(format!("Unknown autoGeneratedField {name}")))
            }
        })
    }
}

impl FieldStage for AutoFieldStage {
    fn name(&self) -> &str {
        "auto_fields"
    }

    fn apply(&self, ctx: &mut StageContext<'_>) -> GateResult<StageEffect> {
        let mut writes = Vec::new();
        for (ptr, annotation) in ctx.pointers.find(|a| matches!(a, Annotation::AutoGenerated { .. })) {
            let Annotation::AutoGenerated { field, prefixing } = annotation else {
                continue;
            };
            let full = Self::value_for(field, ctx)?;
            let value = prefixing.strip(&full, ctx.settings.minting_prefix());
            writes.push((ptr, value));
        }
        let found = !writes.is_empty();
        for (ptr, value) in writes {
            pointer::set(ctx.json, ptr, Value::String(value))?;
        }
        Ok(StageEffect::json(found))
    }
}
