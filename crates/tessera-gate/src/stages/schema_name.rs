use tessera_schema::pointer;
use tessera_types::{internal, SCHEMA_TYPE};

use crate::error::{GateError, GateResult};
use crate::stage::{FieldStage, StageContext, StageEffect};

const NAME_POINTER: &str = "/name";

/// Schema objects must declare a name no other schema object holds.
///
/// The name `Schema` itself is reserved for the meta-type.
pub struct SchemaNameStage;

impl FieldStage for SchemaNameStage {
    fn name(&self) -> &str {
        "schema_name"
    }

    fn apply(&self, ctx: &mut StageContext<'_>) -> GateResult<StageEffect> {
        if ctx.object.object_type != SCHEMA_TYPE {
            return Ok(StageEffect::NONE);
        }
        let name = pointer::get_str(ctx.json, NAME_POINTER).unwrap_or_default().to_string();
        let unique = name != SCHEMA_TYPE
            && match ctx.lookups.schema_id_for_name(&name)? {
                Some(holder) => holder == ctx.object.id,
                None => true,
            };
        if !unique {
            return Err(GateError::invalid_at(
                NAME_POINTER,
                format!("Schema name {name} is not unique."),
            ));
        }
        ctx.object.metadata.set_internal(internal::SCHEMA_NAME, name);
        Ok(StageEffect::NONE)
    }
}
