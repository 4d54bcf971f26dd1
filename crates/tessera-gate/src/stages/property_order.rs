use tessera_schema::reorder_properties;

use crate::error::GateResult;
use crate::stage::{FieldStage, StageContext, StageEffect};

/// Puts object keys in schema declaration order so digests are stable.
pub struct PropertyOrderStage;

impl FieldStage for PropertyOrderStage {
    fn name(&self) -> &str {
        "property_order"
    }

    fn apply(&self, ctx: &mut StageContext<'_>) -> GateResult<StageEffect> {
        Ok(StageEffect::json(reorder_properties(ctx.json, ctx.schema)))
    }
}
