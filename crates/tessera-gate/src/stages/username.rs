use tessera_schema::{pointer, AuthKind};
use tessera_types::internal;

use crate::error::{GateError, GateResult};
use crate::stage::{FieldStage, StageContext, StageEffect};
use crate::stages::text_of;

/// Reserved for the built-in administrator.
const RESERVED_USERNAME: &str = "admin";

/// Claims the `auth:username` field for this object.
///
/// Usernames are unique ignoring case. The claimed value is recorded as
/// `internalMetadata.username`; removing the field releases the claim.
pub struct UsernameStage;

impl FieldStage for UsernameStage {
    fn name(&self) -> &str {
        "username"
    }

    fn apply(&self, ctx: &mut StageContext<'_>) -> GateResult<StageEffect> {
        let previous = ctx
            .object
            .metadata
            .internal_str(internal::USERNAME)
            .map(str::to_string);

        let claimed = ctx
            .pointers
            .first_auth_pointer(AuthKind::Username)
            .and_then(|ptr| pointer::get(ctx.json, ptr).map(|v| (ptr, text_of(v))));

        let Some((ptr, username)) = claimed else {
            let removed = ctx.object.metadata.remove_internal(internal::USERNAME);
            return Ok(StageEffect::auth(removed));
        };

        let taken = username.eq_ignore_ascii_case(RESERVED_USERNAME)
            || ctx
                .lookups
                .username_holders(&username)?
                .iter()
                .any(|holder| *holder != ctx.object.id);
        if taken {
            return Err(GateError::invalid_at(
                ptr,
                format!("Username {username} is not unique."),
            ));
        }

        let changed = previous.as_deref() != Some(username.as_str());
        ctx.object.metadata.set_internal(internal::USERNAME, username);
        Ok(StageEffect::auth(changed))
    }
}
