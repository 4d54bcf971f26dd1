use serde_json::Value;
use tessera_schema::{pointer, Annotation, AuthKind};
use tessera_types::internal;

use crate::error::GateResult;
use crate::stage::{FieldStage, StageContext, StageEffect};
use crate::stages::text_of;

/// Flattens `auth:usersList` arrays into `internalMetadata.users`.
///
/// Each member reference is prefixed per the annotation and followed by a
/// newline. Without a users-list field the attribute is removed.
pub struct UsersListStage;

impl FieldStage for UsersListStage {
    fn name(&self) -> &str {
        "users_list"
    }

    fn apply(&self, ctx: &mut StageContext<'_>) -> GateResult<StageEffect> {
        let previous = ctx
            .object
            .metadata
            .internal_str(internal::USERS)
            .map(str::to_string);
        let minting_prefix = ctx.settings.minting_prefix();

        let mut joined: Option<String> = None;
        for (ptr, annotation) in ctx.pointers.auth_pointers(AuthKind::UsersList) {
            let Annotation::Auth { prefixing, .. } = annotation else {
                continue;
            };
            let Some(list) = pointer::get(ctx.json, ptr) else {
                continue;
            };
            // Later lists replace earlier ones.
            let mut users = String::new();
            if let Value::Array(items) = list {
                for item in items {
                    users.push_str(&prefixing.apply(&text_of(item), minting_prefix));
                    users.push('\n');
                }
            }
            joined = Some(users);
        }

        let changed = joined != previous;
        match joined {
            Some(users) => ctx.object.metadata.set_internal(internal::USERS, users),
            None => {
                ctx.object.metadata.remove_internal(internal::USERS);
            }
        }
        Ok(StageEffect::auth(changed))
    }
}
