use serde_json::Value;
use tessera_types::{AccessControlList, DigitalObject, Payload};

use crate::error::RepoResult;

/// Requested change to one object, as seen by lifecycle hooks.
///
/// For a create, `id` is the caller-supplied id (if any) and `object_type`
/// and `content` are required. For an update, unset fields keep their
/// current values.
#[derive(Clone, Debug, Default)]
pub struct ObjectDelta {
    pub id: Option<String>,
    pub object_type: Option<String>,
    pub content: Option<Value>,
    pub acl: Option<AccessControlList>,
    pub user_metadata: Option<Value>,
    pub payloads: Vec<Payload>,
    pub payloads_to_delete: Vec<String>,
}

impl ObjectDelta {
    /// A new object of `object_type`.
    pub fn create(object_type: impl Into<String>, content: Value) -> Self {
        Self {
            object_type: Some(object_type.into()),
            content: Some(content),
            ..Default::default()
        }
    }

    /// A change to the existing object `id`.
    pub fn update(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_acl(mut self, acl: AccessControlList) -> Self {
        self.acl = Some(acl);
        self
    }

    pub fn with_user_metadata(mut self, user_metadata: Value) -> Self {
        self.user_metadata = Some(user_metadata);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payloads.push(payload);
        self
    }

    pub fn deleting_payload(mut self, name: impl Into<String>) -> Self {
        self.payloads_to_delete.push(name.into());
        self
    }
}

/// Who is acting, on what.
#[derive(Clone, Copy, Debug)]
pub struct HookContext<'a> {
    pub object_id: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub is_new: bool,
}

/// Id proposed by a [`LifecycleHooks::generate_id`] hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedId {
    pub id: String,
    /// The hook may be asked again when the id is taken. Otherwise a taken
    /// id is a conflict.
    pub loopable: bool,
}

/// User-supplied lifecycle hooks. Every method defaults to a no-op.
pub trait LifecycleHooks: Send + Sync {
    /// Rewrite or reject a change before schema validation.
    fn before_schema_validation(
        &self,
        _existing: Option<&DigitalObject>,
        delta: ObjectDelta,
        _ctx: &HookContext<'_>,
    ) -> RepoResult<ObjectDelta> {
        Ok(delta)
    }

    /// Veto a delete by returning an error.
    fn before_delete(&self, _object: &DigitalObject, _ctx: &HookContext<'_>) -> RepoResult<()> {
        Ok(())
    }

    /// Enrich an object on its way out to a reader.
    fn on_object_resolution(&self, object: DigitalObject, _ctx: &HookContext<'_>) -> RepoResult<DigitalObject> {
        Ok(object)
    }

    fn generate_id(&self, _delta: &ObjectDelta, _ctx: &HookContext<'_>) -> RepoResult<Option<GeneratedId>> {
        Ok(None)
    }

    /// Extra values for the object's name-resolution record.
    fn generate_handle_values(&self, _object: &DigitalObject) -> RepoResult<Vec<Value>> {
        Ok(Vec::new())
    }

    /// Compiled script modules changed somewhere in the cluster.
    fn clear_script_cache(&self) {}
}

/// Hooks that change nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpHooks;

impl LifecycleHooks for NoOpHooks {}
