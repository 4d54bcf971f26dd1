use serde_json::{Map, Value};

/// Extension keyword holding repository annotations in a sub-schema.
pub const KEYWORD: &str = "cordra";
/// Older extension keyword, read when [`KEYWORD`] is absent.
pub const LEGACY_KEYWORD: &str = "repository";

// ---------------------------------------------------------------------------
// Prefixing
// ---------------------------------------------------------------------------

/// How a stored value relates to a full handle.
///
/// `prepend` wins over `prepend_minting_prefix`; the minting prefix is used
/// with a trailing `/`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Prefixing {
    pub prepend: Option<String>,
    pub prepend_minting_prefix: bool,
}

impl Prefixing {
    fn from_node(node: &Map<String, Value>) -> Self {
        Self {
            prepend: node.get("prepend").and_then(Value::as_str).map(str::to_string),
            prepend_minting_prefix: node
                .get("prependHandleMintingConfigPrefix")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    /// The concrete prefix, given the repository's minting prefix.
    pub fn resolve(&self, minting_prefix: Option<&str>) -> Option<String> {
        if let Some(prepend) = &self.prepend {
            return Some(prepend.clone());
        }
        if self.prepend_minting_prefix {
            return minting_prefix.map(|p| {
                if p.ends_with('/') {
                    p.to_string()
                } else {
                    format!("{p}/")
                }
            });
        }
        None
    }

    /// Expand a stored reference to a full handle.
    pub fn apply(&self, value: &str, minting_prefix: Option<&str>) -> String {
        match self.resolve(minting_prefix) {
            Some(prefix) => format!("{prefix}{value}"),
            None => value.to_string(),
        }
    }

    /// Strip the prefix from a full handle, if it carries it.
    pub fn strip(&self, value: &str, minting_prefix: Option<&str>) -> String {
        match self.resolve(minting_prefix) {
            Some(prefix) => value.strip_prefix(prefix.as_str()).unwrap_or(value).to_string(),
            None => value.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Annotation kinds
// ---------------------------------------------------------------------------

/// The `auth` annotation's role for a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthKind {
    Username,
    Password,
    UsersList,
    AccountActive,
    RequirePasswordChange,
}

impl AuthKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "username" => Some(Self::Username),
            "password" => Some(Self::Password),
            "usersList" => Some(Self::UsersList),
            "accountActive" => Some(Self::AccountActive),
            "requirePasswordChange" => Some(Self::RequirePasswordChange),
            _ => None,
        }
    }
}

/// Value source of an auto-generated field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AutoField {
    Handle,
    CreationDate,
    ModificationDate,
    CreatedBy,
    ModifiedBy,
    Type,
    /// A name the repository does not know; rejected when processed.
    Unknown(String),
}

impl AutoField {
    pub fn parse(name: &str) -> Self {
        match name {
            "handle" => Self::Handle,
            "creationDate" | "createdOn" => Self::CreationDate,
            "modificationDate" | "modifiedOn" => Self::ModificationDate,
            "createdBy" => Self::CreatedBy,
            "modifiedBy" => Self::ModifiedBy,
            "type" => Self::Type,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// A repository annotation attached to a sub-schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Annotation {
    Auth { kind: AuthKind, prefixing: Prefixing },
    SecureProperty,
    AutoGenerated { field: AutoField, prefixing: Prefixing },
    HandleReference {
        types: Vec<String>,
        exclude_types: Vec<String>,
        prefixing: Prefixing,
    },
    PrimaryPreview,
    ResponseMediaType(String),
    /// A field naming an object whose payloads hold script modules.
    ScriptPayloadReference,
}

impl Annotation {
    pub fn auth_kind(&self) -> Option<AuthKind> {
        match self {
            Self::Auth { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// The extension object of a sub-schema, preferring [`KEYWORD`].
pub fn extension(node: &Value) -> Option<&Map<String, Value>> {
    node.get(KEYWORD)
        .and_then(Value::as_object)
        .or_else(|| node.get(LEGACY_KEYWORD).and_then(Value::as_object))
}

/// A nested property under the extension keyword, e.g. `["type", "handleReference"]`.
///
/// Falls back to the legacy keyword when the path is absent under the current one.
pub fn extension_property<'a>(node: &'a Value, path: &[&str]) -> Option<&'a Value> {
    [KEYWORD, LEGACY_KEYWORD].into_iter().find_map(|keyword| {
        path.iter()
            .try_fold(node.get(keyword)?, |current, key| current.get(*key))
    })
}

/// Whether payloads of objects governed by `schema` should be indexed.
/// Defaults to `true` unless the root says otherwise.
pub fn index_payloads(schema: &Value) -> bool {
    extension_property(schema, &["indexPayloads"])
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

/// Every annotation carried by one sub-schema node.
pub fn annotations_of(node: &Value) -> Vec<Annotation> {
    let mut found = Vec::new();
    if extension(node).is_none() {
        return found;
    }

    match extension_property(node, &["auth"]) {
        Some(Value::String(name)) => {
            if let Some(kind) = AuthKind::parse(name) {
                found.push(Annotation::Auth {
                    kind,
                    prefixing: Prefixing::default(),
                });
            }
        }
        Some(Value::Object(obj)) => {
            if let Some(kind) = obj.get("type").and_then(Value::as_str).and_then(AuthKind::parse) {
                found.push(Annotation::Auth {
                    kind,
                    prefixing: Prefixing::from_node(obj),
                });
            }
        }
        _ => {}
    }

    if extension_property(node, &["secureProperty"]).and_then(Value::as_bool) == Some(true) {
        found.push(Annotation::SecureProperty);
    }

    match extension_property(node, &["type", "autoGeneratedField"]) {
        Some(Value::String(name)) => found.push(Annotation::AutoGenerated {
            field: AutoField::parse(name),
            prefixing: Prefixing::default(),
        }),
        Some(Value::Object(obj)) => {
            if let Some(name) = obj.get("type").and_then(Value::as_str) {
                found.push(Annotation::AutoGenerated {
                    field: AutoField::parse(name),
                    prefixing: Prefixing::from_node(obj),
                });
            }
        }
        _ => {}
    }

    if let Some(Value::Object(obj)) = extension_property(node, &["type", "handleReference"]) {
        found.push(Annotation::HandleReference {
            types: string_list(obj.get("types")),
            exclude_types: string_list(obj.get("excludeTypes")),
            prefixing: Prefixing::from_node(obj),
        });
    }

    if extension_property(node, &["preview", "isPrimary"]).and_then(Value::as_bool) == Some(true) {
        found.push(Annotation::PrimaryPreview);
    }

    if let Some(media_type) = extension_property(node, &["response", "mediaType"]).and_then(Value::as_str) {
        found.push(Annotation::ResponseMediaType(media_type.to_string()));
    }

    let script_dir = extension_property(node, &["referrable", "payloads"]).and_then(Value::as_str);
    let refers_by_id = extension_property(node, &["referrable", "id"]).and_then(Value::as_bool);
    if matches!(script_dir, Some("scripts") | Some("script")) && refers_by_id == Some(true) {
        found.push(Annotation::ScriptPayloadReference);
    }

    found
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
