//! Built-in field stages, in pipeline order.

pub mod auto_fields;
pub mod password;
pub mod property_order;
pub mod schema_name;
pub mod secure_properties;
pub mod username;
pub mod users_list;

pub use auto_fields::AutoFieldStage;
pub use password::PasswordStage;
pub use property_order::PropertyOrderStage;
pub use schema_name::SchemaNameStage;
pub use secure_properties::SecurePropertyStage;
pub use username::UsernameStage;
pub use users_list::UsersListStage;

use serde_json::Value;

/// Text form of a scalar field: strings as-is, other values as JSON.
pub(crate) fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
