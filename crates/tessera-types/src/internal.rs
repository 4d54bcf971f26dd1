//! Keys of the `internalMetadata` bag.
//!
//! The bag holds derived or secret-derived state. It never holds a raw
//! secret, only digests.

/// Hex PBKDF2 digest of the password field.
pub const HASH: &str = "hash";
/// Hex salt paired with [`HASH`].
pub const SALT: &str = "salt";
/// Iteration count used for [`HASH`], stored as a decimal string.
pub const ITERATIONS: &str = "iterations";
/// Key-derivation algorithm name used for [`HASH`].
pub const ALGORITHM: &str = "algorithm";
/// Claimed username, used for uniqueness and login lookup.
pub const USERNAME: &str = "username";
/// Newline-joined member references of a group object.
pub const USERS: &str = "users";
/// Map from JSON pointer to secret hash record.
pub const SECURE_PROPERTIES: &str = "secureProperties";
/// Declared name of a schema object.
pub const SCHEMA_NAME: &str = "schemaName";
/// Hash record of the administrator password, on the design object only.
pub const ADMIN_PASSWORD: &str = "adminPassword";
