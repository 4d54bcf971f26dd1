use tessera_crypto::{KdfAlgorithm, SecretHash};
use tessera_gate::auth;
use tessera_types::{internal, DigitalObject, DESIGN_OBJECT_ID};
use tracing::info;

use super::{Repository, WriteOptions};
use crate::error::{RepoError, RepoResult};
use crate::hooks::ObjectDelta;

/// Username reserved for the administrator.
pub const ADMIN_USERNAME: &str = "admin";

impl Repository {
    // ---- User credentials ----

    /// Whether `password` matches the hash stored on user `user_id`. A user
    /// without a password never matches.
    pub fn check_user_password(&self, user_id: &str, password: &str) -> RepoResult<bool> {
        let Some(object) = self.storage.get(user_id)? else {
            return Ok(false);
        };
        match SecretHash::read_from(&object.metadata.internal_metadata)? {
            Some(hash) => Ok(hash.verify(password)?),
            None => Ok(false),
        }
    }

    /// Resolve a username and password to a user id. Inactive accounts
    /// never authenticate.
    pub fn authenticate(&self, username: &str, password: &str) -> RepoResult<Option<String>> {
        if username.eq_ignore_ascii_case(ADMIN_USERNAME) {
            return Ok(self
                .check_admin_password(password)?
                .then(|| ADMIN_USERNAME.to_string()));
        }
        let Some(user_id) = self.id_for_username(username)? else {
            return Ok(None);
        };
        if !self.is_user_account_active(&user_id)? {
            return Ok(None);
        }
        Ok(self.check_user_password(&user_id, password)?.then_some(user_id))
    }

    /// Check `secret` against the secure property hashed at `pointer`.
    pub fn verify_secure_property(&self, id: &str, pointer: &str, secret: &str) -> RepoResult<bool> {
        let object = self.load(id)?;
        let record = object
            .metadata
            .internal_metadata
            .get(internal::SECURE_PROPERTIES)
            .and_then(|records| records.get(pointer));
        match record.map(SecretHash::from_json).transpose()?.flatten() {
            Some(hash) => Ok(hash.verify(secret)?),
            None => Ok(false),
        }
    }

    pub fn is_user_account_active(&self, user_id: &str) -> RepoResult<bool> {
        let object = self.load(user_id)?;
        let (pointers, _) = self.pointers_for(&object);
        Ok(auth::is_account_active(&object.content, &pointers))
    }

    pub fn requires_password_change(&self, user_id: &str) -> RepoResult<bool> {
        let object = self.load(user_id)?;
        let (pointers, _) = self.pointers_for(&object);
        Ok(auth::requires_password_change(&object.content, &pointers))
    }

    pub fn set_require_password_change(
        &self,
        user_id: &str,
        value: bool,
        options: &WriteOptions<'_>,
    ) -> RepoResult<DigitalObject> {
        let object = self.load(user_id)?;
        let (pointers, _) = self.pointers_for(&object);
        let mut content = object.content;
        if !auth::set_require_password_change(&mut content, &pointers, value)? {
            return Err(RepoError::BadRequest(format!(
                "{user_id} has no requirePasswordChange field"
            )));
        }
        self.update(ObjectDelta::update(user_id).with_content(content), options)
    }

    /// Set a new password and clear any pending change requirement.
    pub fn update_password_for_user(
        &self,
        user_id: &str,
        password: &str,
        options: &WriteOptions<'_>,
    ) -> RepoResult<DigitalObject> {
        let object = self.load(user_id)?;
        let (pointers, _) = self.pointers_for(&object);
        let mut content = object.content;
        if !auth::set_password(&mut content, &pointers, password)? {
            return Err(RepoError::BadRequest(format!("{user_id} has no password field")));
        }
        auth::set_require_password_change(&mut content, &pointers, false)?;
        self.update(ObjectDelta::update(user_id).with_content(content), options)
    }

    // ---- Admin ----

    pub fn set_admin_password(&self, password: &str) -> RepoResult<()> {
        self.check_writable()?;
        if password.is_empty() {
            return Err(RepoError::BadRequest("Admin password cannot be empty".into()));
        }
        let hash = SecretHash::generate(password, self.config.hash_iterations, KdfAlgorithm::default())?;
        let _guard = self.locker.acquire(DESIGN_OBJECT_ID)?;
        let _write = self.design_locker.write()?;
        let mut object = self.load(DESIGN_OBJECT_ID)?;
        object
            .metadata
            .set_internal(internal::ADMIN_PASSWORD, hash.to_json());
        self.write_design_object(object, true)?;
        info!("admin password changed");
        Ok(())
    }

    /// `false` until an admin password has been set.
    pub fn check_admin_password(&self, password: &str) -> RepoResult<bool> {
        let object = self.load(DESIGN_OBJECT_ID)?;
        let record = object.metadata.internal_metadata.get(internal::ADMIN_PASSWORD);
        match record.map(SecretHash::from_json).transpose()?.flatten() {
            Some(hash) => Ok(hash.verify(password)?),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use crate::repository::testing::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn authenticate_checks_username_password_and_activity() {
        let repo = repo();
        define_user_and_group_schemas(&repo);
        let alice = create_user(&repo, "alice", "secret123");

        assert_eq!(repo.authenticate("Alice", "secret123").unwrap(), Some(alice.id.clone()));
        assert_eq!(repo.authenticate("alice", "wrong").unwrap(), None);
        assert_eq!(repo.authenticate("nobody", "secret123").unwrap(), None);

        repo.update(
            ObjectDelta::update(&alice.id).with_content(json!({"username": "alice", "password": "", "active": false})),
            &WriteOptions::anonymous(),
        )
        .unwrap();
        assert!(!repo.is_user_account_active(&alice.id).unwrap());
        assert_eq!(repo.authenticate("alice", "secret123").unwrap(), None);
    }

    #[test]
    fn deactivating_a_user_ends_their_sessions() {
        let sessions = Arc::new(RecordingSessions::default());
        let repo = Repository::builder(RepositoryConfig::default())
            .session_invalidator(sessions.clone())
            .build()
            .unwrap();
        define_user_and_group_schemas(&repo);
        let bob = repo
            .create(
                ObjectDelta::create("User", json!({"username": "bob", "password": "pw", "active": true})),
                &WriteOptions::anonymous(),
            )
            .unwrap();
        assert!(sessions.invalidated.lock().unwrap().is_empty());

        repo.update(
            ObjectDelta::update(&bob.id).with_content(json!({"username": "bob", "password": "", "active": false})),
            &WriteOptions::anonymous(),
        )
        .unwrap();
        assert_eq!(*sessions.invalidated.lock().unwrap(), vec![bob.id]);
    }

    #[test]
    fn secure_properties_verify_per_pointer() {
        let repo = repo();
        define_user_and_group_schemas(&repo);
        let carol = repo
            .create(
                ObjectDelta::create("User", json!({"username": "carol", "apiKey": "k-123"})),
                &WriteOptions::anonymous(),
            )
            .unwrap();
        assert_eq!(carol.content["apiKey"], "");
        assert!(repo.verify_secure_property(&carol.id, "/apiKey", "k-123").unwrap());
        assert!(!repo.verify_secure_property(&carol.id, "/apiKey", "k-999").unwrap());
        assert!(!repo.verify_secure_property(&carol.id, "/other", "k-123").unwrap());
    }

    #[test]
    fn password_change_flow() {
        let repo = repo();
        define_user_and_group_schemas(&repo);
        let dave = repo
            .create(
                ObjectDelta::create("User", json!({"username": "dave", "password": "first-pw", "mustChange": false})),
                &WriteOptions::anonymous(),
            )
            .unwrap();
        assert!(!repo.requires_password_change(&dave.id).unwrap());

        repo.set_require_password_change(&dave.id, true, &WriteOptions::anonymous())
            .unwrap();
        assert!(repo.requires_password_change(&dave.id).unwrap());
        assert!(repo.check_user_password(&dave.id, "first-pw").unwrap());

        repo.update_password_for_user(&dave.id, "second-pw", &WriteOptions::as_user(&dave.id))
            .unwrap();
        assert!(!repo.requires_password_change(&dave.id).unwrap());
        assert!(repo.check_user_password(&dave.id, "second-pw").unwrap());
        assert!(!repo.check_user_password(&dave.id, "first-pw").unwrap());
    }

    #[test]
    fn password_helpers_need_the_field() {
        let repo = repo();
        define_schema(&repo, "Doc", json!({"type": "object"}));
        let doc = repo
            .create(ObjectDelta::create("Doc", json!({})), &WriteOptions::anonymous())
            .unwrap();
        assert!(matches!(
            repo.update_password_for_user(&doc.id, "pw", &WriteOptions::anonymous()),
            Err(RepoError::BadRequest(_))
        ));
        assert!(!repo.check_user_password(&doc.id, "pw").unwrap());
    }

    #[test]
    fn admin_password() {
        let repo = repo();
        assert!(!repo.check_admin_password("anything").unwrap());
        assert!(matches!(repo.set_admin_password(""), Err(RepoError::BadRequest(_))));

        repo.set_admin_password("root-pw").unwrap();
        assert!(repo.check_admin_password("root-pw").unwrap());
        assert!(!repo.check_admin_password("nope").unwrap());
        assert_eq!(repo.authenticate("ADMIN", "root-pw").unwrap().as_deref(), Some("admin"));

        let design = repo.storage().get(DESIGN_OBJECT_ID).unwrap().unwrap();
        let record = design.metadata.internal_metadata[internal::ADMIN_PASSWORD].to_string();
        assert!(!record.contains("root-pw"));
    }
}
