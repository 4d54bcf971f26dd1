use tessera_gate::stages::auto_fields::ANONYMOUS;
use tessera_index::{fields, Query};
use tessera_types::{validate_handle, DigitalObject, Payload, PayloadSource, Timestamp};
use tracing::info;

use super::mutate::validate_content;
use super::{Repository, WriteOptions};
use crate::error::{RepoError, RepoResult};

impl Repository {
    /// Freeze a copy of tip `id` as a new immutable version.
    ///
    /// A given `version_id` must be free; otherwise one is minted. With
    /// `clone_payloads` the version gets its own copy of every payload,
    /// otherwise it has none.
    ///
    /// Locks the tip first and the version id second, so the copy sees a
    /// single state of the tip.
    pub fn publish_version(
        &self,
        id: &str,
        version_id: Option<&str>,
        clone_payloads: bool,
        options: &WriteOptions<'_>,
    ) -> RepoResult<DigitalObject> {
        self.check_writable()?;
        if version_id == Some(id) {
            return Err(RepoError::Conflict(format!("Object already exists: {id}")));
        }
        let _source_guard = self.locker.acquire(id)?;
        let source = self.load(id)?;
        if !source.is_tip() || source.metadata.is_version {
            return Err(RepoError::Version(format!("{id} is itself a version and cannot be published")));
        }

        let design = self.design.load();
        let entry = design
            .schema(&source.object_type)
            .ok_or_else(|| RepoError::invalid(format!("Unknown type {}", source.object_type)))?;
        let (version_id, _guard) = match version_id {
            Some(requested) => {
                validate_handle(requested)?;
                match self.lock_if_free(requested)? {
                    Some(guard) => (requested.to_string(), guard),
                    None => return Err(RepoError::Conflict(format!("Object already exists: {requested}"))),
                }
            }
            None => loop {
                let candidate = self.minter.mint_by_timestamp(design.minting_prefix());
                if candidate == id {
                    continue;
                }
                if let Some(guard) = self.lock_if_free(&candidate)? {
                    break (candidate, guard);
                }
            },
        };

        let payloads = if clone_payloads {
            self.copy_payloads(&source)?
        } else {
            Vec::new()
        };
        let mut version = source;
        version.id = version_id;
        version.payloads = payloads;
        let md = &mut version.metadata;
        md.version_of = Some(id.to_string());
        md.is_version = true;
        md.published_by = Some(options.user_id.unwrap_or(ANONYMOUS).to_string());
        md.published_on = Some(Timestamp::now());
        md.hashes = None;
        md.txn_id = None;

        let pointers = validate_content(entry, &version.content)?;
        let stored = self.write_object(version, true, entry, &pointers)?;
        info!(object_id = %id, version_id = %stored.id, "published version");
        self.mirror_to_name_resolver(&stored, true);
        Ok(stored)
    }

    fn copy_payloads(&self, source: &DigitalObject) -> RepoResult<Vec<Payload>> {
        source
            .payloads
            .iter()
            .map(|payload| {
                let data = self.storage.get_payload(&source.id, &payload.name)?.ok_or_else(|| {
                    RepoError::Internal(format!("missing bytes for payload {} of {}", payload.name, source.id))
                })?;
                Ok(Payload {
                    source: PayloadSource::Pending(data),
                    ..payload.clone()
                })
            })
            .collect()
    }

    /// Every version of the object `id` belongs to, oldest first, then the
    /// tip. `id` may name the tip or any of its versions. Versions the
    /// caller cannot read are left out.
    pub fn list_versions(
        &self,
        id: &str,
        can_read: impl Fn(&DigitalObject) -> bool,
    ) -> RepoResult<Vec<DigitalObject>> {
        let object = self.load(id)?;
        let (tip_id, tip) = match object.metadata.version_of.clone() {
            Some(tip_id) => {
                let tip = self.storage.get(&tip_id)?;
                (tip_id, tip)
            }
            None => (object.id.clone(), Some(object)),
        };
        self.index.ensure_up_to_date()?;
        let mut versions: Vec<DigitalObject> = self
            .index
            .search(&Query::term(fields::VERSION_OF, tip_id.as_str()))?
            .into_iter()
            .filter(|v| can_read(v))
            .collect();
        versions.sort_by_key(|v| v.metadata.published_on);
        versions.extend(tip);
        Ok(versions)
    }
}
