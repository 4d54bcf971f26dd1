use std::collections::HashMap;

use tessera_gate::{FieldLookups, GateError, GateResult};
use tessera_index::{fields, Query};

use super::Repository;

/// The repository as seen by field stages.
pub(super) struct RepoLookups<'a> {
    repo: &'a Repository,
}

impl<'a> RepoLookups<'a> {
    pub(super) fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }
}

fn lookup_failed(e: impl std::fmt::Display) -> GateError {
    GateError::Lookup(e.to_string())
}

impl FieldLookups for RepoLookups<'_> {
    fn username_holders(&self, username: &str) -> GateResult<Vec<String>> {
        self.repo.index.ensure_up_to_date().map_err(lookup_failed)?;
        let query = Query::term_ignore_case(fields::USERNAME, username)
            .and(Query::term(fields::IS_VERSION, "false"));
        self.repo.index.search_handles(&query).map_err(lookup_failed)
    }

    fn schema_id_for_name(&self, name: &str) -> GateResult<Option<String>> {
        Ok(self.repo.design.load().schema_id_for_name(name).map(str::to_string))
    }

    fn object_types(&self, ids: &[String]) -> GateResult<HashMap<String, String>> {
        let objects = self.repo.storage.get_many(ids).map_err(lookup_failed)?;
        Ok(objects.into_iter().map(|o| (o.id, o.object_type)).collect())
    }
}
