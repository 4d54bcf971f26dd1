use tessera_schema::PointerMap;
use tessera_types::DigitalObject;

use crate::error::IndexResult;
use crate::query::Query;

/// Search index over stored objects.
///
/// The index is always a derived view: writing the same object twice, or
/// deleting an absent id, must be harmless.
pub trait Indexer: Send + Sync {
    /// Insert or replace the entry for `object`.
    ///
    /// `member_id` identifies the cluster member doing the work, so payload
    /// indexing left unfinished by a departed member can be found later.
    fn index_object(
        &self,
        member_id: &str,
        object: &DigitalObject,
        index_payloads: bool,
        pointers: &PointerMap,
    ) -> IndexResult<()>;

    /// Remove the entry for `id`, if any.
    fn delete_object(&self, id: &str) -> IndexResult<()>;

    /// Matching objects, ordered by id.
    fn search(&self, query: &Query) -> IndexResult<Vec<DigitalObject>>;

    /// Ids of matching objects, ordered.
    fn search_handles(&self, query: &Query) -> IndexResult<Vec<String>>;

    /// Barrier: after this returns, searches observe all completed writes.
    fn ensure_up_to_date(&self) -> IndexResult<()>;
}
