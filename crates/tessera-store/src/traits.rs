use bytes::Bytes;
use tessera_types::DigitalObject;

use crate::error::{StoreError, StoreResult};

/// Durable object storage.
///
/// Implementations must be safe to share across request threads. The
/// repository serializes mutations per id with its own name locks, so a
/// backend only needs per-call atomicity.
pub trait Storage: Send + Sync {
    /// Read an object. Returns `Ok(None)` if it does not exist.
    fn get(&self, id: &str) -> StoreResult<Option<DigitalObject>>;

    /// Read several objects in one round trip, skipping missing ids.
    ///
    /// Default implementation calls `get()` for each id. Backends may
    /// override for fewer round trips.
    fn get_many(&self, ids: &[String]) -> StoreResult<Vec<DigitalObject>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(obj) = self.get(id)? {
                found.push(obj);
            }
        }
        Ok(found)
    }

    /// Store a new object, making its pending payloads durable.
    fn create(&self, object: DigitalObject) -> StoreResult<DigitalObject>;

    /// Replace an existing object. Pending payloads are stored, payloads no
    /// longer listed are dropped.
    fn update(&self, object: DigitalObject) -> StoreResult<DigitalObject>;

    /// Remove an object and all of its payload bytes.
    fn delete(&self, id: &str) -> StoreResult<()>;

    /// Full bytes of a payload, or `None` if the object or payload is absent.
    fn get_payload(&self, id: &str, name: &str) -> StoreResult<Option<Bytes>>;

    /// Inclusive byte range of a payload.
    ///
    /// `start = None` with `end = Some(n)` returns the last `n` bytes;
    /// `start = Some(s)` with `end = None` returns everything from `s`.
    fn get_payload_range(
        &self,
        id: &str,
        name: &str,
        start: Option<u64>,
        end: Option<u64>,
    ) -> StoreResult<Option<Bytes>> {
        let Some(data) = self.get_payload(id, name)? else {
            return Ok(None);
        };
        let (from, to) = resolve_range(data.len() as u64, start, end).map_err(|reason| {
            StoreError::InvalidRange {
                id: id.to_string(),
                payload: name.to_string(),
                reason,
            }
        })?;
        Ok(Some(data.slice(from as usize..to as usize)))
    }

    /// Whether an object exists.
    fn exists(&self, id: &str) -> StoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Every stored id, for full reindex and resync.
    fn list_ids(&self) -> StoreResult<Vec<String>>;
}

/// Convert an inclusive `(start, end)` request into a half-open slice range.
pub fn resolve_range(len: u64, start: Option<u64>, end: Option<u64>) -> Result<(u64, u64), String> {
    let (from, to) = match (start, end) {
        (None, None) => (0, len),
        (Some(s), None) => (s, len),
        (None, Some(suffix)) => (len.saturating_sub(suffix), len),
        (Some(s), Some(e)) => {
            if s > e {
                return Err(format!("start {s} is after end {e}"));
            }
            (s, e.saturating_add(1).min(len))
        }
    };
    if from > len || (from == len && len > 0 && start.is_some()) {
        return Err(format!("start {from} is beyond payload size {len}"));
    }
    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_resolution() {
        assert_eq!(resolve_range(10, None, None), Ok((0, 10)));
        assert_eq!(resolve_range(10, Some(2), Some(4)), Ok((2, 5)));
        assert_eq!(resolve_range(10, Some(2), Some(100)), Ok((2, 10)));
        assert_eq!(resolve_range(10, Some(7), None), Ok((7, 10)));
        assert_eq!(resolve_range(10, None, Some(3)), Ok((7, 10)));
        assert_eq!(resolve_range(10, None, Some(30)), Ok((0, 10)));
        assert_eq!(resolve_range(10, Some(2), Some(u64::MAX)), Ok((2, 10)));
    }

    #[test]
    fn invalid_ranges() {
        assert!(resolve_range(10, Some(5), Some(4)).is_err());
        assert!(resolve_range(10, Some(10), None).is_err());
        assert!(resolve_range(10, Some(11), Some(12)).is_err());
    }
}
