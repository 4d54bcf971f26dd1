use bytes::Bytes;
use serde_json::Value;
use tessera_schema::Annotation;

use super::Repository;
use crate::error::{RepoError, RepoResult};

fn missing_payload(id: &str, name: &str) -> RepoError {
    RepoError::NotFound(format!("{id} has no payload {name}"))
}

impl Repository {
    pub fn get_payload(&self, id: &str, name: &str) -> RepoResult<Bytes> {
        self.storage
            .get_payload(id, name)?
            .ok_or_else(|| missing_payload(id, name))
    }

    /// Bytes `start..=end` of a payload. A missing `start` with an `end`
    /// reads the last `end` bytes.
    pub fn get_payload_range(&self, id: &str, name: &str, start: Option<u64>, end: Option<u64>) -> RepoResult<Bytes> {
        self.storage
            .get_payload_range(id, name, start, end)?
            .ok_or_else(|| missing_payload(id, name))
    }

    /// Media type declared by the schema for the field at `pointer`.
    pub fn media_type_at(&self, object_type: &str, content: &Value, pointer: &str) -> RepoResult<Option<String>> {
        let design = self.design.load();
        let entry = design
            .schema(object_type)
            .ok_or_else(|| RepoError::NotFound(format!("Unknown type {object_type}")))?;
        let pointers = entry.validator.validate(content).pointers;
        Ok(pointers.get(pointer).and_then(|node| {
            node.annotations.iter().find_map(|a| match a {
                Annotation::ResponseMediaType(media_type) => Some(media_type.clone()),
                _ => None,
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::ObjectDelta;
    use crate::repository::testing::*;
    use crate::repository::WriteOptions;
    use serde_json::json;
    use tessera_types::Payload;

    #[test]
    fn ranges_are_inclusive_and_checked() {
        let repo = repo();
        define_schema(&repo, "Doc", json!({"type": "object"}));
        let doc = repo
            .create(
                ObjectDelta::create("Doc", json!({})).with_payload(Payload::pending("p", b"0123456789".to_vec())),
                &WriteOptions::anonymous(),
            )
            .unwrap();
        assert_eq!(repo.get_payload_range(&doc.id, "p", Some(2), Some(4)).unwrap().as_ref(), b"234");
        assert_eq!(repo.get_payload_range(&doc.id, "p", None, Some(3)).unwrap().as_ref(), b"789");
        assert_eq!(
            repo.get_payload_range(&doc.id, "p", Some(2), Some(u64::MAX)).unwrap().as_ref(),
            b"23456789"
        );
        assert!(matches!(
            repo.get_payload_range(&doc.id, "p", Some(5), Some(4)),
            Err(RepoError::BadRequest(_))
        ));
        assert!(matches!(
            repo.get_payload_range(&doc.id, "p", Some(10), None),
            Err(RepoError::BadRequest(_))
        ));
        assert!(matches!(repo.get_payload(&doc.id, "q"), Err(RepoError::NotFound(_))));
    }

    #[test]
    fn media_type_comes_from_the_schema() {
        let repo = repo();
        define_schema(
            &repo,
            "Page",
            json!({
                "type": "object",
                "properties": {
                    "body": {"type": "string", "cordra": {"response": {"mediaType": "text/html"}}},
                    "title": {"type": "string"}
                }
            }),
        );
        let content = json!({"body": "<p>hi</p>", "title": "t"});
        assert_eq!(
            repo.media_type_at("Page", &content, "/body").unwrap().as_deref(),
            Some("text/html")
        );
        assert_eq!(repo.media_type_at("Page", &content, "/title").unwrap(), None);
        assert!(repo.media_type_at("Nope", &content, "/body").is_err());
    }
}
