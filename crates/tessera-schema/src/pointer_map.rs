use std::collections::BTreeMap;

use serde_json::Value;

use crate::annotation::{Annotation, AuthKind};

/// The annotated sub-schema governing one document location.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaNode {
    pub annotations: Vec<Annotation>,
    pub schema: Value,
}

/// Map from document JSON pointer to its annotated sub-schema.
///
/// Produced once per validation pass; every later consumer asks it "where
/// are the fields that mean X" instead of re-walking the document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointerMap {
    entries: BTreeMap<String, SchemaNode>,
}

impl PointerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `annotations` at `pointer`, merging with anything already there.
    pub fn record(&mut self, pointer: &str, annotations: Vec<Annotation>, schema: &Value) {
        match self.entries.get_mut(pointer) {
            Some(node) => {
                for annotation in annotations {
                    if !node.annotations.contains(&annotation) {
                        node.annotations.push(annotation);
                    }
                }
            }
            None => {
                self.entries.insert(
                    pointer.to_string(),
                    SchemaNode {
                        annotations,
                        schema: schema.clone(),
                    },
                );
            }
        }
    }

    pub fn merge(&mut self, other: PointerMap) {
        for (pointer, node) in other.entries {
            self.record(&pointer, node.annotations, &node.schema);
        }
    }

    pub fn get(&self, pointer: &str) -> Option<&SchemaNode> {
        self.entries.get(pointer)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        self.entries.iter().map(|(p, n)| (p.as_str(), n))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every `(pointer, annotation)` pair matching `pred`, in pointer order.
    pub fn find<'a, F>(&'a self, pred: F) -> Vec<(&'a str, &'a Annotation)>
    where
        F: Fn(&Annotation) -> bool,
    {
        self.entries
            .iter()
            .flat_map(|(p, n)| n.annotations.iter().map(move |a| (p.as_str(), a)))
            .filter(|(_, a)| pred(a))
            .collect()
    }

    /// Pointers tagged with the given `auth` kind.
    pub fn auth_pointers(&self, kind: AuthKind) -> Vec<(&str, &Annotation)> {
        self.find(|a| a.auth_kind() == Some(kind))
    }

    /// First pointer tagged with the given `auth` kind.
    pub fn first_auth_pointer(&self, kind: AuthKind) -> Option<&str> {
        self.auth_pointers(kind).first().map(|(p, _)| *p)
    }

    /// Whether any location is tagged with an annotation matching `pred`.
    pub fn any(&self, pred: impl Fn(&Annotation) -> bool) -> bool {
        self.entries
            .values()
            .any(|n| n.annotations.iter().any(&pred))
    }
}
