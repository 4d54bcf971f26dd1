use crate::document::IndexDocument;

/// A structured search over indexed fields.
///
/// Field names are those produced by [`IndexDocument::build`]: system
/// fields such as `type` or `versionOf`, and JSON pointers (`/name`) for
/// content leaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    /// Every document.
    All,
    /// Field has exactly this value.
    Term { field: String, value: String },
    /// Field has this value, ignoring ASCII case.
    TermIgnoreCase { field: String, value: String },
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn term_ignore_case(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::TermIgnoreCase {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn and(self, other: Query) -> Self {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluate against one document.
    pub fn matches(&self, doc: &IndexDocument) -> bool {
        match self {
            Self::All => true,
            Self::Term { field, value } => doc.values(field).iter().any(|v| v == value),
            Self::TermIgnoreCase { field, value } => doc
                .values(field)
                .iter()
                .any(|v| v.eq_ignore_ascii_case(value)),
            Self::And(parts) => parts.iter().all(|q| q.matches(doc)),
            Self::Or(parts) => parts.iter().any(|q| q.matches(doc)),
            Self::Not(inner) => !inner.matches(doc),
        }
    }
}
