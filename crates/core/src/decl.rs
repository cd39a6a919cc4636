//! Declaration trees: the untyped, ordered key/value input of the composer.
//!
//! A [`Declaration`] is what the loader hands to the extractor for one
//! declared resource. Values keep their declaration order so that nothing
//! downstream depends on the tokenizer's map implementation.

use crate::model::ResourceKind;

// ──────────────────────────────────────────────
// Provenance
// ──────────────────────────────────────────────

/// Where a declaration came from: the file and its position in that
/// file's `resources` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub file: String,
    pub index: usize,
}

// ──────────────────────────────────────────────
// Values
// ──────────────────────────────────────────────

/// One ordered key/value entry of a nested declaration.
pub type Entry = (String, DeclValue);

#[derive(Debug, Clone, PartialEq)]
pub enum DeclValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Nested key/value sequence, in declaration order
    Map(Vec<Entry>),
    List(Vec<DeclValue>),
}

impl DeclValue {
    /// Name of the value's shape, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            DeclValue::Null => "null",
            DeclValue::Bool(_) => "bool",
            DeclValue::Int(_) => "integer",
            DeclValue::Float(_) => "float",
            DeclValue::Str(_) => "string",
            DeclValue::Map(_) => "mapping",
            DeclValue::List(_) => "list",
        }
    }

    /// Render a scalar as text. Mappings, lists and null have no scalar form.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            DeclValue::Bool(b) => Some(b.to_string()),
            DeclValue::Int(i) => Some(i.to_string()),
            DeclValue::Float(f) => Some(f.to_string()),
            DeclValue::Str(s) => Some(s.clone()),
            DeclValue::Null | DeclValue::Map(_) | DeclValue::List(_) => None,
        }
    }
}

// ──────────────────────────────────────────────
// Declarations
// ──────────────────────────────────────────────

/// One declared resource.
///
/// `kind` and `id` are consumed by the loader; `entries` holds every
/// other top-level key and is what the extractor checks against the
/// kind's closed field set.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub kind: ResourceKind,
    pub id: Option<String>,
    pub entries: Vec<Entry>,
    pub prov: Provenance,
}

impl Declaration {
    /// The raw declared `name`, when it is a scalar.
    pub fn declared_name(&self) -> Option<String> {
        self.get("name").and_then(DeclValue::scalar_text)
    }

    /// Declaration-site identifier: explicit `id`, else the raw `name`.
    pub fn identifier(&self) -> Option<String> {
        self.id.clone().or_else(|| self.declared_name())
    }

    /// A human label for diagnostics, available even for malformed input.
    pub fn label(&self) -> String {
        self.declared_name()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| format!("{}#{}", self.prov.file, self.prov.index))
    }

    pub fn get(&self, key: &str) -> Option<&DeclValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(entries: Vec<Entry>, id: Option<&str>) -> Declaration {
        Declaration {
            kind: ResourceKind::Service,
            id: id.map(str::to_owned),
            entries,
            prov: Provenance {
                file: "app.yaml".to_owned(),
                index: 3,
            },
        }
    }

    #[test]
    fn identifier_prefers_explicit_id() {
        let d = decl(
            vec![("name".to_owned(), DeclValue::Str("reviews".to_owned()))],
            Some("reviewsSvc"),
        );
        assert_eq!(d.identifier().as_deref(), Some("reviewsSvc"));
        assert_eq!(d.label(), "reviews");
    }

    #[test]
    fn label_falls_back_to_position() {
        let d = decl(Vec::new(), None);
        assert_eq!(d.identifier(), None);
        assert_eq!(d.label(), "app.yaml#3");
    }

    #[test]
    fn numeric_name_has_scalar_text() {
        let d = decl(vec![("name".to_owned(), DeclValue::Int(42))], None);
        assert_eq!(d.declared_name().as_deref(), Some("42"));
    }
}
