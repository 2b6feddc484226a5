//! Schema container
//!
//! A [`Schema`] holds named field templates in declaration order. Each
//! [`Document`] gets its own clones of those templates and parses them one
//! after another, so a field's hooks can read the values of the fields
//! declared before it.

use std::collections::HashSet;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, trace};

use crate::error::{Error, Position, Result};
use crate::fields::{Access, Definitions, Field, Key};
use crate::tree::Tree;
use crate::value::Value;

/// Hands out declaration positions
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    next: u64,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `field` with the next declaration position
    pub fn declare<'t>(&mut self, mut field: Field<'t>) -> Field<'t> {
        field.set_declaration_order(self.next);
        self.next += 1;
        field
    }
}

/// Collects named fields, declaring each one as it is added
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    declarations: Declarations,
    fields: Vec<(String, Field<'static>)>,
}

impl SchemaBuilder {
    pub fn field(mut self, name: impl Into<String>, field: Field<'static>) -> Self {
        let field = self.declarations.declare(field);
        self.fields.push((name.into(), field));
        self
    }

    pub fn build(self) -> Result<Schema> {
        Schema::new(self.fields)
    }
}

/// Named field templates in parse order
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, Field<'static>)>,
}

impl Schema {
    /// Order `entries` by declaration position; fields never declared keep
    /// their relative position after the declared ones
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Field<'static>)>,
        S: Into<String>,
    {
        let mut fields: Vec<(String, Field<'static>)> = entries
            .into_iter()
            .map(|(name, field)| (name.into(), field))
            .collect();

        let mut seen = HashSet::new();
        for (name, _) in &fields {
            if !seen.insert(name.as_str()) {
                return Err(Error::Config(format!("field \"{}\" declared twice", name)));
            }
        }

        fields.sort_by_key(|(_, field)| field.declaration_order().unwrap_or(u64::MAX));
        Ok(Self { fields })
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Field names in parse order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A fresh, unparsed document
    pub fn document<'t>(&self) -> Document<'t> {
        Document {
            tree: None,
            fields: self.fields.clone(),
        }
    }

    /// Parse `tree` into a fresh document
    pub fn parse<'t>(&self, tree: &'t Tree) -> Result<Document<'t>> {
        let mut document = self.document();
        document.parse(tree)?;
        Ok(document)
    }
}

impl Definitions<'static> for Schema {
    fn definition(&self, name: &str) -> Result<&Field<'static>> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, field)| field)
            .ok_or_else(|| Error::NoSuchSubfield {
                container: "schema".to_string(),
                name: name.to_string(),
            })
    }

    fn definition_mut(&mut self, name: &str) -> Result<&mut Field<'static>> {
        self.fields
            .iter_mut()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, field)| field)
            .ok_or_else(|| Error::NoSuchSubfield {
                container: "schema".to_string(),
                name: name.to_string(),
            })
    }
}

/// Read-only view of a document's top-level fields, handed to hooks
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentView<'a, 't> {
    fields: &'a [(String, Field<'t>)],
}

impl<'a, 't> DocumentView<'a, 't> {
    pub(crate) fn new(fields: &'a [(String, Field<'t>)]) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&'a Field<'t>> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, field)| field)
    }

    pub fn value(&self, name: &str) -> Option<&'a Value<'t>> {
        self.field(name).map(Field::value)
    }

    pub fn names(&self) -> Vec<&'a str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Per-parse instance of a schema
#[derive(Debug, Clone)]
pub struct Document<'t> {
    tree: Option<&'t Tree>,
    fields: Vec<(String, Field<'t>)>,
}

impl<'t> Document<'t> {
    /// Parse every auto-parse field in order; the first failure aborts
    pub fn parse(&mut self, tree: &'t Tree) -> Result<()> {
        self.tree = Some(tree);

        for index in 0..self.fields.len() {
            let (earlier, rest) = self.fields.split_at_mut(index);
            let (name, field) = &mut rest[0];

            if !field.is_auto_parse() {
                trace!(field = %name, "skipping on-demand field");
                continue;
            }

            debug!(field = %name, kind = %field.kind(), "parsing field");
            let parsed = field.parse(tree, None, DocumentView::new(earlier)).map(|_| ());
            parsed.map_err(|e| field.child_error(Position::Name(name.clone()), e))?;
        }
        Ok(())
    }

    /// Parse one field, typically an on-demand one, against the tree of the
    /// last [`parse`](Self::parse)
    pub fn parse_field(&mut self, name: &str) -> Result<&Value<'t>> {
        let tree = self
            .tree
            .ok_or_else(|| Error::Config("document has not been parsed".to_string()))?;
        let index = self
            .fields
            .iter()
            .position(|(field_name, _)| field_name == name)
            .ok_or_else(|| Error::NoSuchKey {
                container: "document".to_string(),
                key: name.to_string(),
            })?;

        debug!(field = name, "parsing field on demand");
        let (earlier, rest) = self.fields.split_at_mut(index);
        rest[0].1.parse(tree, None, DocumentView::new(earlier))
    }

    /// Tree of the last parse
    pub fn tree(&self) -> Option<&'t Tree> {
        self.tree
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Field values as a JSON object
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn position(&self, key: Key<'_>) -> Option<usize> {
        match key {
            Key::Name(name) => self.fields.iter().position(|(field_name, _)| field_name == name),
            Key::Index(index) => (index < self.fields.len()).then_some(index),
        }
    }

    fn missing(&self, key: Key<'_>) -> Error {
        match key {
            Key::Name(name) => Error::NoSuchKey {
                container: "document".to_string(),
                key: name.to_string(),
            },
            Key::Index(index) => Error::NoSuchIndex {
                container: "document".to_string(),
                index,
            },
        }
    }
}

impl<'t> Access<'t> for Document<'t> {
    fn field<'k>(&self, key: impl Into<Key<'k>>) -> Result<&Field<'t>> {
        let key = key.into();
        match self.position(key) {
            Some(index) => Ok(&self.fields[index].1),
            None => Err(self.missing(key)),
        }
    }

    fn field_mut<'k>(&mut self, key: impl Into<Key<'k>>) -> Result<&mut Field<'t>> {
        let key = key.into();
        match self.position(key) {
            Some(index) => Ok(&mut self.fields[index].1),
            None => Err(self.missing(key)),
        }
    }

    fn len(&self) -> usize {
        self.fields.len()
    }
}

impl Serialize for Document<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, field) in &self.fields {
            map.serialize_entry(name, field.value())?;
        }
        map.end()
    }
}
