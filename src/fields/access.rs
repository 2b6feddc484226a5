//! Reading parsed composites
//!
//! Three axes reach into a composite field:
//! - [`Access::get`] returns the value of a child
//! - [`Access::field`] returns the child field instance itself (the clone
//!   created for the last parse)
//! - [`Definitions::definition`] returns the declared template, the place to
//!   attach hooks before parsing

use std::fmt;

use indexmap::IndexMap;

use super::{Children, Field, Kind};
use crate::error::{Error, Result};
use crate::value::Value;

/// Child address: a name (structured/dict) or a position (list, or
/// declaration/insertion order of a mapping)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key<'k> {
    Name(&'k str),
    Index(usize),
}

impl<'k> From<&'k str> for Key<'k> {
    fn from(name: &'k str) -> Self {
        Key::Name(name)
    }
}

impl<'k> From<&'k String> for Key<'k> {
    fn from(name: &'k String) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key<'_> {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Value and field axes over parsed children
pub trait Access<'t> {
    /// Child field instance under `key`
    fn field<'k>(&self, key: impl Into<Key<'k>>) -> Result<&Field<'t>>;

    fn field_mut<'k>(&mut self, key: impl Into<Key<'k>>) -> Result<&mut Field<'t>>;

    /// Value of the child under `key`
    fn get<'k>(&self, key: impl Into<Key<'k>>) -> Result<&Value<'t>> {
        self.field(key).map(Field::value)
    }

    /// Number of children
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Definition axis over declared templates
pub trait Definitions<'t> {
    fn definition(&self, name: &str) -> Result<&Field<'t>>;

    fn definition_mut(&mut self, name: &str) -> Result<&mut Field<'t>>;
}

impl<'t> Field<'t> {
    /// Short description used in access errors, e.g. `list field "li"`
    fn container(&self) -> String {
        format!("{} field \"{}\"", self.kind(), self.origin())
    }

    fn missing_child(&self, key: Key<'_>) -> Error {
        match key {
            Key::Name(name) => Error::NoSuchKey {
                container: self.container(),
                key: name.to_string(),
            },
            Key::Index(index) => Error::NoSuchIndex {
                container: self.container(),
                index,
            },
        }
    }

    fn structure(&self) -> Option<&IndexMap<String, Field<'t>>> {
        match &self.kind {
            Kind::Structured { structure } => Some(structure),
            Kind::List { item } | Kind::Dict { item, .. } => item.structure(),
            _ => None,
        }
    }

    fn structure_mut(&mut self) -> Option<&mut IndexMap<String, Field<'t>>> {
        match &mut self.kind {
            Kind::Structured { structure } => Some(structure),
            Kind::List { item } | Kind::Dict { item, .. } => item.structure_mut(),
            _ => None,
        }
    }
}

/// List children accept numeric names so that `/`-paths can index them
fn item_index(key: Key<'_>) -> Option<usize> {
    match key {
        Key::Index(index) => Some(index),
        Key::Name(name) => name.parse().ok(),
    }
}

impl<'t> Access<'t> for Field<'t> {
    fn field<'k>(&self, key: impl Into<Key<'k>>) -> Result<&Field<'t>> {
        let key = key.into();
        let found = match (&self.children, key) {
            (Children::Map(map), Key::Name(name)) => map.get(name),
            (Children::Map(map), Key::Index(index)) => map.get_index(index).map(|(_, field)| field),
            (Children::Items(items), key) => item_index(key).and_then(|index| items.get(index)),
            (Children::None, _) if !self.is_composite() => {
                return Err(Error::NotAContainer {
                    container: self.container(),
                })
            }
            (Children::None, _) => None,
        };
        found.ok_or_else(|| self.missing_child(key))
    }

    fn field_mut<'k>(&mut self, key: impl Into<Key<'k>>) -> Result<&mut Field<'t>> {
        let key = key.into();
        if matches!(self.children, Children::None) && !self.is_composite() {
            return Err(Error::NotAContainer {
                container: self.container(),
            });
        }

        let error = self.missing_child(key);
        let found = match (&mut self.children, key) {
            (Children::Map(map), Key::Name(name)) => map.get_mut(name),
            (Children::Map(map), Key::Index(index)) => {
                map.get_index_mut(index).map(|(_, field)| field)
            }
            (Children::Items(items), key) => item_index(key).and_then(|index| items.get_mut(index)),
            (Children::None, _) => None,
        };
        found.ok_or(error)
    }

    fn len(&self) -> usize {
        match &self.children {
            Children::None => 0,
            Children::Map(map) => map.len(),
            Children::Items(items) => items.len(),
        }
    }
}

impl<'t> Definitions<'t> for Field<'t> {
    fn definition(&self, name: &str) -> Result<&Field<'t>> {
        self.structure()
            .and_then(|structure| structure.get(name))
            .ok_or_else(|| Error::NoSuchSubfield {
                container: self.container(),
                name: name.to_string(),
            })
    }

    fn definition_mut(&mut self, name: &str) -> Result<&mut Field<'t>> {
        let container = self.container();
        self.structure_mut()
            .and_then(|structure| structure.get_mut(name))
            .ok_or_else(|| Error::NoSuchSubfield {
                container,
                name: name.to_string(),
            })
    }
}
