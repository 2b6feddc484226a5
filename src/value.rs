//! Values produced by fields

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use scraper::ElementRef;
use serde::ser::{Serialize, Serializer};

use crate::tree::Node;

/// Format used when dates are rendered to text or JSON
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Format used when date-times are rendered to text or JSON
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A value flowing through the parse pipeline.
///
/// Node-bearing variants borrow from the parsed [`Tree`](crate::Tree), hence
/// the lifetime.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value<'t> {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Strings(Vec<String>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Element(ElementRef<'t>),
    Nodes(Vec<Node<'t>>),
    List(Vec<Value<'t>>),
    Map(IndexMap<String, Value<'t>>),
}

impl<'t> Value<'t> {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<ElementRef<'t>> {
        match self {
            Value::Element(e) => Some(*e),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value<'t>]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value<'t>>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Render a scalar as a mapping key; composites, nodes and null have none
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => Some(dt.format(DATETIME_FORMAT).to_string()),
            _ => None,
        }
    }

    /// Plain-text rendering used by converters and diagnostics
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Strings(strings) => strings.join(""),
            Value::Element(e) => Node::Element(*e).text(),
            Value::Nodes(nodes) => nodes.iter().map(Node::text).collect::<Vec<_>>().join(""),
            Value::List(items) => items.iter().map(Value::to_text).collect::<Vec<_>>().join(" "),
            Value::Map(_) => String::new(),
            scalar => scalar.as_key().unwrap_or_default(),
        }
    }

    /// JSON rendering: nodes become their HTML (elements) or text
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Build a value from JSON; objects keep their key order
    pub fn from_json(json: &serde_json::Value) -> Value<'static> {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Node<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Element(e) => serializer.serialize_str(&e.html()),
            Node::Text(text) => serializer.serialize_str(text),
        }
    }
}

impl Serialize for Value<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Strings(strings) => serializer.collect_seq(strings),
            Value::Date(d) => serializer.collect_str(&d.format(DATE_FORMAT)),
            Value::DateTime(dt) => serializer.collect_str(&dt.format(DATETIME_FORMAT)),
            Value::Element(e) => serializer.serialize_str(&e.html()),
            Value::Nodes(nodes) => serializer.collect_seq(nodes),
            Value::List(items) => serializer.collect_seq(items),
            Value::Map(map) => serializer.collect_map(map),
        }
    }
}

impl From<bool> for Value<'_> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value<'_> {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value<'_> {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value<'_> {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value<'_> {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value<'_> {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDate> for Value<'_> {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveDateTime> for Value<'_> {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl<'t, T: Into<Value<'t>>> From<Option<T>> for Value<'t> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<'t, T: Into<Value<'t>>> From<Vec<T>> for Value<'t> {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}
