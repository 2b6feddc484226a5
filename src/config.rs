//! Declarative schema configuration
//!
//! Schemas can be described as JSON instead of Rust code:
//!
//! ```json
//! {
//!   "fields": [
//!     {"name": "title", "type": "text", "selector": "h1"},
//!     {"name": "products", "type": "structured_list", "selector": "div.product",
//!      "structure": [
//!        {"name": "name", "type": "text", "selector": "span.name"},
//!        {"name": "price", "type": "float", "selector": "span.price", "optional": true}
//!      ]}
//!   ]
//! }
//! ```
//!
//! Fields are declared in array order.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::document::{Declarations, Schema};
use crate::error::{Error, Result};
use crate::fields::{DictKey, Field, DEFAULT_DATETIME_FORMAT, DEFAULT_DATE_FORMAT};
use crate::text::clean_text;
use crate::tree::{validate_selector, Tree};
use crate::value::Value;

/// A complete schema description
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    pub fields: Vec<NamedFieldConfig>,
    /// Parse the input as an HTML fragment rather than a full document
    #[serde(default)]
    pub fragment: bool,
}

/// A field together with its name in the enclosing schema or structure
#[derive(Debug, Clone, Deserialize)]
pub struct NamedFieldConfig {
    pub name: String,
    #[serde(flatten)]
    pub field: FieldConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Literal,
    Elements,
    Strings,
    Text,
    Int,
    Float,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Element,
    Url,
    Structured,
    List,
    Dict,
    StructuredList,
    StructuredDict,
}

/// Key of dict fields: a `/`-path into the item, or a field of its own
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeyConfig {
    Path(String),
    Field(Box<FieldConfig>),
}

/// Single field specification
#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Selector expression; structured fields default to `.`
    #[serde(default)]
    pub selector: Option<String>,
    /// Value of literal fields
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default = "default_true")]
    pub auto_parse: bool,
    /// Fallback value, checked against the field type
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub separator: Option<String>,
    #[serde(default)]
    pub recursive: Option<bool>,
    #[serde(default)]
    pub filter_empty: Option<bool>,
    /// chrono format of date and datetime fields
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Item of list and dict fields
    #[serde(default)]
    pub item: Option<Box<FieldConfig>>,
    #[serde(default)]
    pub key: Option<KeyConfig>,
    /// Sub-fields of structured fields
    #[serde(default)]
    pub structure: Vec<NamedFieldConfig>,
    /// Post-processing steps: trim, lowercase, uppercase, normalize
    #[serde(default)]
    pub transforms: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl SchemaConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn build(&self) -> Result<Schema> {
        let mut declarations = Declarations::new();
        let mut entries = Vec::with_capacity(self.fields.len());
        for named in &self.fields {
            let field = named.field.build(&named.name)?;
            entries.push((named.name.clone(), declarations.declare(field)));
        }
        debug!(fields = entries.len(), "schema built from config");
        Schema::new(entries)
    }

    /// Parse `html` with this schema and return the document as JSON
    pub fn extract(&self, html: &str) -> Result<serde_json::Value> {
        let schema = self.build()?;
        let tree = if self.fragment {
            Tree::parse_fragment(html)
        } else {
            Tree::parse_document(html)
        };
        let document = schema.parse(&tree)?;
        document.to_json()
    }
}

impl FieldConfig {
    /// Build the field; `name` is only used in error messages
    pub fn build(&self, name: &str) -> Result<Field<'static>> {
        let mut field = match self.field_type {
            FieldType::Literal => Field::literal(
                self.value
                    .as_ref()
                    .map(Value::from_json)
                    .unwrap_or_default(),
            ),
            FieldType::Elements => Field::elements(self.selector(name)?),
            FieldType::Strings => Field::strings(self.selector(name)?),
            FieldType::Text => Field::text(self.selector(name)?),
            FieldType::Int => Field::int(self.selector(name)?),
            FieldType::Float => Field::float(self.selector(name)?),
            FieldType::Date => Field::date(self.selector(name)?),
            FieldType::DateTime => Field::datetime(self.selector(name)?),
            FieldType::Element => Field::element(self.selector(name)?),
            FieldType::Url => Field::url(self.selector(name)?),
            FieldType::Structured => {
                let selector = match &self.selector {
                    Some(selector) => checked(selector)?,
                    None => ".".to_string(),
                };
                Field::structured(selector, self.structure(name)?)
            }
            FieldType::List => Field::list(self.selector(name)?, self.item(name)?),
            FieldType::Dict => Field::dict(self.selector(name)?, self.key(name)?, self.item(name)?),
            FieldType::StructuredList => {
                Field::structured_list(self.selector(name)?, self.structure(name)?)
            }
            FieldType::StructuredDict => {
                Field::structured_dict(self.selector(name)?, self.key(name)?, self.structure(name)?)
            }
        };

        if self.optional {
            field = field.optional(true);
        }
        if let Some(separator) = &self.separator {
            field = field.separator(separator);
        }
        if let Some(recursive) = self.recursive {
            field = field.recursive(recursive);
        }
        if let Some(filter_empty) = self.filter_empty {
            field = field.filter_empty(filter_empty);
        }
        if let Some(format) = &self.format {
            field = field.format(format);
        }
        if let Some(base_url) = &self.base_url {
            let base = Url::parse(base_url).map_err(|e| {
                Error::Config(format!("field \"{}\": bad base_url \"{}\": {}", name, base_url, e))
            })?;
            field = field.base_url(base);
        }
        if let Some(default) = &self.default {
            field = field.with_default(self.default_value(name, default)?);
        }
        for transform in &self.transforms {
            let apply = transform_fn(transform).ok_or_else(|| {
                Error::Config(format!("field \"{}\": unknown transform \"{}\"", name, transform))
            })?;
            field.add_post_hook(move |value, _ctx| Ok(apply_transform(value, apply)));
        }

        Ok(field.auto_parse(self.auto_parse))
    }

    fn selector(&self, name: &str) -> Result<String> {
        match &self.selector {
            Some(selector) => checked(selector),
            None => Err(Error::Config(format!("field \"{}\" needs a selector", name))),
        }
    }

    fn item(&self, name: &str) -> Result<Field<'static>> {
        match &self.item {
            Some(item) => item.build(&format!("{}[]", name)),
            None => Err(Error::Config(format!("field \"{}\" needs an item", name))),
        }
    }

    fn key(&self, name: &str) -> Result<DictKey<'static>> {
        match &self.key {
            Some(KeyConfig::Path(path)) => Ok(DictKey::from(path.as_str())),
            Some(KeyConfig::Field(key)) => Ok(DictKey::from(key.build(&format!("{}.key", name))?)),
            None => Err(Error::Config(format!("field \"{}\" needs a key", name))),
        }
    }

    fn structure(&self, name: &str) -> Result<Vec<(String, Field<'static>)>> {
        if self.structure.is_empty() {
            return Err(Error::Config(format!("field \"{}\" needs a structure", name)));
        }
        self.structure
            .iter()
            .map(|child| {
                let path = format!("{}.{}", name, child.name);
                Ok((child.name.clone(), child.field.build(&path)?))
            })
            .collect()
    }

    /// Default value converted to what the field type produces
    fn default_value(&self, name: &str, json: &serde_json::Value) -> Result<Value<'static>> {
        let invalid = || {
            Error::Config(format!(
                "field \"{}\": default {} does not fit type {:?}",
                name, json, self.field_type
            ))
        };

        if json.is_null() {
            return Ok(Value::Null);
        }

        match self.field_type {
            FieldType::Int => json.as_i64().map(Value::Int).ok_or_else(invalid),
            FieldType::Float => json.as_f64().map(Value::Float).ok_or_else(invalid),
            FieldType::Text | FieldType::Url => json
                .as_str()
                .map(|s| Value::Text(s.to_string()))
                .ok_or_else(invalid),
            FieldType::Date => {
                let format = self.format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT);
                json.as_str()
                    .and_then(|s| NaiveDate::parse_from_str(s, format).ok())
                    .map(Value::Date)
                    .ok_or_else(invalid)
            }
            FieldType::DateTime => {
                let format = self.format.as_deref().unwrap_or(DEFAULT_DATETIME_FORMAT);
                json.as_str()
                    .and_then(|s| NaiveDateTime::parse_from_str(s, format).ok())
                    .map(Value::DateTime)
                    .ok_or_else(invalid)
            }
            _ => Ok(Value::from_json(json)),
        }
    }
}

fn checked(selector: &str) -> Result<String> {
    validate_selector(selector)?;
    Ok(selector.to_string())
}

fn transform_fn(name: &str) -> Option<fn(&str) -> String> {
    let apply: fn(&str) -> String = match name {
        "trim" => |s| s.trim().to_string(),
        "lowercase" => |s| s.to_lowercase(),
        "uppercase" => |s| s.to_uppercase(),
        "normalize" => |s| clean_text(s).trim().to_string(),
        _ => return None,
    };
    Some(apply)
}

/// Apply a text transform to text values; everything else passes through
fn apply_transform(value: Value<'_>, apply: fn(&str) -> String) -> Value<'_> {
    match value {
        Value::Text(text) => Value::Text(apply(&text)),
        Value::Strings(strings) => Value::Strings(strings.iter().map(|s| apply(s)).collect()),
        other => other,
    }
}
