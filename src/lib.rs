//! Declarative schema extraction from HTML
//!
//! A schema is a set of named fields. Each field says where its input comes
//! from (a selector, a literal or another field), how to convert it (text,
//! numbers, dates, URLs, elements, or structured/list/dict composites) and
//! which hooks transform the result. Parsing a document walks the fields in
//! declaration order and fills in a tree of values.
//!
//! ```
//! use schema_extract::{Access, Field, Schema, Tree, Value};
//!
//! let schema = Schema::builder()
//!     .field("title", Field::text("h1"))
//!     .field("numbers", Field::list("li", Field::int(".").optional(true)))
//!     .build()
//!     .unwrap();
//!
//! let tree = Tree::parse_document("<h1>Counts</h1><ul><li>1</li><li>2</li><li>x</li></ul>");
//! let document = schema.parse(&tree).unwrap();
//! assert_eq!(document.get("title").unwrap(), &Value::from("Counts"));
//! assert_eq!(
//!     document.get("numbers").unwrap(),
//!     &Value::List(vec![Value::Int(1), Value::Int(2), Value::Null])
//! );
//! ```
//!
//! Schemas can also be given as JSON (see [`SchemaConfig`]) and parsed over
//! the C ABI in [`ffi`].

pub mod config;
pub mod document;
pub mod error;
pub mod ffi;
pub mod fields;
pub mod hooks;
pub mod text;
pub mod tree;
pub mod value;

pub use config::{FieldConfig, FieldType, KeyConfig, NamedFieldConfig, SchemaConfig};
pub use document::{Declarations, Document, DocumentView, Schema, SchemaBuilder};
pub use error::{Error, Position, Result};
pub use fields::{Access, Definitions, DictKey, Field, FieldKind, Key, Origin};
pub use hooks::{HookContext, Hooks, ItemContext};
pub use tree::{Node, Tree};
pub use value::Value;
