//! Field declarations and the parse protocol
//!
//! A [`Field`] describes how to obtain a value: where its input comes from
//! (a literal, another field, or a selector), which conversion it applies and
//! which hooks run around that conversion. Fields declared from a selector
//! string build their input chain implicitly, e.g. an int field reads a text
//! field which reads a strings field which evaluates the selector.
//!
//! Composite fields (structured, list, dict) hold templates and, after each
//! parse, fresh clones of those templates for every matched node.

mod access;
mod composite;
mod scalar;

pub use access::{Access, Definitions, Key};

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;
use url::Url;

use crate::document::DocumentView;
use crate::error::{Error, Position, Result};
use crate::hooks::{HookContext, Hooks, ItemContext};
use crate::tree::{Node, Tree};
use crate::value::Value;

/// Default format of date fields
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
/// Default format of date-time fields (RFC 3339 with a space separator;
/// `T`-separated and offset-bearing RFC 3339 strings are accepted too)
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Public name of a field's type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Literal,
    Elements,
    Strings,
    Text,
    Int,
    Float,
    Date,
    DateTime,
    Element,
    Url,
    Structured,
    List,
    Dict,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Literal => "literal",
            FieldKind::Elements => "elements",
            FieldKind::Strings => "strings",
            FieldKind::Text => "text",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Date => "date",
            FieldKind::DateTime => "datetime",
            FieldKind::Element => "element",
            FieldKind::Url => "url",
            FieldKind::Structured => "structured",
            FieldKind::List => "list",
            FieldKind::Dict => "dict",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
enum Kind<'t> {
    Literal,
    Elements,
    Strings { recursive: bool, filter_empty: bool },
    Text { separator: String },
    Int,
    Float,
    Date { format: String },
    DateTime { format: String },
    Element,
    Url { base: Option<Url> },
    Structured { structure: IndexMap<String, Field<'t>> },
    List { item: Box<Field<'t>> },
    Dict { item: Box<Field<'t>>, key: DictKey<'t> },
}

impl Kind<'_> {
    fn public(&self) -> FieldKind {
        match self {
            Kind::Literal => FieldKind::Literal,
            Kind::Elements => FieldKind::Elements,
            Kind::Strings { .. } => FieldKind::Strings,
            Kind::Text { .. } => FieldKind::Text,
            Kind::Int => FieldKind::Int,
            Kind::Float => FieldKind::Float,
            Kind::Date { .. } => FieldKind::Date,
            Kind::DateTime { .. } => FieldKind::DateTime,
            Kind::Element => FieldKind::Element,
            Kind::Url { .. } => FieldKind::Url,
            Kind::Structured { .. } => FieldKind::Structured,
            Kind::List { .. } => FieldKind::List,
            Kind::Dict { .. } => FieldKind::Dict,
        }
    }
}

/// How a dict field derives the key of each entry
#[derive(Debug, Clone)]
pub enum DictKey<'t> {
    /// Parse this field against the matched node
    Field(Box<Field<'t>>),
    /// Parse the item, then follow `/`-separated child names into it
    Path(String),
}

impl<'t> From<Field<'t>> for DictKey<'t> {
    fn from(field: Field<'t>) -> Self {
        DictKey::Field(Box::new(field))
    }
}

impl From<&str> for DictKey<'_> {
    fn from(path: &str) -> Self {
        DictKey::Path(path.to_string())
    }
}

impl From<String> for DictKey<'_> {
    fn from(path: String) -> Self {
        DictKey::Path(path)
    }
}

/// Where a field's input comes from, as given at declaration
#[derive(Debug, Clone)]
pub enum Origin<'t> {
    /// Selector expression; the field builds its default input chain from it
    Selector(String),
    /// Fixed input value
    Literal(Value<'t>),
    /// Another field, parsed first
    Field(Field<'t>),
}

impl<'t> Origin<'t> {
    pub fn literal(value: impl Into<Value<'t>>) -> Self {
        Origin::Literal(value.into())
    }
}

impl From<&str> for Origin<'_> {
    fn from(selector: &str) -> Self {
        Origin::Selector(selector.to_string())
    }
}

impl From<String> for Origin<'_> {
    fn from(selector: String) -> Self {
        Origin::Selector(selector)
    }
}

impl From<&String> for Origin<'_> {
    fn from(selector: &String) -> Self {
        Origin::Selector(selector.clone())
    }
}

impl<'t> From<Field<'t>> for Origin<'t> {
    fn from(field: Field<'t>) -> Self {
        Origin::Field(field)
    }
}

#[derive(Debug, Clone)]
enum Source<'t> {
    Literal(Value<'t>),
    /// Built from a selector; declaration options propagate into it
    Default(Box<Field<'t>>),
    /// Supplied by the caller; left untouched by declaration options
    Chained(Box<Field<'t>>),
}

/// Per-parse clones owned by a composite field
#[derive(Debug, Clone, Default)]
enum Children<'t> {
    #[default]
    None,
    Map(IndexMap<String, Field<'t>>),
    Items(Vec<Field<'t>>),
}

/// Result of a conversion step
struct Outcome<'t> {
    value: Value<'t>,
    children: Children<'t>,
}

impl<'t> Outcome<'t> {
    fn scalar(value: Value<'t>) -> Self {
        Self {
            value,
            children: Children::None,
        }
    }
}

/// A schema node describing how to obtain and convert one value.
///
/// Values produced by a parse may borrow from the parsed [`Tree`]; fields
/// declared in a [`Schema`](crate::Schema) are `Field<'static>` templates and
/// are cloned into a [`Document`](crate::Document) before parsing.
#[derive(Debug, Clone)]
pub struct Field<'t> {
    kind: Kind<'t>,
    source: Source<'t>,
    optional: bool,
    auto_parse: bool,
    default: Option<Value<'t>>,
    order: Option<u64>,
    hooks: Hooks,
    value: Value<'t>,
    children: Children<'t>,
}

impl<'t> Field<'t> {
    fn new(kind: Kind<'t>, origin: Origin<'t>) -> Self {
        let source = match origin {
            Origin::Field(field) => Source::Chained(Box::new(field)),
            Origin::Literal(value) => Source::Literal(value),
            Origin::Selector(selector) => match Self::default_source(&kind, &selector) {
                Some(field) => Source::Default(Box::new(field)),
                None => Source::Literal(Value::Text(selector)),
            },
        };

        Self {
            kind,
            source,
            optional: false,
            auto_parse: true,
            default: None,
            order: None,
            hooks: Hooks::default(),
            value: Value::Null,
            children: Children::None,
        }
    }

    /// The field a kind reads from when declared with a selector
    fn default_source(kind: &Kind<'t>, selector: &str) -> Option<Field<'t>> {
        match kind {
            Kind::Literal | Kind::Elements => None,
            Kind::Strings { .. } | Kind::Element | Kind::List { .. } | Kind::Dict { .. } => {
                Some(Field::elements(selector))
            }
            Kind::Text { .. } => Some(Field::strings(selector)),
            Kind::Int | Kind::Float | Kind::Date { .. } | Kind::DateTime { .. } => {
                Some(Field::text(selector).separator(""))
            }
            Kind::Url { .. } | Kind::Structured { .. } => Some(Field::element(selector)),
        }
    }

    /// Fixed value; hooks may still transform it
    pub fn literal(value: impl Into<Value<'t>>) -> Self {
        Self::new(Kind::Literal, Origin::Literal(value.into()))
    }

    /// Identity conversion over another field, for values computed by hooks
    pub fn chain(source: Field<'t>) -> Self {
        Self::new(Kind::Literal, Origin::Field(source))
    }

    /// Matched nodes of a selector expression
    pub fn elements(origin: impl Into<Origin<'t>>) -> Self {
        Self::new(Kind::Elements, origin.into())
    }

    /// Cleaned text strings beneath the matched nodes
    pub fn strings(origin: impl Into<Origin<'t>>) -> Self {
        Self::new(
            Kind::Strings {
                recursive: true,
                filter_empty: true,
            },
            origin.into(),
        )
    }

    /// Strings joined into one cleaned string
    pub fn text(origin: impl Into<Origin<'t>>) -> Self {
        Self::new(
            Kind::Text {
                separator: " ".to_string(),
            },
            origin.into(),
        )
    }

    pub fn int(origin: impl Into<Origin<'t>>) -> Self {
        Self::new(Kind::Int, origin.into())
    }

    pub fn float(origin: impl Into<Origin<'t>>) -> Self {
        Self::new(Kind::Float, origin.into())
    }

    pub fn date(origin: impl Into<Origin<'t>>) -> Self {
        Self::new(
            Kind::Date {
                format: DEFAULT_DATE_FORMAT.to_string(),
            },
            origin.into(),
        )
    }

    pub fn datetime(origin: impl Into<Origin<'t>>) -> Self {
        Self::new(
            Kind::DateTime {
                format: DEFAULT_DATETIME_FORMAT.to_string(),
            },
            origin.into(),
        )
    }

    /// First matched element; a selection without elements is kept whole
    pub fn element(origin: impl Into<Origin<'t>>) -> Self {
        Self::new(Kind::Element, origin.into())
    }

    /// `src` or `href` of the first matched element, falling back to its text
    pub fn url(origin: impl Into<Origin<'t>>) -> Self {
        Self::new(Kind::Url { base: None }, origin.into())
    }

    /// Fixed set of named sub-fields parsed against one node
    pub fn structured<I, S>(origin: impl Into<Origin<'t>>, structure: I) -> Self
    where
        I: IntoIterator<Item = (S, Field<'t>)>,
        S: Into<String>,
    {
        let structure = structure
            .into_iter()
            .map(|(name, field)| (name.into(), field))
            .collect();
        Self::new(Kind::Structured { structure }, origin.into())
    }

    /// One item template parsed against every matched node
    pub fn list(origin: impl Into<Origin<'t>>, item: Field<'t>) -> Self {
        Self::new(
            Kind::List {
                item: Box::new(item),
            },
            origin.into(),
        )
    }

    /// One item template per matched node, keyed by `key`
    pub fn dict(origin: impl Into<Origin<'t>>, key: impl Into<DictKey<'t>>, item: Field<'t>) -> Self {
        Self::new(
            Kind::Dict {
                item: Box::new(item),
                key: key.into(),
            },
            origin.into(),
        )
    }

    /// List whose item is a structured field over each matched node
    pub fn structured_list<I, S>(origin: impl Into<Origin<'t>>, structure: I) -> Self
    where
        I: IntoIterator<Item = (S, Field<'t>)>,
        S: Into<String>,
    {
        Self::list(origin, Field::structured(".", structure))
    }

    /// Dict whose item is a structured field over each matched node
    pub fn structured_dict<I, S>(
        origin: impl Into<Origin<'t>>,
        key: impl Into<DictKey<'t>>,
        structure: I,
    ) -> Self
    where
        I: IntoIterator<Item = (S, Field<'t>)>,
        S: Into<String>,
    {
        Self::dict(origin, key, Field::structured(".", structure))
    }

    /// Apply `apply` to this field and every field of its implicit input chain
    fn configure(&mut self, apply: &mut dyn FnMut(&mut Field<'t>)) {
        apply(self);
        if let Source::Default(inner) = &mut self.source {
            inner.configure(apply);
        }
    }

    /// Yield null (or an empty sequence) instead of failing on absence
    pub fn optional(mut self, optional: bool) -> Self {
        self.configure(&mut |field| field.optional = optional);
        self
    }

    /// Whether a document parses this field on its own
    pub fn auto_parse(mut self, auto_parse: bool) -> Self {
        self.auto_parse = auto_parse;
        self
    }

    /// Fallback value used when conversion fails. The implicit input chain
    /// becomes optional so that absent nodes reach this field as null.
    pub fn with_default(mut self, value: impl Into<Value<'t>>) -> Self {
        self.default = Some(value.into());
        if let Source::Default(inner) = &mut self.source {
            inner.configure(&mut |field| field.optional = true);
        }
        self
    }

    /// Join delimiter of text fields
    pub fn separator(mut self, separator: &str) -> Self {
        self.configure(&mut |field| {
            if let Kind::Text { separator: current } = &mut field.kind {
                *current = separator.to_string();
            }
        });
        self
    }

    /// Whether strings fields descend into nested elements
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.configure(&mut |field| {
            if let Kind::Strings { recursive: current, .. } = &mut field.kind {
                *current = recursive;
            }
        });
        self
    }

    /// Whether strings fields drop strings left empty after cleaning
    pub fn filter_empty(mut self, filter_empty: bool) -> Self {
        self.configure(&mut |field| {
            if let Kind::Strings {
                filter_empty: current,
                ..
            } = &mut field.kind
            {
                *current = filter_empty;
            }
        });
        self
    }

    /// chrono format string of date and date-time fields
    pub fn format(mut self, format: &str) -> Self {
        self.configure(&mut |field| match &mut field.kind {
            Kind::Date { format: current } | Kind::DateTime { format: current } => {
                *current = format.to_string();
            }
            _ => {}
        });
        self
    }

    /// Base against which URL fields resolve relative references
    pub fn base_url(mut self, base: Url) -> Self {
        self.configure(&mut |field| {
            if let Kind::Url { base: current } = &mut field.kind {
                *current = Some(base.clone());
            }
        });
        self
    }

    pub fn pre_hook<F>(mut self, hook: F) -> Self
    where
        F: for<'a, 'b> Fn(Value<'b>, &HookContext<'a, 'b>) -> Result<Value<'b>> + 'static,
    {
        self.add_pre_hook(hook);
        self
    }

    pub fn post_hook<F>(mut self, hook: F) -> Self
    where
        F: for<'a, 'b> Fn(Value<'b>, &HookContext<'a, 'b>) -> Result<Value<'b>> + 'static,
    {
        self.add_post_hook(hook);
        self
    }

    pub fn error_hook<F>(mut self, hook: F) -> Self
    where
        F: for<'a, 'b> Fn(&Error, Value<'b>, &HookContext<'a, 'b>) -> Result<Value<'b>> + 'static,
    {
        self.add_error_hook(hook);
        self
    }

    /// Append a hook that runs on the input before conversion
    pub fn add_pre_hook<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a, 'b> Fn(Value<'b>, &HookContext<'a, 'b>) -> Result<Value<'b>> + 'static,
    {
        self.hooks.pre.push(Rc::new(hook));
        self
    }

    /// Append a hook that runs on the converted value
    pub fn add_post_hook<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a, 'b> Fn(Value<'b>, &HookContext<'a, 'b>) -> Result<Value<'b>> + 'static,
    {
        self.hooks.post.push(Rc::new(hook));
        self
    }

    /// Append a hook that may replace a failed conversion with a value
    pub fn add_error_hook<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a, 'b> Fn(&Error, Value<'b>, &HookContext<'a, 'b>) -> Result<Value<'b>> + 'static,
    {
        self.hooks.error.push(Rc::new(hook));
        self
    }

    pub fn map<F>(mut self, hook: F) -> Result<Self>
    where
        F: for<'a, 'b> Fn(Value<'b>, &ItemContext<'a, 'b>) -> Result<Value<'b>> + 'static,
    {
        self.add_map(hook)?;
        Ok(self)
    }

    pub fn filter<F>(mut self, hook: F) -> Result<Self>
    where
        F: for<'a, 'b> Fn(&Value<'b>, &ItemContext<'a, 'b>) -> bool + 'static,
    {
        self.add_filter(hook)?;
        Ok(self)
    }

    /// Append a hook that transforms each accepted list/dict item's value
    pub fn add_map<F>(&mut self, hook: F) -> Result<&mut Self>
    where
        F: for<'a, 'b> Fn(Value<'b>, &ItemContext<'a, 'b>) -> Result<Value<'b>> + 'static,
    {
        self.require_collection("map")?;
        self.hooks.map.push(Rc::new(hook));
        Ok(self)
    }

    /// Append a predicate that list/dict items must satisfy to be kept
    pub fn add_filter<F>(&mut self, hook: F) -> Result<&mut Self>
    where
        F: for<'a, 'b> Fn(&Value<'b>, &ItemContext<'a, 'b>) -> bool + 'static,
    {
        self.require_collection("filter")?;
        self.hooks.filter.push(Rc::new(hook));
        Ok(self)
    }

    fn require_collection(&self, hook: &str) -> Result<()> {
        match self.kind {
            Kind::List { .. } | Kind::Dict { .. } => Ok(()),
            _ => Err(Error::Config(format!(
                "{} hooks need a list or dict field, not {}",
                hook,
                self.kind()
            ))),
        }
    }

    pub fn kind(&self) -> FieldKind {
        self.kind.public()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_auto_parse(&self) -> bool {
        self.auto_parse
    }

    pub fn default_value(&self) -> Option<&Value<'t>> {
        self.default.as_ref()
    }

    /// Position assigned by [`Declarations`](crate::Declarations), if declared
    pub fn declaration_order(&self) -> Option<u64> {
        self.order
    }

    pub(crate) fn set_declaration_order(&mut self, order: u64) {
        self.order = Some(order);
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Value of the last parse, or whatever was last set
    pub fn value(&self) -> &Value<'t> {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<Value<'t>>) {
        self.value = value.into();
    }

    /// Field this one reads its input from, if any
    pub fn source(&self) -> Option<&Field<'t>> {
        match &self.source {
            Source::Default(field) | Source::Chained(field) => Some(field.as_ref()),
            Source::Literal(_) => None,
        }
    }

    /// Item template of a list or dict field
    pub fn item(&self) -> Option<&Field<'t>> {
        match &self.kind {
            Kind::List { item } | Kind::Dict { item, .. } => Some(item.as_ref()),
            _ => None,
        }
    }

    /// Key specification of a dict field
    pub fn dict_key(&self) -> Option<&DictKey<'t>> {
        match &self.kind {
            Kind::Dict { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Selector expression at the bottom of the input chain
    pub fn selector(&self) -> Option<&str> {
        match (&self.kind, &self.source) {
            (Kind::Elements, Source::Literal(Value::Text(selector))) => Some(selector.as_str()),
            (_, Source::Default(inner)) | (_, Source::Chained(inner)) => inner.selector(),
            _ => None,
        }
    }

    /// Selector, or a placeholder for literal sources; used in diagnostics
    pub(crate) fn origin(&self) -> String {
        self.selector().unwrap_or("<literal>").to_string()
    }

    fn is_composite(&self) -> bool {
        matches!(
            self.kind,
            Kind::Structured { .. } | Kind::List { .. } | Kind::Dict { .. }
        )
    }

    pub(crate) fn child_error(&self, position: Position, error: Error) -> Error {
        Error::Child {
            position,
            selector: self.origin(),
            source: Box::new(error),
        }
    }

    /// Run the parse protocol against `context` (`None` for the whole tree).
    ///
    /// Resolves the source, threads the value through the pre-hooks, converts
    /// it, lets the error hooks recover a failed conversion, threads the
    /// result through the post-hooks and stores it. Parsing again replaces
    /// the value and any composite children.
    pub fn parse(
        &mut self,
        tree: &'t Tree,
        context: Option<&Node<'t>>,
        document: DocumentView<'_, 't>,
    ) -> Result<&Value<'t>> {
        trace!(kind = %self.kind(), selector = self.selector().unwrap_or(""), "parsing field");

        let input = match &mut self.source {
            Source::Literal(value) => value.clone(),
            Source::Default(inner) | Source::Chained(inner) => {
                inner.parse(tree, context, document)?.clone()
            }
        };

        let ctx = HookContext {
            field: &*self,
            tree,
            node: context,
            document,
        };

        let input = self.hooks.run_pre(input, &ctx)?;
        let outcome = match self.convert(&input, &ctx) {
            Ok(outcome) => outcome,
            Err(error) => Outcome::scalar(self.hooks.recover(error, &input, &ctx)?),
        };
        let value = self.hooks.run_post(outcome.value, &ctx)?;

        self.value = value;
        self.children = outcome.children;
        Ok(&self.value)
    }

    /// Parse against the whole tree, outside of any document
    pub fn parse_root(&mut self, tree: &'t Tree) -> Result<&Value<'t>> {
        self.parse(tree, None, DocumentView::default())
    }

    /// The conversion step particular to each kind
    fn convert(&self, input: &Value<'t>, ctx: &HookContext<'_, 't>) -> Result<Outcome<'t>> {
        let value = match &self.kind {
            Kind::Literal => input.clone(),
            Kind::Elements => self.convert_elements(input, ctx)?,
            Kind::Strings {
                recursive,
                filter_empty,
            } => self.convert_strings(input, ctx, *recursive, *filter_empty)?,
            Kind::Text { separator } => self.convert_text(input, ctx, separator)?,
            Kind::Int => self.convert_int(input, ctx)?,
            Kind::Float => self.convert_float(input, ctx)?,
            Kind::Date { format } => self.convert_date(input, ctx, format)?,
            Kind::DateTime { format } => self.convert_datetime(input, ctx, format)?,
            Kind::Element => self.convert_element(input, ctx)?,
            Kind::Url { base } => self.convert_url(input, ctx, base.as_ref())?,
            Kind::Structured { structure } => return self.convert_structured(structure, input, ctx),
            Kind::List { item } => return self.convert_list(item, input, ctx),
            Kind::Dict { item, key } => return self.convert_dict(item, key, input, ctx),
        };
        Ok(Outcome::scalar(value))
    }

    /// Value to use when narrowing fails: the default, null when optional,
    /// the error otherwise
    fn fallback(&self, error: Error) -> Result<Value<'t>> {
        if let Some(default) = &self.default {
            Ok(default.clone())
        } else if self.optional {
            Ok(Value::Null)
        } else {
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests;
