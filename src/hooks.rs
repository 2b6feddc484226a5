//! Hook registries attached to fields
//!
//! Every field owns ordered lists of pre-parse, post-parse and error-recovery
//! hooks. List and dict fields additionally own map and filter hooks that run
//! per item. Hooks are reference counted so that templates and their
//! per-parse clones share them.

use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::document::DocumentView;
use crate::error::{Error, Result};
use crate::fields::Field;
use crate::tree::{Node, Tree};
use crate::value::Value;

/// What a pre/post/error hook gets to see besides the value
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a, 't> {
    /// The field being parsed
    pub field: &'a Field<'t>,
    /// The whole document tree
    pub tree: &'t Tree,
    /// Context node the field is parsed against; `None` at top level
    pub node: Option<&'a Node<'t>>,
    /// Fields of the owning document parsed so far
    pub document: DocumentView<'a, 't>,
}

/// What a map/filter hook gets to see besides the item value
#[derive(Debug, Clone, Copy)]
pub struct ItemContext<'a, 't> {
    /// Resolved key (dict fields only)
    pub key: Option<&'a str>,
    /// The parsed item clone
    pub item: &'a Field<'t>,
    /// The list or dict field owning the item
    pub field: &'a Field<'t>,
    pub tree: &'t Tree,
    /// Node the item was parsed against
    pub node: &'a Node<'t>,
    pub document: DocumentView<'a, 't>,
}

pub type HookFn = Rc<dyn for<'a, 't> Fn(Value<'t>, &HookContext<'a, 't>) -> Result<Value<'t>>>;
pub type ErrorHookFn =
    Rc<dyn for<'a, 't> Fn(&Error, Value<'t>, &HookContext<'a, 't>) -> Result<Value<'t>>>;
pub type MapFn = Rc<dyn for<'a, 't> Fn(Value<'t>, &ItemContext<'a, 't>) -> Result<Value<'t>>>;
pub type FilterFn = Rc<dyn for<'a, 't> Fn(&Value<'t>, &ItemContext<'a, 't>) -> bool>;

/// Ordered hook lists of one field
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) pre: Vec<HookFn>,
    pub(crate) post: Vec<HookFn>,
    pub(crate) error: Vec<ErrorHookFn>,
    pub(crate) map: Vec<MapFn>,
    pub(crate) filter: Vec<FilterFn>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("pre", &self.pre.len())
            .field("post", &self.post.len())
            .field("error", &self.error.len())
            .field("map", &self.map.len())
            .field("filter", &self.filter.len())
            .finish()
    }
}

impl Hooks {
    pub fn is_empty(&self) -> bool {
        self.pre.is_empty()
            && self.post.is_empty()
            && self.error.is_empty()
            && self.map.is_empty()
            && self.filter.is_empty()
    }

    pub(crate) fn run_pre<'t>(&self, value: Value<'t>, ctx: &HookContext<'_, 't>) -> Result<Value<'t>> {
        self.pre.iter().try_fold(value, |value, hook| hook(value, ctx))
    }

    pub(crate) fn run_post<'t>(&self, value: Value<'t>, ctx: &HookContext<'_, 't>) -> Result<Value<'t>> {
        self.post.iter().try_fold(value, |value, hook| hook(value, ctx))
    }

    /// Try each error hook in order; the first one that succeeds supplies the
    /// value. With no hook, or when all of them fail, `error` is returned.
    pub(crate) fn recover<'t>(
        &self,
        error: Error,
        value: &Value<'t>,
        ctx: &HookContext<'_, 't>,
    ) -> Result<Value<'t>> {
        for (index, hook) in self.error.iter().enumerate() {
            match hook(&error, value.clone(), ctx) {
                Ok(recovered) => {
                    debug!(hook = index, %error, "error hook recovered failure");
                    return Ok(recovered);
                }
                Err(hook_error) => {
                    trace!(hook = index, error = %hook_error, "error hook declined");
                }
            }
        }
        Err(error)
    }

    /// Whether every filter accepts the item; stops at the first rejection
    pub(crate) fn accepts<'t>(&self, value: &Value<'t>, ctx: &ItemContext<'_, 't>) -> bool {
        self.filter.iter().all(|filter| filter(value, ctx))
    }
}
