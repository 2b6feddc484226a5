//! Structured, list and dict conversions
//!
//! Every matched node gets fresh clones of the templates; the clones are kept
//! as the composite's children and the composite's value is projected from
//! them once all of them parsed.

use indexmap::IndexMap;
use tracing::trace;

use super::{Access, Children, DictKey, Field, Outcome};
use crate::error::{Error, Position, Result};
use crate::hooks::{HookContext, ItemContext};
use crate::tree::Node;
use crate::value::Value;

/// Node a structured field parses its sub-fields against
fn context_node<'t>(input: &Value<'t>) -> Option<Node<'t>> {
    match input {
        Value::Element(element) => Some(Node::Element(*element)),
        Value::Nodes(nodes) => nodes.first().cloned(),
        Value::Text(text) => Some(Node::Text(text.clone())),
        _ => None,
    }
}

/// Nodes a list or dict field iterates over
fn nodes_of<'t>(input: &Value<'t>) -> Vec<Node<'t>> {
    match input {
        Value::Nodes(nodes) => nodes.clone(),
        Value::Element(element) => vec![Node::Element(*element)],
        Value::Strings(strings) => strings.iter().cloned().map(Node::Text).collect(),
        Value::Text(text) => vec![Node::Text(text.clone())],
        _ => vec![],
    }
}

/// Follow `/`-separated child names from `item` down to a value
fn follow_path<'f, 't>(item: &'f Field<'t>, path: &str) -> Result<&'f Value<'t>> {
    let mut field = item;
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        field = field.field(segment)?;
    }
    Ok(field.value())
}

impl<'t> Field<'t> {
    pub(super) fn convert_structured(
        &self,
        structure: &IndexMap<String, Field<'t>>,
        input: &Value<'t>,
        ctx: &HookContext<'_, 't>,
    ) -> Result<Outcome<'t>> {
        let mut children = structure.clone();

        let Some(node) = context_node(input) else {
            return Ok(Outcome {
                value: Value::Null,
                children: Children::Map(children),
            });
        };

        for (name, child) in children.iter_mut() {
            child
                .parse(ctx.tree, Some(&node), ctx.document)
                .map_err(|e| self.child_error(Position::Name(name.clone()), e))?;
        }

        let value = children
            .iter()
            .map(|(name, child)| (name.clone(), child.value.clone()))
            .collect();
        Ok(Outcome {
            value: Value::Map(value),
            children: Children::Map(children),
        })
    }

    pub(super) fn convert_list(
        &self,
        template: &Field<'t>,
        input: &Value<'t>,
        ctx: &HookContext<'_, 't>,
    ) -> Result<Outcome<'t>> {
        let nodes = nodes_of(input);
        let mut items = Vec::with_capacity(nodes.len());

        for (index, node) in nodes.iter().enumerate() {
            let mut item = template.clone();
            item.parse(ctx.tree, Some(node), ctx.document)
                .map_err(|e| self.child_error(Position::Index(index), e))?;

            let accepted = self
                .accept_item(&mut item, None, node, ctx)
                .map_err(|e| self.child_error(Position::Index(index), e))?;
            if accepted {
                items.push(item);
            } else {
                trace!(index, "list item filtered out");
            }
        }

        let value = Value::List(items.iter().map(|item| item.value.clone()).collect());
        Ok(Outcome {
            value,
            children: Children::Items(items),
        })
    }

    pub(super) fn convert_dict(
        &self,
        template: &Field<'t>,
        key: &DictKey<'t>,
        input: &Value<'t>,
        ctx: &HookContext<'_, 't>,
    ) -> Result<Outcome<'t>> {
        let nodes = nodes_of(input);
        let mut entries: IndexMap<String, Field<'t>> = IndexMap::with_capacity(nodes.len());

        for (index, node) in nodes.iter().enumerate() {
            let (name, mut item) = match key {
                DictKey::Field(key_template) => {
                    let mut key_field = (**key_template).clone();
                    let key_value = key_field
                        .parse(ctx.tree, Some(node), ctx.document)
                        .map_err(|e| self.child_error(Position::Key(index), e))?;
                    let name = self.resolve_key(key_value)?;

                    let mut item = template.clone();
                    item.parse(ctx.tree, Some(node), ctx.document)
                        .map_err(|e| self.child_error(Position::Item(name.clone()), e))?;
                    (name, item)
                }
                DictKey::Path(path) => {
                    let mut item = template.clone();
                    item.parse(ctx.tree, Some(node), ctx.document)
                        .map_err(|e| self.child_error(Position::Index(index), e))?;

                    let key_value = follow_path(&item, path)
                        .map_err(|e| self.child_error(Position::Key(index), e))?;
                    let name = self.resolve_key(key_value)?;
                    (name, item)
                }
            };

            let accepted = self
                .accept_item(&mut item, Some(&name), node, ctx)
                .map_err(|e| self.child_error(Position::Item(name.clone()), e))?;
            if !accepted {
                trace!(key = %name, "dict item filtered out");
                continue;
            }

            // a repeated key replaces the earlier entry and moves to the end
            if entries.shift_remove(&name).is_some() {
                trace!(key = %name, "dict key overwritten");
            }
            entries.insert(name, item);
        }

        let value = entries
            .iter()
            .map(|(name, item)| (name.clone(), item.value.clone()))
            .collect();
        Ok(Outcome {
            value: Value::Map(value),
            children: Children::Map(entries),
        })
    }

    fn resolve_key(&self, value: &Value<'t>) -> Result<String> {
        value.as_key().ok_or_else(|| Error::InvalidKey {
            key: value.to_json().to_string(),
            selector: self.origin(),
        })
    }

    /// Apply map hooks to a parsed item, then decide with the filters
    /// whether to keep it
    fn accept_item(
        &self,
        item: &mut Field<'t>,
        key: Option<&str>,
        node: &Node<'t>,
        ctx: &HookContext<'_, 't>,
    ) -> Result<bool> {
        for hook in &self.hooks.map {
            let mapped = {
                let item_ctx = ItemContext {
                    key,
                    item: &*item,
                    field: self,
                    tree: ctx.tree,
                    node,
                    document: ctx.document,
                };
                hook(item.value.clone(), &item_ctx)?
            };
            item.value = mapped;
        }

        let item_ctx = ItemContext {
            key,
            item: &*item,
            field: self,
            tree: ctx.tree,
            node,
            document: ctx.document,
        };
        Ok(self.hooks.accepts(&item.value, &item_ctx))
    }
}
