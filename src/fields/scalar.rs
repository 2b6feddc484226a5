//! Scalar conversions

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use url::Url;

use super::{Field, DEFAULT_DATETIME_FORMAT};
use crate::error::{Error, Result};
use crate::hooks::HookContext;
use crate::text::{clean_strings, clean_text};
use crate::tree::{element_strings, Node, Tree};
use crate::value::Value;

const ISO_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

impl<'t> Field<'t> {
    fn missing(&self, what: &'static str, ctx: &HookContext<'_, 't>) -> Error {
        Error::Missing {
            what,
            origin: self.origin(),
            context: Tree::describe(ctx.node),
        }
    }

    fn unconvertible(&self, text: &str, target: &str, ctx: &HookContext<'_, 't>) -> Error {
        Error::Conversion {
            text: text.to_string(),
            target: target.to_string(),
            origin: self.origin(),
            context: Tree::describe(ctx.node),
        }
    }

    pub(super) fn convert_elements(
        &self,
        input: &Value<'t>,
        ctx: &HookContext<'_, 't>,
    ) -> Result<Value<'t>> {
        let nodes = match input {
            Value::Text(selector) => ctx.tree.select(ctx.node, selector)?,
            Value::Nodes(nodes) => nodes.clone(),
            Value::Element(element) => vec![Node::Element(*element)],
            Value::Strings(strings) => strings.iter().cloned().map(Node::Text).collect(),
            Value::Null => vec![],
            other => vec![Node::Text(other.to_text())],
        };

        if nodes.is_empty() && !self.optional {
            let selector = match input.as_str() {
                Some(selector) => selector.to_string(),
                None => self.origin(),
            };
            return self.fallback(Error::SelectorNotFound {
                selector,
                context: Tree::describe(ctx.node),
            });
        }
        Ok(Value::Nodes(nodes))
    }

    pub(super) fn convert_strings(
        &self,
        input: &Value<'t>,
        ctx: &HookContext<'_, 't>,
        recursive: bool,
        filter_empty: bool,
    ) -> Result<Value<'t>> {
        let raw: Vec<String> = match input {
            Value::Nodes(nodes) => nodes
                .iter()
                .flat_map(|node| match node {
                    Node::Element(element) => element_strings(*element, recursive),
                    Node::Text(text) => vec![text.clone()],
                })
                .collect(),
            Value::Element(element) => element_strings(*element, recursive),
            Value::Strings(strings) => strings.clone(),
            Value::Null => vec![],
            other => vec![other.to_text()],
        };

        let strings = clean_strings(raw, filter_empty);
        if strings.is_empty() && !self.optional {
            return self.fallback(self.missing("strings", ctx));
        }
        Ok(Value::Strings(strings))
    }

    pub(super) fn convert_text(
        &self,
        input: &Value<'t>,
        ctx: &HookContext<'_, 't>,
        separator: &str,
    ) -> Result<Value<'t>> {
        let joined = match input {
            Value::Strings(strings) => strings.join(separator),
            Value::Nodes(nodes) => {
                let raw = nodes.iter().flat_map(|node| match node {
                    Node::Element(element) => element_strings(*element, true),
                    Node::Text(text) => vec![text.clone()],
                });
                clean_strings(raw, true).join(separator)
            }
            Value::Element(element) => {
                clean_strings(element_strings(*element, true), true).join(separator)
            }
            other => other.to_text(),
        };

        let text = clean_text(&joined).trim().to_string();
        if text.is_empty() {
            return self.fallback(self.missing("text", ctx));
        }
        Ok(Value::Text(text))
    }

    pub(super) fn convert_int(&self, input: &Value<'t>, ctx: &HookContext<'_, 't>) -> Result<Value<'t>> {
        match input {
            Value::Int(i) => return Ok(Value::Int(*i)),
            Value::Float(f) if f.fract() == 0.0 => return Ok(Value::Int(*f as i64)),
            Value::Null => return self.fallback(self.missing("text", ctx)),
            _ => {}
        }

        let text = input.to_text();
        match text.trim().parse::<i64>() {
            Ok(i) => Ok(Value::Int(i)),
            Err(_) => self.fallback(self.unconvertible(&text, "int", ctx)),
        }
    }

    pub(super) fn convert_float(
        &self,
        input: &Value<'t>,
        ctx: &HookContext<'_, 't>,
    ) -> Result<Value<'t>> {
        match input {
            Value::Float(f) => return Ok(Value::Float(*f)),
            Value::Int(i) => return Ok(Value::Float(*i as f64)),
            Value::Null => return self.fallback(self.missing("text", ctx)),
            _ => {}
        }

        let text = input.to_text();
        match text.trim().parse::<f64>() {
            Ok(f) => Ok(Value::Float(f)),
            Err(_) => self.fallback(self.unconvertible(&text, "float", ctx)),
        }
    }

    pub(super) fn convert_date(
        &self,
        input: &Value<'t>,
        ctx: &HookContext<'_, 't>,
        format: &str,
    ) -> Result<Value<'t>> {
        match input {
            Value::Date(date) => return Ok(Value::Date(*date)),
            Value::DateTime(datetime) => return Ok(Value::Date(datetime.date())),
            Value::Null => return self.fallback(self.missing("text", ctx)),
            _ => {}
        }

        let text = input.to_text();
        match NaiveDate::parse_from_str(text.trim(), format) {
            Ok(date) => Ok(Value::Date(date)),
            Err(_) => self.fallback(self.unconvertible(&text, "date", ctx)),
        }
    }

    pub(super) fn convert_datetime(
        &self,
        input: &Value<'t>,
        ctx: &HookContext<'_, 't>,
        format: &str,
    ) -> Result<Value<'t>> {
        match input {
            Value::DateTime(datetime) => return Ok(Value::DateTime(*datetime)),
            Value::Date(date) => return Ok(Value::DateTime(date.and_time(NaiveTime::MIN))),
            Value::Null => return self.fallback(self.missing("text", ctx)),
            _ => {}
        }

        let text = input.to_text();
        match parse_datetime(text.trim(), format) {
            Some(datetime) => Ok(Value::DateTime(datetime)),
            None => self.fallback(self.unconvertible(&text, "datetime", ctx)),
        }
    }

    pub(super) fn convert_element(
        &self,
        input: &Value<'t>,
        ctx: &HookContext<'_, 't>,
    ) -> Result<Value<'t>> {
        let value = match input {
            Value::Element(element) => Some(Value::Element(*element)),
            Value::Nodes(nodes) if nodes.is_empty() => None,
            // A selection with no elements (attributes, text) stays as it is
            Value::Nodes(nodes) => Some(
                nodes
                    .iter()
                    .find_map(Node::as_element)
                    .map_or_else(|| Value::Nodes(nodes.clone()), Value::Element),
            ),
            Value::Null => None,
            other => Some(other.clone()),
        };

        match value {
            Some(value) => Ok(value),
            None => self.fallback(self.missing("element", ctx)),
        }
    }

    pub(super) fn convert_url(
        &self,
        input: &Value<'t>,
        ctx: &HookContext<'_, 't>,
        base: Option<&Url>,
    ) -> Result<Value<'t>> {
        let raw = match input {
            Value::Element(element) => Some(link_of(&Node::Element(*element))),
            Value::Nodes(nodes) => nodes.first().map(link_of),
            Value::Null => None,
            other => Some(clean_text(&other.to_text()).trim().to_string()),
        };

        let raw = match raw {
            Some(raw) if !raw.is_empty() => raw,
            _ => return self.fallback(self.missing("URL", ctx)),
        };

        match base {
            None => Ok(Value::Text(raw)),
            Some(base) => match base.join(&raw) {
                Ok(url) => Ok(Value::Text(url.to_string())),
                Err(_) => self.fallback(self.unconvertible(&raw, "URL", ctx)),
            },
        }
    }
}

/// `src`, then `href`, then the cleaned text of a node
fn link_of(node: &Node<'_>) -> String {
    if let Some(element) = node.as_element() {
        for attr in ["src", "href"] {
            if let Some(link) = element.value().attr(attr) {
                return link.trim().to_string();
            }
        }
    }
    clean_text(&node.text()).trim().to_string()
}

fn parse_datetime(text: &str, format: &str) -> Option<NaiveDateTime> {
    if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
        return Some(datetime);
    }
    if format != DEFAULT_DATETIME_FORMAT {
        return None;
    }
    NaiveDateTime::parse_from_str(text, ISO_DATETIME_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.naive_local()))
}
