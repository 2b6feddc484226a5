//! Document tree and selector evaluation
//!
//! Uses the scraper crate to parse HTML and evaluate CSS selectors. On top of
//! plain CSS a selector expression understands:
//! - `.` (or an empty expression) for the context node itself
//! - `..` for the parent element of the context node
//! - a trailing ` @name` (or a bare `@name`) to read an attribute of every
//!   selected element; `@text` and `@html` read text content and inner HTML

use scraper::{ElementRef, Html, Selector};
use tracing::trace;

use crate::error::{Error, Result};

/// A parsed HTML document
#[derive(Debug)]
pub struct Tree {
    html: Html,
}

/// A matched node: an element of the tree or a piece of text
#[derive(Debug, Clone, PartialEq)]
pub enum Node<'t> {
    Element(ElementRef<'t>),
    Text(String),
}

impl<'t> Node<'t> {
    pub fn as_element(&self) -> Option<ElementRef<'t>> {
        match self {
            Node::Element(element) => Some(*element),
            Node::Text(_) => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, Node::Element(_))
    }

    /// Text of the node: trimmed text content for elements, the text itself otherwise
    pub fn text(&self) -> String {
        match self {
            Node::Element(element) => element.text().collect::<String>().trim().to_string(),
            Node::Text(text) => text.clone(),
        }
    }
}

enum Base<'e> {
    Current,
    Parent,
    Css(&'e str),
}

/// Split an expression into its node part and optional attribute accessor
fn parse_expression(expr: &str) -> (Base<'_>, Option<&str>) {
    let expr = expr.trim();

    let (base, attr) = if let Some(attr) = expr.strip_prefix('@') {
        ("", Some(attr.trim()))
    } else if let Some(at_pos) = expr.rfind(" @") {
        (expr[..at_pos].trim(), Some(expr[at_pos + 2..].trim()))
    } else {
        (expr, None)
    };

    let base = match base {
        "" | "." => Base::Current,
        ".." => Base::Parent,
        css => Base::Css(css),
    };

    (base, attr)
}

fn compile(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::InvalidSelector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

/// Check an expression without evaluating it
pub fn validate_selector(expr: &str) -> Result<()> {
    match parse_expression(expr) {
        (Base::Css(css), _) => compile(css).map(|_| ()),
        _ => Ok(()),
    }
}

impl Tree {
    /// Parse a complete HTML document
    pub fn parse_document(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    /// Parse an HTML fragment
    pub fn parse_fragment(html: &str) -> Self {
        Self {
            html: Html::parse_fragment(html),
        }
    }

    /// The document's root element
    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    /// Evaluate a selector expression against a context node.
    ///
    /// `None` as context means the whole document. Text nodes only match
    /// `.` (themselves); any other expression over text yields nothing.
    pub fn select<'t>(&'t self, context: Option<&Node<'t>>, expr: &str) -> Result<Vec<Node<'t>>> {
        let (base, attr) = parse_expression(expr);

        let nodes: Vec<Node<'t>> = match (base, context) {
            (Base::Current, None) => vec![Node::Element(self.root())],
            (Base::Current, Some(node)) => vec![node.clone()],
            (Base::Parent, None) | (Base::Parent, Some(Node::Text(_))) => vec![],
            (Base::Parent, Some(Node::Element(element))) => element
                .parent()
                .and_then(ElementRef::wrap)
                .map(Node::Element)
                .into_iter()
                .collect(),
            (Base::Css(css), None) => {
                let selector = compile(css)?;
                self.html.select(&selector).map(Node::Element).collect()
            }
            (Base::Css(css), Some(Node::Element(element))) => {
                let selector = compile(css)?;
                element.select(&selector).map(Node::Element).collect()
            }
            (Base::Css(css), Some(Node::Text(_))) => {
                compile(css)?;
                vec![]
            }
        };

        let nodes = match attr {
            None => nodes,
            Some(name) => nodes
                .iter()
                .filter_map(Node::as_element)
                .filter_map(|element| read_attr(element, name))
                .map(Node::Text)
                .collect(),
        };

        trace!(selector = expr, matches = nodes.len(), "selector evaluated");
        Ok(nodes)
    }

    /// Short diagnostic rendering of a context node, e.g. `<a href="/x">`
    pub fn describe(context: Option<&Node<'_>>) -> String {
        match context {
            None => "<document>".to_string(),
            Some(Node::Element(element)) => describe_element(*element),
            Some(Node::Text(text)) => {
                let shown: String = text.chars().take(40).collect();
                if shown.len() < text.len() {
                    format!("\"{}...\"", shown)
                } else {
                    format!("\"{}\"", shown)
                }
            }
        }
    }
}

fn read_attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    match name {
        "text" => Some(element.text().collect::<String>().trim().to_string()),
        "html" => Some(element.inner_html()),
        _ => element.value().attr(name).map(String::from),
    }
}

fn describe_element(element: ElementRef<'_>) -> String {
    let mut parts = vec![element.value().name().to_string()];
    for (name, value) in element.value().attrs() {
        parts.push(format!("{}=\"{}\"", name, value));
    }
    format!("<{}>", parts.join(" "))
}

/// Text nodes beneath an element: every descendant text when `recursive`,
/// otherwise only the element's direct text children
pub(crate) fn element_strings(element: ElementRef<'_>, recursive: bool) -> Vec<String> {
    if recursive {
        element.text().map(String::from).collect()
    } else {
        element
            .children()
            .filter_map(|child| child.value().as_text().map(|text| (**text).to_string()))
            .collect()
    }
}
