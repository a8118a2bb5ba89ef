//! Owned element tree shared between document views.
//!
//! Subtrees are reference counted so a query result can point into the
//! page that produced it without copying.

use std::fmt;
use std::sync::Arc;

use roxmltree::Node as RoxNode;

/// Namespace URI bound to the reserved `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace-qualified element or attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpandedName {
    namespace: Option<String>,
    local: String,
}

impl ExpandedName {
    pub fn new(namespace: Option<&str>, local: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_owned),
            local: local.to_owned(),
        }
    }

    /// A name without namespace.
    pub fn local(local: &str) -> Self {
        Self::new(None, local)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn local_name(&self) -> &str {
        &self.local
    }
}

/// Clark notation: `{uri}local`, or just `local` without namespace.
impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: ExpandedName,
    pub value: String,
}

/// Child of an element. Comments and processing instructions are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Arc<Element>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: ExpandedName,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: ExpandedName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: ExpandedName, value: &str) -> Self {
        self.attributes.push(Attribute {
            name,
            value: value.to_owned(),
        });
        self
    }

    /// Append text, merging with a preceding text node.
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_owned()));
        }
    }

    pub fn push_element(&mut self, element: Element) {
        self.children.push(Node::Element(Arc::new(element)));
    }

    pub fn name(&self) -> &ExpandedName {
        &self.name
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Look up an attribute by local name (no namespace) or Clark name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| {
                (a.name.namespace().is_none() && a.name.local_name() == name)
                    || a.name.to_string() == name
            })
            .map(|a| a.value.as_str())
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child_elements(&self) -> impl DoubleEndedIterator<Item = &Arc<Element>> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// Text before the first child element, `None` when there is none.
    pub fn text(&self) -> Option<&str> {
        match self.children.first() {
            Some(Node::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// All text inside the element, nested elements included.
    pub fn itertext(&self) -> String {
        let mut text = String::new();
        collect_text(self, &mut text);
        text
    }

    /// Build an owned element from a parsed roxmltree element.
    pub(crate) fn from_rox(node: RoxNode<'_, '_>) -> Self {
        let tag = node.tag_name();
        let mut element = Element::new(ExpandedName::new(tag.namespace(), tag.name()));
        element.attributes = node
            .attributes()
            .map(|a| Attribute {
                name: ExpandedName::new(a.namespace(), a.name()),
                value: a.value().to_owned(),
            })
            .collect();

        for child in node.children() {
            if child.is_element() {
                element.push_element(Element::from_rox(child));
            } else if child.is_text() {
                if let Some(text) = child.text() {
                    element.push_text(text);
                }
            }
        }
        element
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for child in &element.children {
        match child {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => collect_text(el, out),
        }
    }
}

/// Pre-order walk over an element and all its descendant elements.
///
/// Single pass; clones only the `Arc` handles it yields.
#[derive(Debug)]
pub struct Descendants {
    stack: Vec<Arc<Element>>,
}

impl Descendants {
    pub fn new(root: &Arc<Element>) -> Self {
        Self {
            stack: vec![Arc::clone(root)],
        }
    }
}

impl Iterator for Descendants {
    type Item = Arc<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;
        self.stack.extend(element.child_elements().rev().cloned());
        Some(element)
    }
}
