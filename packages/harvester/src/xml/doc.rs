//! Namespace-aware document view over a shared element tree.

use std::sync::Arc;

use roxmltree::Document;

use crate::error::Result;
use crate::xml::namespaces::{Namespaces, TagMatcher};
use crate::xml::path::CompiledPath;
use crate::xml::tree::{Descendants, Element, ExpandedName};

/// A view of one element plus the namespace mapping used to resolve
/// `prefix:local` queries.
///
/// Query results are views into the same tree, not copies. Cloning is cheap.
///
/// # Examples
/// ```
/// use oai_harvester::xml::{Namespaces, XmlDoc};
///
/// let xml = r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
///   <ListIdentifiers>
///     <header><identifier>ark:/67531/metadc1</identifier></header>
///     <header><identifier>ark:/67531/metadc2</identifier></header>
///   </ListIdentifiers>
/// </OAI-PMH>"#;
/// let page = XmlDoc::parse(xml, Namespaces::new()).unwrap();
///
/// let first = page.find_first_by_tag("oai:identifier", None).unwrap().unwrap();
/// assert_eq!(first.text(), Some("ark:/67531/metadc1"));
/// assert_eq!(page.find_all_by_tag("oai:header", None).unwrap().count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct XmlDoc {
    root: Arc<Element>,
    namespaces: Arc<Namespaces>,
}

impl XmlDoc {
    /// Parse XML text.
    ///
    /// # Errors
    /// `HarvesterError::XmlParse` if the text is not well-formed.
    pub fn parse(text: &str, namespaces: Namespaces) -> Result<Self> {
        Self::parse_shared(text, Arc::new(namespaces))
    }

    /// Parse XML text, sharing an existing namespace mapping.
    pub fn parse_shared(text: &str, namespaces: Arc<Namespaces>) -> Result<Self> {
        let document = Document::parse(text)?;
        let root = Element::from_rox(document.root_element());
        Ok(Self {
            root: Arc::new(root),
            namespaces,
        })
    }

    /// Wrap an element built in memory.
    pub fn from_element(element: Element, namespaces: Namespaces) -> Self {
        Self {
            root: Arc::new(element),
            namespaces: Arc::new(namespaces),
        }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub(crate) fn element(&self) -> &Arc<Element> {
        &self.root
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    pub fn tag(&self) -> &ExpandedName {
        self.root.name()
    }

    pub fn text(&self) -> Option<&str> {
        self.root.text()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.root.attribute(name)
    }

    /// Direct child elements, as views.
    pub fn children(&self) -> impl Iterator<Item = XmlDoc> + '_ {
        self.root.child_elements().map(|el| self.view(el))
    }

    /// Whether both views point at the same node of the same tree.
    pub fn same_node(&self, other: &XmlDoc) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }

    /// First element (this one included, then descendants in document
    /// order) whose tag matches and, when `text` is given, whose text equals it.
    ///
    /// # Errors
    /// `HarvesterError::UnknownNamespace` for an unregistered prefix.
    pub fn find_first_by_tag(&self, tag: &str, text: Option<&str>) -> Result<Option<XmlDoc>> {
        Ok(self.find_all_by_tag(tag, text)?.next())
    }

    /// Every match of [`find_first_by_tag`](Self::find_first_by_tag), lazily.
    pub fn find_all_by_tag(
        &self,
        tag: &str,
        text: Option<&str>,
    ) -> Result<impl Iterator<Item = XmlDoc>> {
        let matcher = self.namespaces.expand(tag)?;
        Ok(self.select(matcher, text))
    }

    /// First element with the given text, any tag.
    pub fn find_first_by_text(&self, text: &str) -> Option<XmlDoc> {
        self.find_all_by_text(text).next()
    }

    pub fn find_all_by_text(&self, text: &str) -> impl Iterator<Item = XmlDoc> {
        self.select(TagMatcher::Any, Some(text))
    }

    /// First element selected by a raw path expression (no prefix expansion).
    ///
    /// # Errors
    /// `HarvesterError::InvalidPath` if the expression cannot be compiled.
    pub fn find_first_by_path(&self, path: &str, text: Option<&str>) -> Result<Option<XmlDoc>> {
        Ok(self.find_all_by_path(path, text)?.next())
    }

    pub fn find_all_by_path(
        &self,
        path: &str,
        text: Option<&str>,
    ) -> Result<impl Iterator<Item = XmlDoc>> {
        let compiled = CompiledPath::compile(path)?;
        let namespaces = Arc::clone(&self.namespaces);
        let text = text.map(str::to_owned);

        Ok(compiled
            .select(&self.root)
            .into_iter()
            .filter(move |el| text_matches(el, text.as_deref()))
            .map(move |el| XmlDoc {
                root: el,
                namespaces: Arc::clone(&namespaces),
            }))
    }

    fn select(&self, matcher: TagMatcher, text: Option<&str>) -> impl Iterator<Item = XmlDoc> {
        let namespaces = Arc::clone(&self.namespaces);
        let text = text.map(str::to_owned);

        Descendants::new(&self.root)
            .filter(move |el| matcher.matches(el.name()) && text_matches(el, text.as_deref()))
            .map(move |el| XmlDoc {
                root: el,
                namespaces: Arc::clone(&namespaces),
            })
    }

    fn view(&self, element: &Arc<Element>) -> XmlDoc {
        XmlDoc {
            root: Arc::clone(element),
            namespaces: Arc::clone(&self.namespaces),
        }
    }
}

/// Structural equality: same tags, attributes, text and children.
impl PartialEq for XmlDoc {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

fn text_matches(element: &Element, text: Option<&str>) -> bool {
    match text {
        None => true,
        Some(expected) => element.text() == Some(expected),
    }
}
