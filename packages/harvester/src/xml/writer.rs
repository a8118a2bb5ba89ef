//! Deterministic XML serialization of a document view.

use std::fmt::Write as _;

use crate::xml::doc::XmlDoc;
use crate::xml::namespaces::Namespaces;
use crate::xml::tree::{Descendants, Element, ExpandedName, Node, XML_NAMESPACE};

/// Output character encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    /// Non-ASCII characters in text and attribute values become character references.
    UsAscii,
}

impl Encoding {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::UsAscii => "US-ASCII",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SerializeOptions {
    pub encoding: Encoding,
    pub declaration: bool,
}

impl SerializeOptions {
    /// UTF-8 with XML declaration, the form used for files on disk.
    pub fn document() -> Self {
        Self {
            encoding: Encoding::Utf8,
            declaration: true,
        }
    }
}

impl XmlDoc {
    /// Serialize this view (the element and its subtree) to bytes.
    ///
    /// Namespaces used in the subtree are declared on the outermost element,
    /// with the registered prefix when there is one and `nsN` otherwise.
    pub fn serialize(&self, options: SerializeOptions) -> Vec<u8> {
        let mut out = String::new();
        if options.declaration {
            let _ = writeln!(out, r#"<?xml version="1.0" encoding="{}"?>"#, options.encoding.label());
        }

        let prefixes = assign_prefixes(self.element(), self.namespaces());
        let mut writer = Writer {
            out,
            prefixes: &prefixes,
            ascii: options.encoding == Encoding::UsAscii,
        };
        writer.element(self.root(), true);
        writer.out.into_bytes()
    }

    /// UTF-8 serialization without declaration.
    pub fn to_xml_string(&self) -> String {
        String::from_utf8_lossy(&self.serialize(SerializeOptions::default())).into_owned()
    }
}

/// `(uri, prefix)` pairs, in first-use order.
fn assign_prefixes(root: &std::sync::Arc<Element>, namespaces: &Namespaces) -> Vec<(String, String)> {
    let mut assigned: Vec<(String, String)> = Vec::new();
    let mut generated = 0usize;

    let mut assign = |name: &ExpandedName| {
        let Some(uri) = name.namespace() else { return };
        if uri == XML_NAMESPACE || assigned.iter().any(|(u, _)| u == uri) {
            return;
        }
        let registered = namespaces
            .prefix_for(uri)
            .filter(|p| !assigned.iter().any(|(_, q)| q.as_str() == *p));
        let prefix = match registered {
            Some(p) => p.to_string(),
            None => loop {
                let candidate = format!("ns{generated}");
                generated += 1;
                let taken = namespaces.contains_prefix(&candidate)
                    || assigned.iter().any(|(_, q)| *q == candidate);
                if !taken {
                    break candidate;
                }
            },
        };
        assigned.push((uri.to_string(), prefix));
    };

    for element in Descendants::new(root) {
        assign(element.name());
        for attribute in element.attributes() {
            assign(&attribute.name);
        }
    }
    assigned
}

struct Writer<'a> {
    out: String,
    prefixes: &'a [(String, String)],
    ascii: bool,
}

impl Writer<'_> {
    fn qualified(&self, name: &ExpandedName) -> String {
        match name.namespace() {
            None => name.local_name().to_string(),
            Some(XML_NAMESPACE) => format!("xml:{}", name.local_name()),
            Some(uri) => {
                let prefix = self
                    .prefixes
                    .iter()
                    .find(|(u, _)| u == uri)
                    .map(|(_, p)| p.as_str())
                    .unwrap_or_default();
                format!("{prefix}:{}", name.local_name())
            }
        }
    }

    fn element(&mut self, element: &Element, outermost: bool) {
        let tag = self.qualified(element.name());
        self.out.push('<');
        self.out.push_str(&tag);

        if outermost {
            let mut declarations: Vec<&(String, String)> = self.prefixes.iter().collect();
            declarations.sort_by(|a, b| a.1.cmp(&b.1));
            for (uri, prefix) in declarations {
                let value = escape_attribute(uri, self.ascii);
                let _ = write!(self.out, r#" xmlns:{prefix}="{value}""#);
            }
        }

        for attribute in element.attributes() {
            let name = self.qualified(&attribute.name);
            let value = escape_attribute(&attribute.value, self.ascii);
            let _ = write!(self.out, r#" {name}="{value}""#);
        }

        if element.children().is_empty() {
            self.out.push_str(" />");
            return;
        }

        self.out.push('>');
        for child in element.children() {
            match child {
                Node::Text(text) => {
                    let escaped = escape_text(text, self.ascii);
                    self.out.push_str(&escaped);
                }
                Node::Element(child) => self.element(child, false),
            }
        }
        let _ = write!(self.out, "</{tag}>");
    }
}

fn escape_text(text: &str, ascii: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            c if ascii && !c.is_ascii() => {
                let _ = write!(escaped, "&#{};", c as u32);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

fn escape_attribute(value: &str, ascii: bool) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\n' => escaped.push_str("&#10;"),
            '\r' => escaped.push_str("&#13;"),
            '\t' => escaped.push_str("&#9;"),
            c if ascii && !c.is_ascii() => {
                let _ = write!(escaped, "&#{};", c as u32);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const OAI: &str = "http://www.openarchives.org/OAI/2.0/";

    #[test]
    fn test_serialize_registered_prefix() {
        let xml = format!(r#"<OAI-PMH xmlns="{OAI}"><header><identifier>a</identifier></header></OAI-PMH>"#);
        let doc = XmlDoc::parse(&xml, Namespaces::new()).unwrap();
        assert_eq!(
            doc.to_xml_string(),
            format!(
                r#"<oai:OAI-PMH xmlns:oai="{OAI}"><oai:header><oai:identifier>a</oai:identifier></oai:header></oai:OAI-PMH>"#
            )
        );
    }

    #[test]
    fn test_serialize_generated_prefix() {
        let doc = XmlDoc::parse(r#"<a xmlns="urn:a"><b xmlns="urn:b"/></a>"#, Namespaces::new()).unwrap();
        assert_eq!(
            doc.to_xml_string(),
            r#"<ns0:a xmlns:ns0="urn:a" xmlns:ns1="urn:b"><ns1:b /></ns0:a>"#
        );
    }

    #[test]
    fn test_serialize_declaration_and_escaping() {
        let doc = XmlDoc::parse(r#"<a t="x&quot;y">1 &lt; 2 &amp; caf&#233;</a>"#, Namespaces::new()).unwrap();
        let bytes = doc.serialize(SerializeOptions::document());
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a t=\"x&quot;y\">1 &lt; 2 &amp; café</a>"
        );
    }

    #[test]
    fn test_serialize_us_ascii() {
        let doc = XmlDoc::parse("<a>café</a>", Namespaces::new()).unwrap();
        let bytes = doc.serialize(SerializeOptions {
            encoding: Encoding::UsAscii,
            declaration: false,
        });
        assert_eq!(bytes, b"<a>caf&#233;</a>".to_vec());
    }

    #[test]
    fn test_xml_lang_is_not_declared() {
        let doc = XmlDoc::parse(r#"<a xml:lang="en">x</a>"#, Namespaces::new()).unwrap();
        assert_eq!(doc.to_xml_string(), r#"<a xml:lang="en">x</a>"#);
    }
}
