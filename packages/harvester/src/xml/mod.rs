//! XML documents: an owned element tree, namespace-aware queries and
//! serialization.

pub mod doc;
pub mod namespaces;
pub mod path;
pub mod tree;
pub mod writer;

pub use doc::XmlDoc;
pub use namespaces::{Namespaces, TagMatcher};
pub use tree::{Attribute, Element, ExpandedName, Node};
pub use writer::{Encoding, SerializeOptions};
