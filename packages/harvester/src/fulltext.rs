//! Full-text extraction from binary documents into a simple XML shape:
//! one `<page>` element per source page under a `<document>` root.

use crate::error::{HarvesterError, Result};
use crate::xml::{Element, ExpandedName, Namespaces, XmlDoc};

/// PDF magic bytes.
const PDF_MAGIC: &[u8] = b"%PDF";

/// Largest document accepted for extraction (200 MB).
const MAX_DOCUMENT_SIZE: usize = 200 * 1024 * 1024;

/// Turns raw document bytes into a `<document>` of `<page>` elements.
pub trait TextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<XmlDoc>;
}

impl<F> TextExtractor for F
where
    F: Fn(&[u8]) -> Result<XmlDoc>,
{
    fn extract(&self, bytes: &[u8]) -> Result<XmlDoc> {
        self(bytes)
    }
}

/// Extracts page text from PDF documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<XmlDoc> {
        validate_pdf(bytes)?;

        let document = lopdf::Document::load_mem(bytes)
            .map_err(|e| HarvesterError::Extraction(format!("Unreadable PDF: {e}")))?;

        let mut pages = Vec::new();
        for number in document.get_pages().keys() {
            let text = document
                .extract_text(&[*number])
                .map_err(|e| HarvesterError::Extraction(format!("Page {number}: {e}")))?;
            pages.push(text);
        }
        tracing::debug!(pages = pages.len(), bytes = bytes.len(), "Extracted PDF text");

        Ok(text_document(&pages))
    }
}

fn validate_pdf(bytes: &[u8]) -> Result<()> {
    if bytes.len() > MAX_DOCUMENT_SIZE {
        return Err(HarvesterError::Extraction(format!(
            "Document too large ({} MB)",
            bytes.len() / (1024 * 1024)
        )));
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(HarvesterError::Extraction("Missing PDF header".to_string()));
    }
    Ok(())
}

/// Build the full-text document from per-page text.
///
/// # Examples
/// ```
/// use oai_harvester::fulltext::text_document;
///
/// let doc = text_document(&["first", "second"]);
/// assert_eq!(
///     doc.to_xml_string(),
///     "<document>\n<page>\nfirst\n</page>\n<page>\nsecond\n</page>\n</document>"
/// );
/// ```
pub fn text_document<S: AsRef<str>>(pages: &[S]) -> XmlDoc {
    let mut root = Element::new(ExpandedName::local("document"));
    root.push_text("\n");
    for text in pages {
        let mut page = Element::new(ExpandedName::local("page"));
        page.push_text(&format!("\n{}\n", text.as_ref()));
        root.push_element(page);
        root.push_text("\n");
    }
    XmlDoc::from_element(root, Namespaces::default())
}
