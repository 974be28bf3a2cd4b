//! The `document-info` record: file authorship, identity, and versioning.

use crate::tree::{NodeId, XmlTree};

use super::author::AuthorInfo;
use super::date::DateValue;
use super::fields::{self, InfoNode};

#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub authors: Vec<AuthorInfo>,
    pub program_used: Option<String>,
    pub date: Option<DateValue>,
    pub src_urls: Vec<String>,
    pub src_ocr: Option<String>,
    pub id: Option<String>,
    /// Passthrough subtree; re-parented verbatim on store.
    pub history: Option<NodeId>,
    pub publishers: Vec<AuthorInfo>,
    pub version: Option<f32>,
}

impl DocumentInfo {
    pub(crate) fn load(tree: &XmlTree, element: NodeId) -> Self {
        Self {
            authors: fields::load_object_list(tree, element, "author"),
            program_used: fields::load_element(tree, element, "program-used"),
            date: fields::load_object(tree, element, "date"),
            src_urls: fields::load_elements_list(tree, element, "src-url"),
            src_ocr: fields::load_element(tree, element, "src-ocr"),
            id: fields::load_element(tree, element, "id"),
            history: fields::load_subtree(tree, element, "history"),
            publishers: fields::load_object_list(tree, element, "publisher"),
            version: fields::load_element(tree, element, "version")
                .and_then(|raw| raw.parse().ok()),
        }
    }

    /// Build a fresh `document-info` element in canonical child order.
    pub(crate) fn build(&self, tree: &mut XmlTree) -> NodeId {
        let element = tree.new_element("document-info");
        fields::store_object_list(tree, element, "author", &self.authors);
        fields::store_element(tree, element, "program-used", self.program_used.as_deref());
        if let Some(date) = &self.date {
            date.store(tree, element, "date");
        }
        fields::store_elements_list(tree, element, "src-url", &self.src_urls);
        fields::store_element(tree, element, "src-ocr", self.src_ocr.as_deref());
        fields::store_element(tree, element, "id", self.id.as_deref());
        if let Some(version) = self.version {
            fields::store_element(tree, element, "version", Some(&format_version(version)));
        }
        fields::store_subtree(tree, element, self.history);
        fields::store_object_list(tree, element, "publisher", &self.publishers);
        element
    }
}

/// Render a version number the way readers expect: five fractional digits,
/// trailing zeros dropped, bare integers without a dot.
pub fn format_version(version: f32) -> String {
    let text = format!("{version:.5}");
    let text = text.trim_end_matches('0');
    let text = text.strip_suffix('.').unwrap_or(text);
    text.to_string()
}
