//! The `publish-info` record.

use crate::tree::{NodeId, XmlTree};

use super::date::parse_year;
use super::fields;
use super::title::SequenceInfo;

#[derive(Debug, Clone, Default)]
pub struct PublishInfo {
    pub book_name: Option<String>,
    pub publisher: Option<String>,
    pub city: Option<String>,
    pub year: Option<i32>,
    pub isbn: Option<String>,
    pub sequences: Vec<SequenceInfo>,
}

impl PublishInfo {
    pub(crate) fn load(tree: &XmlTree, element: NodeId) -> Self {
        Self {
            book_name: fields::load_element(tree, element, "book-name"),
            publisher: fields::load_element(tree, element, "publisher"),
            city: fields::load_element(tree, element, "city"),
            year: fields::load_element(tree, element, "year")
                .as_deref()
                .and_then(parse_year),
            isbn: fields::load_element(tree, element, "isbn"),
            sequences: fields::load_object_list(tree, element, "sequence"),
        }
    }

    /// Build a fresh `publish-info` element, or `None` when every field is
    /// empty; the caller then drops the original block.
    pub(crate) fn build(&self, tree: &mut XmlTree) -> Option<NodeId> {
        let element = tree.new_element("publish-info");
        fields::store_element(tree, element, "book-name", self.book_name.as_deref());
        fields::store_element(tree, element, "publisher", self.publisher.as_deref());
        fields::store_element(tree, element, "city", self.city.as_deref());
        if let Some(year) = self.year {
            fields::store_element(tree, element, "year", Some(&year.to_string()));
        }
        fields::store_element(tree, element, "isbn", self.isbn.as_deref());
        fields::store_object_list(tree, element, "sequence", &self.sequences);
        tree.children(element).next().is_some().then_some(element)
    }
}
