//! The `title-info` record and its nested entry types.

use crate::tree::{NodeId, XmlTree};

use super::author::AuthorInfo;
use super::date::DateValue;
use super::fields::{self, InfoNode};

/// One `genre` entry: the code plus an optional `match` percentage.
/// Equality covers both, which is what genre de-duplication compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenreEntry {
    pub value: Option<String>,
    pub match_percent: Option<i32>,
}

impl GenreEntry {
    pub fn new(value: &str) -> Self {
        Self {
            value: Some(value.to_string()),
            match_percent: None,
        }
    }
}

impl InfoNode for GenreEntry {
    fn load(tree: &XmlTree, element: NodeId) -> Self {
        let text = tree.inner_text(element);
        let trimmed = text.trim();
        Self {
            value: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            match_percent: tree
                .attr(element, "match")
                .and_then(|raw| raw.trim().parse().ok()),
        }
    }

    fn store(&self, tree: &mut XmlTree, parent: NodeId, tag: &str) {
        if self.is_empty() {
            return;
        }
        let element = tree.new_element(tag);
        if let Some(value) = self.value.as_deref() {
            tree.set_element_text(element, value);
        }
        if let Some(percent) = self.match_percent {
            tree.set_attr(element, "match", &percent.to_string());
        }
        tree.append(parent, element);
    }

    fn is_empty(&self) -> bool {
        self.value.as_deref().is_none_or(str::is_empty)
    }
}

/// A `sequence` entry. Name and number live in attributes; entries nest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceInfo {
    pub name: Option<String>,
    pub number: Option<i32>,
    pub children: Vec<SequenceInfo>,
}

impl InfoNode for SequenceInfo {
    fn load(tree: &XmlTree, element: NodeId) -> Self {
        Self {
            name: tree
                .attr(element, "name")
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            number: tree
                .attr(element, "number")
                .and_then(|raw| raw.trim().parse().ok()),
            children: fields::load_object_list(tree, element, "sequence"),
        }
    }

    fn store(&self, tree: &mut XmlTree, parent: NodeId, tag: &str) {
        if self.is_empty() {
            return;
        }
        let element = tree.new_element(tag);
        tree.set_attr(element, "name", self.name.as_deref().unwrap_or(""));
        if let Some(number) = self.number {
            tree.set_attr(element, "number", &number.to_string());
        }
        fields::store_object_list(tree, element, "sequence", &self.children);
        tree.append(parent, element);
    }

    fn is_empty(&self) -> bool {
        self.name.as_deref().is_none_or(str::is_empty) && self.children.is_empty()
    }
}

/// The `title-info` / `src-title-info` record (same shape, two slots).
#[derive(Debug, Clone, Default)]
pub struct TitleInfo {
    pub genres: Vec<GenreEntry>,
    pub authors: Vec<AuthorInfo>,
    pub book_title: Option<String>,
    /// Passthrough subtree; re-parented verbatim on store.
    pub annotation: Option<NodeId>,
    pub keywords: Option<String>,
    pub date: Option<DateValue>,
    /// Passthrough subtree.
    pub coverpage: Option<NodeId>,
    pub lang: Option<String>,
    pub src_lang: Option<String>,
    pub translators: Vec<AuthorInfo>,
    pub sequences: Vec<SequenceInfo>,
}

impl TitleInfo {
    pub(crate) fn load(tree: &XmlTree, element: NodeId) -> Self {
        Self {
            genres: fields::load_object_list(tree, element, "genre"),
            authors: fields::load_object_list(tree, element, "author"),
            book_title: fields::load_required_element(tree, element, "book-title"),
            annotation: fields::load_subtree(tree, element, "annotation"),
            keywords: fields::load_element(tree, element, "keywords"),
            date: fields::load_object(tree, element, "date"),
            coverpage: fields::load_subtree(tree, element, "coverpage"),
            lang: fields::load_required_element(tree, element, "lang"),
            src_lang: fields::load_element(tree, element, "src-lang"),
            translators: fields::load_object_list(tree, element, "translator"),
            sequences: fields::load_object_list(tree, element, "sequence"),
        }
    }

    /// Build a fresh description child carrying this record, in canonical
    /// child order.
    pub(crate) fn build(&self, tree: &mut XmlTree, tag: &str) -> NodeId {
        let element = tree.new_element(tag);
        fields::store_object_list(tree, element, "genre", &self.genres);
        fields::store_object_list(tree, element, "author", &self.authors);
        fields::store_required_element(tree, element, "book-title", self.book_title.as_deref());
        fields::store_subtree(tree, element, self.annotation);
        fields::store_element(tree, element, "keywords", self.keywords.as_deref());
        if let Some(date) = &self.date {
            date.store(tree, element, "date");
        }
        fields::store_subtree(tree, element, self.coverpage);
        fields::store_required_element(tree, element, "lang", self.lang.as_deref());
        fields::store_element(tree, element, "src-lang", self.src_lang.as_deref());
        fields::store_object_list(tree, element, "translator", &self.translators);
        fields::store_object_list(tree, element, "sequence", &self.sequences);
        element
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_title(source: &str) -> (XmlTree, TitleInfo) {
        let parsed = XmlTree::parse(source).unwrap();
        let tree = parsed.tree;
        let root = tree.root_element().unwrap();
        let element = tree.find_child(root, "title-info").unwrap();
        let title = TitleInfo::load(&tree, element);
        (tree, title)
    }

    #[test]
    fn test_load_drops_empty_genres() {
        let (_, title) = load_title(
            "<d><title-info>\
             <genre/><genre>sf</genre><genre match=\"80\">detective</genre>\
             <book-title>T</book-title>\
             </title-info></d>",
        );
        assert_eq!(title.genres.len(), 2);
        assert_eq!(title.genres[0].value.as_deref(), Some("sf"));
        assert_eq!(title.genres[1].match_percent, Some(80));
    }

    #[test]
    fn test_load_nested_sequence() {
        let (_, title) = load_title(
            "<d><title-info>\
             <book-title>T</book-title>\
             <sequence name=\"Outer\" number=\"2\"><sequence name=\"Inner\"/></sequence>\
             </title-info></d>",
        );
        assert_eq!(title.sequences.len(), 1);
        let outer = &title.sequences[0];
        assert_eq!(outer.name.as_deref(), Some("Outer"));
        assert_eq!(outer.number, Some(2));
        assert_eq!(outer.children[0].name.as_deref(), Some("Inner"));
    }

    #[test]
    fn test_build_canonical_child_order() {
        let (mut tree, title) = load_title(
            "<d><title-info>\
             <lang>en</lang>\
             <book-title>T</book-title>\
             <author><last-name>S</last-name></author>\
             <genre>prose</genre>\
             <annotation><p>about</p></annotation>\
             </title-info></d>",
        );
        let doc = tree.document();
        let built = title.build(&mut tree, "title-info");
        tree.append(doc, built);

        let names: Vec<_> = tree
            .child_elements(built)
            .filter_map(|id| tree.local_name(id).map(str::to_string))
            .collect();
        assert_eq!(
            names,
            vec!["genre", "author", "book-title", "annotation", "lang"]
        );
        let annotation = tree.find_child(built, "annotation").unwrap();
        assert_eq!(tree.inner_text(annotation), "about");
    }

    #[test]
    fn test_genre_dedup_equality_covers_match() {
        let a = GenreEntry {
            value: Some("sf".to_string()),
            match_percent: Some(50),
        };
        let b = GenreEntry::new("sf");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
