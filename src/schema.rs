//! Schema knowledge: the known-element catalog and the validator seam.

use std::collections::HashSet;

use crate::error::Result;

/// Element names from the FB2 2.0/2.1 schemas.
const FB2_ELEMENTS: &[&str] = &[
    "FictionBook",
    "stylesheet",
    "description",
    "title-info",
    "src-title-info",
    "document-info",
    "publish-info",
    "custom-info",
    "output",
    "part",
    "output-document-class",
    "body",
    "binary",
    "genre",
    "author",
    "book-title",
    "annotation",
    "keywords",
    "date",
    "coverpage",
    "lang",
    "src-lang",
    "translator",
    "sequence",
    "first-name",
    "middle-name",
    "last-name",
    "nickname",
    "home-page",
    "email",
    "id",
    "program-used",
    "src-url",
    "src-ocr",
    "version",
    "history",
    "book-name",
    "publisher",
    "city",
    "year",
    "isbn",
    "image",
    "title",
    "epigraph",
    "section",
    "p",
    "poem",
    "stanza",
    "v",
    "subtitle",
    "cite",
    "empty-line",
    "text-author",
    "strong",
    "emphasis",
    "style",
    "a",
    "strikethrough",
    "sub",
    "sup",
    "code",
    "table",
    "tr",
    "th",
    "td",
];

/// Element-validity oracle: answers whether a local name is a known schema
/// element. Used only for diagnostic collection during the repair pass;
/// unknown elements are never excised.
#[derive(Debug)]
pub struct ElementCatalog {
    names: HashSet<String>,
}

impl ElementCatalog {
    /// The built-in FB2 element set.
    pub fn fb2() -> Self {
        Self::from_names(FB2_ELEMENTS.iter().map(|s| s.to_string()))
    }

    pub fn from_names<I: IntoIterator<Item = String>>(names: I) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }

    pub fn contains(&self, local: &str) -> bool {
        self.names.contains(local)
    }
}

impl Default for ElementCatalog {
    fn default() -> Self {
        Self::fb2()
    }
}

/// Validates a serialized document against a compiled schema set.
///
/// No implementation ships with this crate; a failure returned here makes
/// the batch processor redirect output to the not-valid bucket instead of
/// rejecting the document.
pub trait SchemaValidator {
    fn validate(&self, document: &str) -> Result<()>;
}

impl<F> SchemaValidator for F
where
    F: Fn(&str) -> Result<()>,
{
    fn validate(&self, document: &str) -> Result<()> {
        self(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fb2_catalog_lookups() {
        let catalog = ElementCatalog::fb2();
        assert!(catalog.contains("p"));
        assert!(catalog.contains("title-info"));
        assert!(catalog.contains("empty-line"));
        assert!(!catalog.contains("blink"));
        assert!(!catalog.contains("P"));
    }

    #[test]
    fn test_custom_catalog() {
        let catalog = ElementCatalog::from_names(vec!["only".to_string()]);
        assert!(catalog.contains("only"));
        assert!(!catalog.contains("p"));
    }
}
