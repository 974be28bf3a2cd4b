//! Genre normalization table.
//!
//! FictionBook genre codes drifted across libraries over the years; the
//! transfer table maps legacy codes onto the canonical set and carries
//! localized display names. The table is built once at startup from a
//! `genrestransfer.xml` file and passed around by reference.

use std::collections::HashMap;
use std::path::Path;

use crate::encoding;
use crate::error::Result;
use crate::tree::XmlTree;

/// One canonical genre with its localized display names.
#[derive(Debug, Clone, Default)]
pub struct Genre {
    pub name: String,
    /// Display titles keyed by language code.
    pub descriptions: HashMap<String, String>,
}

/// Legacy-to-canonical genre code map. Every canonical code also maps to
/// itself, so a lookup hit does not imply the code was an alias.
#[derive(Debug, Clone, Default)]
pub struct GenreTable {
    genres: HashMap<String, Genre>,
    aliases: HashMap<String, String>,
}

impl GenreTable {
    /// A table with no entries. Remapping against it is a no-op.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read and decode a `genrestransfer.xml` file. The stock file ships in
    /// windows-1251; the decoder honors its XML declaration.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let decoded = encoding::decode(&bytes);
        Self::parse(&decoded.text)
    }

    /// Parse the transfer table from decoded XML text. The layout is
    /// `fbgenrestransfer/genre/subgenres/subgenre`, each subgenre carrying
    /// `genre-descr` (localized title) and `genre-alt` (legacy alias)
    /// children. Later duplicates win.
    pub fn parse(text: &str) -> Result<Self> {
        let tree = XmlTree::parse(text)?.tree;
        let mut table = Self::default();
        let Some(root) = tree.root_element() else {
            return Ok(table);
        };

        for node in tree.descendants(root) {
            if tree.local_name(node) != Some("subgenre") {
                continue;
            }
            let Some(value) = tree
                .attr(node, "value")
                .filter(|value| !value.is_empty())
                .map(str::to_string)
            else {
                continue;
            };

            let mut genre = Genre {
                name: value.clone(),
                ..Genre::default()
            };
            for child in tree.child_elements(node) {
                match tree.local_name(child) {
                    Some("genre-descr") => {
                        if let Some(lang) = tree.attr(child, "lang")
                            && let Some(title) = tree.attr(child, "title")
                        {
                            genre
                                .descriptions
                                .insert(lang.to_string(), title.to_string());
                        }
                    }
                    Some("genre-alt") => {
                        if let Some(alias) = tree.attr(child, "value")
                            && !alias.is_empty()
                        {
                            table.aliases.insert(alias.to_string(), value.clone());
                        }
                    }
                    _ => {}
                }
            }

            table.aliases.insert(value.clone(), value.clone());
            table.genres.insert(value.clone(), genre);
        }

        Ok(table)
    }

    /// Canonical code for `code`, when the table knows it. A known canonical
    /// code returns itself.
    pub fn canonical(&self, code: &str) -> Option<&str> {
        self.aliases.get(code).map(String::as_str)
    }

    /// Localized display title of a canonical code.
    pub fn description(&self, code: &str, lang: &str) -> Option<&str> {
        self.genres
            .get(code)?
            .descriptions
            .get(lang)
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.genres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genres.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "<fbgenrestransfer>\
        <genre name=\"sf\"><subgenres>\
        <subgenre value=\"sf\">\
        <genre-descr lang=\"en\" title=\"Science Fiction\"/>\
        <genre-descr lang=\"ru\" title=\"Фантастика\"/>\
        <genre-alt value=\"sf_classic\"/>\
        <genre-alt value=\"sf_history\"/>\
        </subgenre>\
        <subgenre value=\"sf_fantasy\">\
        <genre-descr lang=\"en\" title=\"Fantasy\"/>\
        <genre-alt value=\"fantasy\"/>\
        </subgenre>\
        </subgenres></genre>\
        </fbgenrestransfer>";

    #[test]
    fn test_aliases_and_identity() {
        let table = GenreTable::parse(TABLE).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.canonical("sf_classic"), Some("sf"));
        assert_eq!(table.canonical("sf_history"), Some("sf"));
        assert_eq!(table.canonical("fantasy"), Some("sf_fantasy"));
        assert_eq!(table.canonical("sf"), Some("sf"));
        assert_eq!(table.canonical("detective"), None);
    }

    #[test]
    fn test_descriptions() {
        let table = GenreTable::parse(TABLE).unwrap();
        assert_eq!(table.description("sf", "en"), Some("Science Fiction"));
        assert_eq!(table.description("sf", "ru"), Some("Фантастика"));
        assert_eq!(table.description("sf", "de"), None);
        assert_eq!(table.description("fantasy", "en"), None);
    }

    #[test]
    fn test_empty_table() {
        let table = GenreTable::empty();
        assert!(table.is_empty());
        assert_eq!(table.canonical("sf"), None);
    }

    #[test]
    fn test_load_decodes_declared_encoding() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"windows-1251\"?>");
        bytes.extend_from_slice(b"<fbgenrestransfer><genre><subgenres>");
        bytes.extend_from_slice(b"<subgenre value=\"sf\"><genre-descr lang=\"ru\" title=\"");
        // "Фантастика" in windows-1251.
        bytes.extend_from_slice(&[
            0xD4, 0xE0, 0xED, 0xF2, 0xE0, 0xF1, 0xF2, 0xE8, 0xEA, 0xE0,
        ]);
        bytes.extend_from_slice(b"\"/></subgenre></subgenres></genre></fbgenrestransfer>");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genrestransfer.xml");
        std::fs::write(&path, &bytes).unwrap();

        let table = GenreTable::load(&path).unwrap();
        assert_eq!(table.description("sf", "ru"), Some("Фантастика"));
    }
}
