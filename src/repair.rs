//! Document repair pass.
//!
//! One forward sweep per document: header repair (field completion, genre
//! remapping, document-info synthesis, id management), character-level text
//! scrubbing, structural flattening of nested paragraphs, the status stamp,
//! and finally the version increment. No backtracking; each stage records
//! what it touched in the document's [`ModificationKind`] bitset.

use log::debug;

use crate::error::Result;
use crate::genres::GenreTable;
use crate::model::{FictionBook, ModificationKind, ProcessingStatus};
use crate::schema::ElementCatalog;
use crate::tree::NodeId;

/// Policies for one repair pass. Borrowed tables are built once at startup
/// and shared across the batch.
#[derive(Debug, Clone, Copy)]
pub struct RepairOptions<'a> {
    /// Genre remapping table. `None` disables remapping and de-duplication.
    pub genres: Option<&'a GenreTable>,
    /// Element-validity oracle for the diagnostic audit. `None` skips it.
    pub catalog: Option<&'a ElementCatalog>,
    /// Archive any existing id under `previous-id` and recompute.
    pub regenerate_id: bool,
    /// Bump the document version according to what the pass touched.
    pub increment_version: bool,
    /// Re-repair documents already stamped `Passed`.
    pub force: bool,
}

impl Default for RepairOptions<'_> {
    fn default() -> Self {
        Self {
            genres: None,
            catalog: None,
            regenerate_id: false,
            increment_version: true,
            force: false,
        }
    }
}

/// Run the full repair pass over a parsed document.
///
/// A document already stamped `Passed` is left alone unless `force` is set;
/// the version increment still runs so that markup recoveries noticed during
/// the parse are reflected even on that fast path.
pub fn repair(book: &mut FictionBook, options: &RepairOptions<'_>) -> Result<()> {
    let passed = book.status() == ProcessingStatus::Passed && !options.force;
    if !passed {
        book.check_document_header(options.genres, options.regenerate_id)?;
        scrub_text(book, options.catalog);
        flatten_paragraphs(book);
        book.set_status(ProcessingStatus::Passed);
    }
    apply_version_increment(book, options.increment_version)
}

/// Replace control characters that survive decoding but are not legal in
/// document text: `U+0001..=U+0008` become `-`, the remaining C0 controls
/// except tab/LF/CR become a space. The same walk audits element names
/// against the catalog; unrecognized elements are reported, never removed.
fn scrub_text(book: &mut FictionBook, catalog: Option<&ElementCatalog>) {
    let root = book.root();
    let mut text_nodes: Vec<NodeId> = Vec::new();
    let mut unknown: Vec<String> = Vec::new();

    let tree = book.tree();
    for id in std::iter::once(root).chain(tree.descendants(root)) {
        if let Some(name) = tree.local_name(id) {
            if let Some(catalog) = catalog
                && !catalog.contains(name)
            {
                unknown.push(name.to_string());
            }
        } else if tree.text(id).is_some() {
            text_nodes.push(id);
        }
    }

    if !unknown.is_empty() {
        debug!(
            "{} element(s) outside the FB2 vocabulary: {}",
            unknown.len(),
            unknown.join(", ")
        );
    }

    let mut changed = false;
    for id in text_nodes {
        let tree = book.tree_mut();
        let Some(text) = tree.text(id) else { continue };
        if !text.chars().any(is_forbidden) {
            continue;
        }
        let cleaned: String = text
            .chars()
            .map(|ch| match ch {
                '\u{01}'..='\u{08}' => '-',
                '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' => ' ',
                other => other,
            })
            .collect();
        tree.set_text(id, cleaned);
        changed = true;
    }
    if changed {
        book.mark(ModificationKind::TEXT);
    }
}

fn is_forbidden(ch: char) -> bool {
    matches!(ch, '\u{01}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}')
}

/// Unwrap paragraphs nested inside paragraphs: the inner `p` becomes the
/// following sibling of its parent. Walking the collected list in reverse
/// document order unwinds arbitrarily deep chains without revisiting moved
/// nodes.
fn flatten_paragraphs(book: &mut FictionBook) {
    let scope = book.book();
    let paragraphs: Vec<NodeId> = {
        let tree = book.tree();
        tree.descendants(scope)
            .filter(|&id| tree.local_name(id) == Some("p"))
            .collect()
    };

    let mut moved = false;
    for &node in paragraphs.iter().rev() {
        let parent = book.tree().parent(node);
        let Some(parent) = parent else { continue };
        if book.tree().local_name(parent) != Some("p") {
            continue;
        }
        let tree = book.tree_mut();
        tree.detach(node);
        tree.insert_after(parent, node);
        moved = true;
    }
    if moved {
        book.mark(ModificationKind::BODY);
    }
}

/// Add the largest applicable increment on top of the current version:
/// `DESCRIPTION` 0.01, `BODY` 0.1, `TEXT` 0.5. A pass that touched nothing
/// writes nothing. `DOCUMENT_INFO` alone contributes no increment; a freshly
/// synthesized record keeps its 0 base.
fn apply_version_increment(book: &mut FictionBook, increment: bool) -> Result<()> {
    if !increment {
        return Ok(());
    }
    let kinds = book.modifications();
    let mut bump = 0.0f32;
    if kinds.contains(ModificationKind::DESCRIPTION) {
        bump = 0.01;
    }
    if kinds.contains(ModificationKind::BODY) {
        bump = 0.1;
    }
    if kinds.contains(ModificationKind::TEXT) {
        bump = 0.5;
    }
    if bump > 0.0 {
        let version = book.version().unwrap_or(0.0);
        book.set_version(version + bump)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::format_version;

    fn repaired(source: &str, options: &RepairOptions<'_>) -> FictionBook {
        let mut book = FictionBook::parse(source).unwrap();
        repair(&mut book, options).unwrap();
        book
    }

    fn version_text(book: &FictionBook) -> String {
        let tree = book.tree();
        let info = tree.find_child(book.description(), "document-info").unwrap();
        let version = tree.find_child(info, "version").unwrap();
        tree.inner_text(version)
    }

    #[test]
    fn test_end_to_end_field_completion_and_version() {
        let book = repaired(
            "<FictionBook><description>\
             <title-info>\
             <author><last-name>Smith</last-name></author>\
             <book-title>Test</book-title>\
             </title-info>\
             </description><body><p>text</p></body></FictionBook>",
            &RepairOptions::default(),
        );

        assert_eq!(book.title_info.lang.as_deref(), Some("ru"));
        assert_eq!(book.title_info.genres[0].value.as_deref(), Some("nonfiction"));
        assert_eq!(book.title_info.authors[0].first_name.as_deref(), Some(""));
        assert!(book.document_id().unwrap().starts_with("fb2-"));
        assert_eq!(book.status(), ProcessingStatus::Passed);
        // Synthesized record starts at 0; only DESCRIPTION contributes here.
        assert_eq!(version_text(&book), "0.01");
    }

    #[test]
    fn test_scrub_marks_text() {
        let book = repaired(
            "<FictionBook><description>\
             <title-info><book-title>T</book-title></title-info>\
             </description><body><p>a\u{01}b\u{0B}c</p></body></FictionBook>",
            &RepairOptions::default(),
        );

        assert!(book.modifications().contains(ModificationKind::TEXT));
        let tree = book.tree();
        let body = tree.find_child(book.book(), "body").unwrap();
        let p = tree.find_child(body, "p").unwrap();
        assert_eq!(tree.inner_text(p), "a-b c");
        // TEXT dominates the increment.
        assert_eq!(version_text(&book), "0.5");
    }

    #[test]
    fn test_tab_and_newline_survive_scrub() {
        let book = repaired(
            "<FictionBook><description>\
             <title-info><book-title>T</book-title></title-info>\
             </description><body><p>a\tb\nc</p></body></FictionBook>",
            &RepairOptions::default(),
        );
        assert!(!book.modifications().contains(ModificationKind::TEXT));
    }

    #[test]
    fn test_nested_paragraph_becomes_following_sibling() {
        let book = repaired(
            "<FictionBook><description>\
             <title-info><book-title>T</book-title></title-info>\
             </description><body><section>\
             <p>outer<p>inner</p></p>\
             </section></body></FictionBook>",
            &RepairOptions::default(),
        );

        assert!(book.modifications().contains(ModificationKind::BODY));
        let tree = book.tree();
        let body = tree.find_child(book.book(), "body").unwrap();
        let section = tree.find_child(body, "section").unwrap();
        let texts: Vec<String> = tree
            .child_elements(section)
            .map(|id| tree.inner_text(id))
            .collect();
        assert_eq!(texts, vec!["outer", "inner"]);
    }

    #[test]
    fn test_sibling_nested_paragraphs_hoist_in_order() {
        let book = repaired(
            "<FictionBook><description>\
             <title-info><book-title>T</book-title></title-info>\
             </description><body><section>\
             <p>a<p>b</p><p>c</p></p>\
             </section></body></FictionBook>",
            &RepairOptions::default(),
        );

        let tree = book.tree();
        let body = tree.find_child(book.book(), "body").unwrap();
        let section = tree.find_child(body, "section").unwrap();
        let texts: Vec<String> = tree
            .child_elements(section)
            .map(|id| tree.inner_text(id))
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_passed_document_skipped_without_force() {
        let source = "<FictionBook><description>\
             <title-info><book-title>T</book-title></title-info>\
             <custom-info info-type=\"fb2mend-status\">Passed</custom-info>\
             </description><body><p>x\u{01}y</p></body></FictionBook>";

        let book = repaired(source, &RepairOptions::default());
        // No header check ran: no document-info was synthesized and the
        // control character is still in place.
        assert!(book.document_info.is_none());
        let tree = book.tree();
        let body = tree.find_child(book.book(), "body").unwrap();
        let p = tree.find_child(body, "p").unwrap();
        assert_eq!(tree.inner_text(p), "x\u{01}y");

        let forced = repaired(
            source,
            &RepairOptions {
                force: true,
                ..RepairOptions::default()
            },
        );
        assert!(forced.document_info.is_some());
    }

    #[test]
    fn test_increment_disabled_leaves_version() {
        let book = repaired(
            "<FictionBook><description>\
             <title-info><book-title>T</book-title><lang>en</lang>\
             <genre>prose</genre></title-info>\
             <document-info>\
             <author><nickname>scan</nickname></author>\
             <date value=\"2004-01-05\">2004</date>\
             <id>fb2-already</id><version>1.1</version>\
             </document-info>\
             </description><body><p>t\u{01}</p></body></FictionBook>",
            &RepairOptions {
                increment_version: false,
                ..RepairOptions::default()
            },
        );
        assert_eq!(version_text(&book), "1.1");
    }

    #[test]
    fn test_increment_takes_maximum_not_sum() {
        let book = repaired(
            "<FictionBook><description>\
             <title-info><book-title>T</book-title>\
             <genre>prose</genre></title-info>\
             <document-info>\
             <author><nickname>scan</nickname></author>\
             <date value=\"2004-01-05\">2004</date>\
             <id>fb2-already</id><version>1</version>\
             </document-info>\
             </description><body><p>t\u{01}</p></body></FictionBook>",
            &RepairOptions::default(),
        );
        // DESCRIPTION (missing lang) and TEXT both fired; only 0.5 applies.
        assert_eq!(version_text(&book), "1.5");
    }

    #[test]
    fn test_unchanged_document_not_bumped() {
        let source = "<FictionBook><description>\
             <title-info>\
             <genre>prose</genre>\
             <author><first-name>A</first-name><last-name>B</last-name></author>\
             <book-title>T</book-title><lang>en</lang>\
             </title-info>\
             <document-info>\
             <author><nickname>scan</nickname></author>\
             <date value=\"2004-01-05\">2004</date>\
             <id>fb2-already</id><version>1</version>\
             </document-info>\
             </description><body><p>clean</p></body></FictionBook>";

        let book = repaired(source, &RepairOptions::default());
        assert_eq!(version_text(&book), "1");
        assert!(book.modifications().is_empty());
    }

    #[test]
    fn test_format_version_used_for_bumps() {
        assert_eq!(format_version(1.0 + 0.5), "1.5");
        assert_eq!(format_version(0.0 + 0.01), "0.01");
        assert_eq!(format_version(1.1 + 0.1), "1.2");
    }
}
