//! Typed document model over the arena tree.
//!
//! [`FictionBook`] wraps one parsed document, projects its description
//! blocks into typed records, and owns the header repair that rewrites them
//! in place. Body repairs (text scrubbing, paragraph flattening) live in
//! `crate::repair`, which drives this model.

pub mod author;
pub mod custom;
pub mod date;
pub mod document;
mod fields;
pub mod publish;
pub mod title;

use std::sync::LazyLock;

use bitflags::bitflags;
use chrono::{DateTime, Local};
use regex::Regex;

use crate::error::{Error, Result};
use crate::genres::GenreTable;
use crate::tree::{NodeId, ParsedDocument, XmlTree};

pub use author::AuthorInfo;
pub use custom::{
    CustomInfo, LIBRUSEC_INFO_TYPE, PREVIOUS_ID_INFO_TYPE, PROGRAM_NAME, RESERVED_INFO_TYPES,
    STATUS_INFO_TYPE,
};
pub use date::DateValue;
pub use document::{DocumentInfo, format_version};
pub use publish::PublishInfo;
pub use title::{GenreEntry, SequenceInfo, TitleInfo};

const DEFAULT_GENRE: &str = "nonfiction";
const DEFAULT_LANG: &str = "ru";

/// Timestamp-shaped ids left behind by the LibRusEc kit,
/// e.g. `Mon Jan 5 12:31:48 2004`.
static LIBRUSEC_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w{3}\s\w{3}\s\d{1,2}\s\d{2}:\d{2}:\d{2}\s\d{4}$").expect("valid regex")
});

bitflags! {
    /// Which repair categories touched a document. Empty means the pass was
    /// a no-op and the container timestamp may be preserved.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModificationKind: u8 {
        /// `document-info` synthesized, or its version slot created.
        const DOCUMENT_INFO = 1 << 0;
        /// Description metadata changed.
        const DESCRIPTION = 1 << 1;
        /// Document structure changed (markup recovery, flattening).
        const BODY = 1 << 2;
        /// Character-level text scrubbing.
        const TEXT = 1 << 3;
    }
}

/// Pipeline progress marker persisted inside the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingStatus {
    #[default]
    None,
    Passed,
}

/// One FictionBook document: the arena tree plus typed projections of its
/// description blocks. Projections are working copies; the header repair
/// mutates them and then stores them back over the original elements.
#[derive(Debug)]
pub struct FictionBook {
    tree: XmlTree,
    root: NodeId,
    book: NodeId,
    description: NodeId,
    title_info_node: NodeId,
    src_title_info_node: Option<NodeId>,
    document_info_node: Option<NodeId>,
    publish_info_node: Option<NodeId>,
    pub title_info: TitleInfo,
    pub src_title_info: Option<TitleInfo>,
    pub document_info: Option<DocumentInfo>,
    pub publish_info: Option<PublishInfo>,
    custom_infos: Vec<CustomInfo>,
    status: ProcessingStatus,
    modifications: ModificationKind,
    markup_errors: u32,
    container_date: DateTime<Local>,
}

impl FictionBook {
    /// Parse decoded text and project the description. Fails with
    /// `InvalidFormat` when the mandatory `description`/`title-info` blocks
    /// are missing.
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_parsed(XmlTree::parse(text)?)
    }

    fn from_parsed(parsed: ParsedDocument) -> Result<Self> {
        let ParsedDocument { tree, markup_errors } = parsed;

        let root = tree
            .root_element()
            .ok_or_else(|| Error::InvalidFormat("document has no root element".to_string()))?;
        let book = std::iter::once(root)
            .chain(tree.descendants(root))
            .find(|&id| tree.local_name(id) == Some("FictionBook"))
            .ok_or_else(|| Error::InvalidFormat("no FictionBook element".to_string()))?;
        let description = tree
            .find_child(book, "description")
            .ok_or_else(|| Error::InvalidFormat("description block missing".to_string()))?;
        let title_info_node = tree
            .find_child(description, "title-info")
            .ok_or_else(|| Error::InvalidFormat("title-info block missing".to_string()))?;

        let title_info = TitleInfo::load(&tree, title_info_node);
        let src_title_info_node = tree.find_child(description, "src-title-info");
        let src_title_info = src_title_info_node.map(|node| TitleInfo::load(&tree, node));
        let document_info_node = tree.find_child(description, "document-info");
        let document_info = document_info_node.map(|node| DocumentInfo::load(&tree, node));
        let publish_info_node = tree.find_child(description, "publish-info");
        let publish_info = publish_info_node.map(|node| PublishInfo::load(&tree, node));

        let mut status = ProcessingStatus::None;
        let mut custom_infos = Vec::new();
        for node in tree.child_elements(description) {
            if tree.local_name(node) != Some("custom-info") {
                continue;
            }
            let info = CustomInfo::load(&tree, node);
            match info.info_type.as_deref() {
                Some(STATUS_INFO_TYPE) => {
                    if info.text.eq_ignore_ascii_case("passed") {
                        status = ProcessingStatus::Passed;
                    }
                }
                Some(reserved) if RESERVED_INFO_TYPES.contains(&reserved) => {}
                _ => custom_infos.push(info),
            }
        }

        let mut modifications = ModificationKind::empty();
        if markup_errors > 0 {
            modifications |= ModificationKind::BODY;
        }

        Ok(Self {
            tree,
            root,
            book,
            description,
            title_info_node,
            src_title_info_node,
            document_info_node,
            publish_info_node,
            title_info,
            src_title_info,
            document_info,
            publish_info,
            custom_infos,
            status,
            modifications,
            markup_errors,
            container_date: Local::now(),
        })
    }

    pub fn tree(&self) -> &XmlTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut XmlTree {
        &mut self.tree
    }

    /// Root element of the document.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The `FictionBook` element (normally the root itself).
    pub fn book(&self) -> NodeId {
        self.book
    }

    pub fn description(&self) -> NodeId {
        self.description
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    pub fn modifications(&self) -> ModificationKind {
        self.modifications
    }

    pub fn mark(&mut self, kind: ModificationKind) {
        self.modifications |= kind;
    }

    /// Markup errors the lenient parser recovered from.
    pub fn markup_errors(&self) -> u32 {
        self.markup_errors
    }

    /// Non-reserved custom-info entries, in document order.
    pub fn custom_infos(&self) -> &[CustomInfo] {
        &self.custom_infos
    }

    pub fn container_date(&self) -> DateTime<Local> {
        self.container_date
    }

    pub fn set_container_date(&mut self, date: DateTime<Local>) {
        self.container_date = date;
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_info.as_ref().and_then(|info| info.id.as_deref())
    }

    pub fn version(&self) -> Option<f32> {
        self.document_info.as_ref().and_then(|info| info.version)
    }

    /// Persist the processing status as a reserved custom-info entry.
    /// Writes only on change.
    pub fn set_status(&mut self, status: ProcessingStatus) {
        if self.status == status {
            return;
        }
        let text = match status {
            ProcessingStatus::None => "None",
            ProcessingStatus::Passed => "Passed",
        };
        write_custom_info(&mut self.tree, self.description, STATUS_INFO_TYPE, text);
        self.status = status;
    }

    /// Rewrite the stored version. Writes only on change; the version element
    /// must already exist in the tree (the header store guarantees one), so a
    /// miss is a format error.
    pub fn set_version(&mut self, version: f32) -> Result<()> {
        if self.version() == Some(version) {
            return Ok(());
        }
        let info = self
            .document_info
            .as_mut()
            .ok_or_else(|| Error::InvalidFormat("document-info missing".to_string()))?;
        info.version = Some(version);
        let element = self
            .document_info_node
            .and_then(|node| self.tree.find_child(node, "version"))
            .ok_or_else(|| Error::InvalidFormat("version element missing".to_string()))?;
        let text = format_version(version);
        self.tree.set_element_text(element, &text);
        Ok(())
    }

    /// Header repair: field completion for both title blocks, genre
    /// remapping and de-duplication (when a table is supplied), document-info
    /// synthesis or validation with id management, then the store-back that
    /// rewrites the description children in place.
    pub fn check_document_header(
        &mut self,
        genres: Option<&GenreTable>,
        regenerate_id: bool,
    ) -> Result<()> {
        let fallback = self
            .publish_info
            .as_ref()
            .and_then(|publish| publish.book_name.clone())
            .filter(|name| !name.is_empty());
        check_title_block(
            &mut self.title_info,
            fallback.as_deref(),
            &mut self.modifications,
        )?;

        if self.src_title_info.is_some() {
            let fallback = self
                .publish_info
                .as_ref()
                .and_then(|publish| publish.book_name.clone())
                .filter(|name| !name.is_empty())
                .or_else(|| {
                    self.title_info
                        .book_title
                        .clone()
                        .filter(|title| !title.is_empty())
                });
            if let Some(src) = self.src_title_info.as_mut() {
                check_title_block(src, fallback.as_deref(), &mut self.modifications)?;
            }
        }

        if let Some(table) = genres {
            self.map_genres(table);
        }

        self.check_document_info(regenerate_id);
        self.store_description();
        Ok(())
    }

    fn map_genres(&mut self, table: &GenreTable) {
        let blocks = [Some(&mut self.title_info), self.src_title_info.as_mut()];
        for block in blocks.into_iter().flatten() {
            for genre in &mut block.genres {
                // An already-canonical code is not a repair; only a real
                // alias replacement counts as a modification.
                if let Some(value) = genre.value.as_deref()
                    && let Some(canonical) = table.canonical(value)
                    && canonical != value
                {
                    genre.value = Some(canonical.to_string());
                    self.modifications |= ModificationKind::DESCRIPTION;
                }
            }

            // Collapse duplicates, first occurrence wins. Not counted as a
            // modification on its own.
            let mut seen: Vec<GenreEntry> = Vec::with_capacity(block.genres.len());
            for genre in block.genres.drain(..) {
                if !seen.contains(&genre) {
                    seen.push(genre);
                }
            }
            block.genres = seen;
        }
    }

    fn check_document_info(&mut self, regenerate_id: bool) {
        let today = Local::now().date_naive();

        let Some(info) = self.document_info.as_mut() else {
            let text = self.tree.inner_text(self.root);
            self.document_info = Some(DocumentInfo {
                authors: vec![AuthorInfo::from_nickname(PROGRAM_NAME)],
                program_used: Some(PROGRAM_NAME.to_string()),
                date: Some(DateValue::from_date(today)),
                id: Some(compute_document_id(&text)),
                version: Some(0.0),
                ..DocumentInfo::default()
            });
            self.modifications |= ModificationKind::DOCUMENT_INFO;
            return;
        };

        for author in &mut info.authors {
            if check_author(author) {
                self.modifications |= ModificationKind::DESCRIPTION;
            }
        }

        if info.date.is_none() {
            info.date = Some(DateValue::from_date(today));
            self.modifications |= ModificationKind::DESCRIPTION;
        }

        if info.version.is_none() {
            info.version = Some(0.0);
            self.modifications |= ModificationKind::DOCUMENT_INFO;
        }

        if !regenerate_id {
            let program = info.program_used.as_deref().unwrap_or("");
            if program.to_lowercase().contains("librusec kit")
                && let Some(id) = info.id.clone().filter(|id| !id.is_empty())
                && LIBRUSEC_ID_PATTERN.is_match(&id)
                && find_custom_info(&self.tree, self.description, LIBRUSEC_INFO_TYPE).is_none()
            {
                write_custom_info(&mut self.tree, self.description, LIBRUSEC_INFO_TYPE, &id);
                info.id = None;
                self.modifications |= ModificationKind::DESCRIPTION;
            }
        } else if let Some(id) = info.id.clone().filter(|id| !id.is_empty()) {
            write_custom_info(&mut self.tree, self.description, PREVIOUS_ID_INFO_TYPE, &id);
            info.id = None;
            self.modifications |= ModificationKind::DESCRIPTION;
        }

        if info.id.as_deref().is_none_or(str::is_empty) {
            let text = self.tree.inner_text(self.root);
            info.id = Some(compute_document_id(&text));
            self.modifications |= ModificationKind::DESCRIPTION;
        }

        for publisher in &mut info.publishers {
            if check_author(publisher) {
                self.modifications |= ModificationKind::DESCRIPTION;
            }
        }
    }

    /// Rewrite the description children from the typed views, keeping each
    /// block's original position. A missing `document-info` is inserted after
    /// the (source-)title block; an empty `publish-info` is dropped.
    /// Custom-info entries are left untouched.
    fn store_description(&mut self) {
        let new_title = self.title_info.build(&mut self.tree, "title-info");
        self.tree.replace(self.title_info_node, new_title);
        self.title_info_node = new_title;

        if let Some(src) = &self.src_title_info {
            let new_src = src.build(&mut self.tree, "src-title-info");
            if let Some(old) = self.src_title_info_node {
                self.tree.replace(old, new_src);
            }
            self.src_title_info_node = Some(new_src);
        }

        if let Some(info) = &self.document_info {
            let new_info = info.build(&mut self.tree);
            match self.document_info_node {
                Some(old) => self.tree.replace(old, new_info),
                None => {
                    let anchor = self.src_title_info_node.unwrap_or(self.title_info_node);
                    self.tree.insert_after(anchor, new_info);
                }
            }
            self.document_info_node = Some(new_info);
        }

        if let Some(publish) = &self.publish_info
            && let Some(old) = self.publish_info_node
        {
            match publish.build(&mut self.tree) {
                Some(new_publish) => {
                    self.tree.replace(old, new_publish);
                    self.publish_info_node = Some(new_publish);
                }
                None => {
                    self.tree.detach(old);
                    self.publish_info_node = None;
                }
            }
        }
    }
}

/// Field completion for one title block.
fn check_title_block(
    block: &mut TitleInfo,
    fallback_title: Option<&str>,
    modifications: &mut ModificationKind,
) -> Result<()> {
    if block.genres.is_empty() {
        block.genres.push(GenreEntry::new(DEFAULT_GENRE));
        *modifications |= ModificationKind::DESCRIPTION;
    }

    for author in &mut block.authors {
        if check_author(author) {
            *modifications |= ModificationKind::DESCRIPTION;
        }
    }

    if block.book_title.is_none() {
        match fallback_title {
            Some(title) => {
                block.book_title = Some(title.to_string());
                *modifications |= ModificationKind::DESCRIPTION;
            }
            None => {
                return Err(Error::InvalidFormat(
                    "book title missing and no fallback available".to_string(),
                ));
            }
        }
    }

    if block.lang.is_none() {
        block.lang = Some(DEFAULT_LANG.to_string());
        *modifications |= ModificationKind::DESCRIPTION;
    }

    for translator in &mut block.translators {
        if check_author(translator) {
            *modifications |= ModificationKind::DESCRIPTION;
        }
    }

    Ok(())
}

/// Name invariant: if exactly one of {first, last} is present the other
/// becomes an explicit empty string; if none of {first, last, nick} carry
/// text, the nickname defaults to the program sentinel. Returns whether
/// anything changed.
fn check_author(author: &mut AuthorInfo) -> bool {
    if author.first_name.is_none() && author.last_name.is_some() {
        author.first_name = Some(String::new());
        true
    } else if author.first_name.is_some() && author.last_name.is_none() {
        author.last_name = Some(String::new());
        true
    } else if is_blank(&author.first_name)
        && is_blank(&author.last_name)
        && is_blank(&author.nickname)
    {
        author.nickname = Some(PROGRAM_NAME.to_string());
        true
    } else {
        false
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(str::is_empty)
}

/// Content-derived document id: `fb2-` plus the uppercase-hex MD5 of the
/// document's visible text, grouped 8-4-4-4-12.
fn compute_document_id(text: &str) -> String {
    let digest = md5::compute(text);
    let mut id = String::with_capacity(40);
    id.push_str("fb2-");
    for (index, byte) in digest.0.iter().enumerate() {
        if matches!(index, 4 | 6 | 8 | 10) {
            id.push('-');
        }
        id.push_str(&format!("{byte:02X}"));
    }
    id
}

fn find_custom_info(tree: &XmlTree, description: NodeId, info_type: &str) -> Option<NodeId> {
    tree.child_elements(description)
        .filter(|&node| tree.local_name(node) == Some("custom-info"))
        .find(|&node| tree.attr(node, "info-type") == Some(info_type))
}

/// Set the text of the reserved custom-info entry with the given type,
/// creating it at the end of the description when absent.
fn write_custom_info(tree: &mut XmlTree, description: NodeId, info_type: &str, text: &str) {
    let node = match find_custom_info(tree, description, info_type) {
        Some(node) => node,
        None => {
            let element = tree.new_element("custom-info");
            tree.set_attr(element, "info-type", info_type);
            tree.append(description, element);
            element
        }
    };
    tree.set_element_text(node, text);
}
