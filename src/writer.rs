//! Two-part document serializer.
//!
//! The description (header) and the body are independently toggleable
//! between indented and compact layout. Compact layout emits no structural
//! whitespace but keeps one line per metadata block in the header and one
//! line per paragraph in the body, which is what legacy library tooling
//! expects. Everything outside the two regions (the root element, binaries)
//! is always indented.

use encoding_rs::UTF_8;
use log::warn;

use crate::encoding::{self, EncodingPlan};
use crate::error::{Error, Result};
use crate::model::FictionBook;
use crate::tree::{NodeId, XmlTree, local_name};

/// Layout switches for the serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriterOptions {
    /// Indent the description instead of the one-block-per-line layout.
    pub indent_header: bool,
    /// Indent the body instead of the one-paragraph-per-line layout.
    pub indent_body: bool,
}

/// Serialize a document to text, with an XML declaration naming `label` as
/// the encoding.
pub fn serialize(book: &FictionBook, label: &str, options: &WriterOptions) -> String {
    let tree = book.tree();
    let mut emitter = Emitter {
        tree,
        out: String::with_capacity(4096),
        options: *options,
    };
    emitter
        .out
        .push_str(&format!("<?xml version=\"1.0\" encoding=\"{label}\"?>\n"));
    for child in tree.children(tree.document()) {
        emitter.node(child, 0, Region::Root);
    }
    emitter.out
}

/// Serialize and encode in one step, retrying once with UTF-8 when the
/// chosen encoding overflows its substitution budget. The retry re-runs the
/// serializer so the declaration names the final encoding; UTF-8 itself
/// cannot overflow, so there is no third attempt.
pub fn encode_document(
    book: &FictionBook,
    plan: &EncodingPlan,
    options: &WriterOptions,
) -> Result<Vec<u8>> {
    let text = serialize(book, plan.label(), options);
    match encoding::encode(&text, plan) {
        Err(Error::FallbackOverflow(label)) if plan.encoding != UTF_8 => {
            warn!("too much text unmappable to {label}, rewriting as UTF-8");
            let retry = EncodingPlan::utf8();
            let text = serialize(book, retry.label(), options);
            encoding::encode(&text, &retry)
        }
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Root,
    Header,
    Body,
}

struct Emitter<'a> {
    tree: &'a XmlTree,
    out: String,
    options: WriterOptions,
}

impl Emitter<'_> {
    fn indented(&self, region: Region) -> bool {
        match region {
            Region::Root => true,
            Region::Header => self.options.indent_header,
            Region::Body => self.options.indent_body,
        }
    }

    fn push_indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
    }

    fn break_line(&mut self) {
        if !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn node(&mut self, id: NodeId, depth: usize, region: Region) {
        if self.tree.is_element(id) {
            self.element(id, depth, region);
        } else if let Some(text) = self.tree.text(id) {
            self.out.push_str(&escape_text(text));
        } else if let Some(comment) = self.tree.comment(id) {
            let indented = self.indented(region);
            if indented {
                self.break_line();
                self.push_indent(depth);
            }
            self.out.push_str("<!--");
            self.out.push_str(comment);
            self.out.push_str("-->");
            if indented {
                self.out.push('\n');
            }
        }
    }

    fn element(&mut self, id: NodeId, depth: usize, region: Region) {
        let Some(name) = self.tree.element_name(id) else {
            return;
        };
        let local = local_name(name);
        let region = enter(region, local);
        let indented = self.indented(region);

        if indented {
            self.break_line();
            self.push_indent(depth);
        }
        self.open_tag(id, name);

        if self.tree.children(id).next().is_none() {
            self.out.push_str("/>");
            if indented {
                self.out.push('\n');
            }
            return;
        }
        self.out.push('>');

        let mixed = self
            .tree
            .children(id)
            .any(|child| self.tree.text(child).is_some());
        if mixed {
            for child in self.tree.children(id) {
                self.inline(child, region);
            }
        } else if indented {
            self.out.push('\n');
            for child in self.tree.children(id) {
                self.node(child, depth + 1, region);
            }
            self.break_line();
            self.push_indent(depth);
        } else {
            for child in self.tree.children(id) {
                self.node(child, depth, region);
            }
        }

        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
        if indented {
            self.out.push('\n');
        }
        self.layout_break(region, local);
    }

    /// Mixed content: no structural whitespace at any depth.
    fn inline(&mut self, id: NodeId, region: Region) {
        if let Some(text) = self.tree.text(id) {
            self.out.push_str(&escape_text(text));
        } else if let Some(comment) = self.tree.comment(id) {
            self.out.push_str("<!--");
            self.out.push_str(comment);
            self.out.push_str("-->");
        } else if let Some(name) = self.tree.element_name(id) {
            self.open_tag(id, name);
            if self.tree.children(id).next().is_none() {
                self.out.push_str("/>");
                return;
            }
            self.out.push('>');
            for child in self.tree.children(id) {
                self.inline(child, region);
            }
            self.out.push_str("</");
            self.out.push_str(name);
            self.out.push('>');
            self.layout_break(region, local_name(name));
        }
    }

    fn open_tag(&mut self, id: NodeId, name: &str) {
        self.out.push('<');
        self.out.push_str(name);
        for attr in self.tree.attrs(id) {
            self.out.push(' ');
            self.out.push_str(&attr.name);
            self.out.push_str("=\"");
            self.out.push_str(&escape_attr(&attr.value));
            self.out.push('"');
        }
    }

    /// Readability line breaks after selected closing tags in compact
    /// layout, and the line that always follows the description.
    fn layout_break(&mut self, region: Region, local: &str) {
        let break_after = match region {
            Region::Header if !self.options.indent_header => matches!(
                local,
                "title-info"
                    | "src-title-info"
                    | "document-info"
                    | "publish-info"
                    | "custom-info"
                    | "output"
            ),
            Region::Body if !self.options.indent_body => {
                matches!(local, "image" | "title" | "epigraph" | "section" | "p")
            }
            _ => false,
        };
        if break_after {
            self.out.push('\n');
        }
        if local == "description" {
            self.out.push('\n');
        }
    }
}

fn enter(region: Region, local: &str) -> Region {
    match region {
        Region::Root if local == "description" => Region::Header,
        Region::Root if local == "body" => Region::Body,
        other => other,
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}
