//! Arena-based XML tree for FictionBook documents.
//!
//! Nodes live in a contiguous vector and refer to each other by index, so
//! structural repairs (detaching and reinserting subtrees) are plain index
//! reassignments with no dangling-reference risk. Detached subtrees stay
//! allocated until the whole tree is dropped.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{Error, Result};

/// Unique identifier for a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Sentinel value for no node.
    const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }

    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }
}

/// XML attribute.
#[derive(Debug, Clone)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeData {
    /// Document root. Exactly one per tree, holds the root element plus any
    /// stray top-level comments.
    Document,
    /// Element with its qualified name as written in the source.
    Element {
        name: String,
        attrs: Vec<Attr>,
        /// True when the source used a self-closing tag. Field loading
        /// treats self-closed elements as absent (see `model::fields`).
        self_closed: bool,
    },
    Text(String),
    Comment(String),
}

/// A node in the arena.
#[derive(Debug)]
pub struct Node {
    pub data: NodeData,
    parent: NodeId,
    first_child: NodeId,
    last_child: NodeId,
    prev_sibling: NodeId,
    next_sibling: NodeId,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

/// Result of a lenient parse: the tree plus the number of markup errors the
/// parser recovered from (mismatched or stray end tags, unclosed elements,
/// unknown entity references).
pub struct ParsedDocument {
    pub tree: XmlTree,
    pub markup_errors: u32,
}

/// Arena XML tree.
#[derive(Debug)]
pub struct XmlTree {
    nodes: Vec<Node>,
    document: NodeId,
}

impl XmlTree {
    /// Create a new empty tree with a document root.
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            document: NodeId::NONE,
        };
        tree.document = tree.alloc(Node::new(NodeData::Document));
        tree
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Document root ID.
    pub fn document(&self) -> NodeId {
        self.document
    }

    /// First element child of the document root.
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.document).find(|&id| self.is_element(id))
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    /// Create a new element node with no attributes.
    pub fn new_element(&mut self, name: &str) -> NodeId {
        self.create_element(name.to_string(), Vec::new(), false)
    }

    pub fn create_element(&mut self, name: String, attrs: Vec<Attr>, self_closed: bool) -> NodeId {
        self.alloc(Node::new(NodeData::Element {
            name,
            attrs,
            self_closed,
        }))
    }

    pub fn create_text(&mut self, text: String) -> NodeId {
        self.alloc(Node::new(NodeData::Text(text)))
    }

    pub fn create_comment(&mut self, text: String) -> NodeId {
        self.alloc(Node::new(NodeData::Comment(text)))
    }

    /// Append a child to a parent node.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);

        if let Some(child_node) = self.get_mut(child) {
            child_node.parent = parent;
            child_node.prev_sibling = last_child;
            child_node.next_sibling = NodeId::NONE;
        }

        if last_child.is_some() {
            if let Some(last_node) = self.get_mut(last_child) {
                last_node.next_sibling = child;
            }
        }

        if let Some(parent_node) = self.get_mut(parent) {
            if parent_node.first_child.is_none() {
                parent_node.first_child = child;
            }
            parent_node.last_child = child;
        }
    }

    /// Insert a node as the following sibling of an anchor node.
    pub fn insert_after(&mut self, anchor: NodeId, new_node: NodeId) {
        let parent = self.get(anchor).map(|n| n.parent).unwrap_or(NodeId::NONE);
        let next = self.get(anchor).map(|n| n.next_sibling).unwrap_or(NodeId::NONE);

        if let Some(new) = self.get_mut(new_node) {
            new.parent = parent;
            new.prev_sibling = anchor;
            new.next_sibling = next;
        }

        if let Some(anc) = self.get_mut(anchor) {
            anc.next_sibling = new_node;
        }

        if next.is_some() {
            if let Some(n) = self.get_mut(next) {
                n.prev_sibling = new_node;
            }
        } else if let Some(par) = self.get_mut(parent) {
            par.last_child = new_node;
        }
    }

    /// Unlink a node from its parent and siblings. The node and its subtree
    /// stay allocated and can be reinserted elsewhere.
    pub fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = match self.get(id) {
            Some(n) => (n.parent, n.prev_sibling, n.next_sibling),
            None => return,
        };

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = next;
            }
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = next;
        }

        if next.is_some() {
            if let Some(n) = self.get_mut(next) {
                n.prev_sibling = prev;
            }
        } else if let Some(par) = self.get_mut(parent) {
            par.last_child = prev;
        }

        if let Some(node) = self.get_mut(id) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
    }

    /// Replace `old` with `new` at the same position. `new` must be detached.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        self.insert_after(old, new);
        self.detach(old);
    }

    /// Append text to an existing trailing text node, or create a new one.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);

        if let Some(last) = self.get_mut(last_child) {
            if let NodeData::Text(ref mut existing) = last.data {
                existing.push_str(text);
                return;
            }
        }

        let text_node = self.create_text(text.to_string());
        self.append(parent, text_node);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.parent).filter(NodeId::is_some)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.next_sibling).filter(NodeId::is_some)
    }

    /// Iterate over the children of a node in document order.
    pub fn children(&self, parent: NodeId) -> Children<'_> {
        let first = self.get(parent).map(|n| n.first_child).unwrap_or(NodeId::NONE);
        Children {
            tree: self,
            current: first,
        }
    }

    /// Iterate over child elements of a node.
    pub fn child_elements(&self, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(parent).filter(|&id| self.is_element(id))
    }

    /// First child element with the given local name.
    pub fn find_child(&self, parent: NodeId, local: &str) -> Option<NodeId> {
        self.child_elements(parent)
            .find(|&id| self.local_name(id) == Some(local))
    }

    /// All descendants of a node in document order, excluding the node itself.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let mut stack = Vec::new();
        let mut children: Vec<_> = self.children(id).collect();
        children.reverse();
        stack.extend(children);
        Descendants { tree: self, stack }
    }

    /// Concatenated text of all text nodes beneath a node.
    pub fn inner_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(NodeData::Text(t)) = self.get(id).map(|n| &n.data) {
            out.push_str(t);
        }
        for child in self.descendants(id) {
            if let Some(NodeData::Text(t)) = self.get(child).map(|n| &n.data) {
                out.push_str(t);
            }
        }
        out
    }

    /// Total visible text length in characters across the whole tree.
    pub fn text_len(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| match &n.data {
                NodeData::Text(t) => t.chars().count(),
                _ => 0,
            })
            .sum()
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|n| matches!(n.data, NodeData::Element { .. }))
    }

    /// Element's qualified name as written in the source.
    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Element's local name (prefix stripped).
    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.element_name(id).map(local_name)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.name == name)
                .map(|a| a.value.as_str()),
            _ => None,
        })
    }

    /// All attributes of an element, in source order.
    pub fn attrs(&self, id: NodeId) -> &[Attr] {
        match self.get(id).map(|n| &n.data) {
            Some(NodeData::Element { attrs, .. }) => attrs,
            _ => &[],
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(NodeData::Element { attrs, .. }) = self.get_mut(id).map(|n| &mut n.data) {
            if let Some(attr) = attrs.iter_mut().find(|a| a.name == name) {
                attr.value = value.to_string();
            } else {
                attrs.push(Attr {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
        }
    }

    /// Text of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Text(t) => Some(t.as_str()),
            _ => None,
        })
    }

    /// Text of a comment node.
    pub fn comment(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Comment(c) => Some(c.as_str()),
            _ => None,
        })
    }

    pub fn set_text(&mut self, id: NodeId, text: String) {
        if let Some(node) = self.get_mut(id) {
            if let NodeData::Text(ref mut t) = node.data {
                *t = text;
            }
        }
    }

    /// Replace all children of an element with a single text node.
    pub fn set_element_text(&mut self, id: NodeId, text: &str) {
        while let Some(child) = self.get(id).map(|n| n.first_child).filter(NodeId::is_some) {
            self.detach(child);
        }
        let text_node = self.create_text(text.to_string());
        self.append(id, text_node);
    }

    /// Lenient parse of decoded XML text.
    ///
    /// Hard syntax errors abort the parse; structural problems (mismatched or
    /// stray end tags, unclosed elements at EOF, unknown entities) are
    /// recovered from and counted.
    pub fn parse(text: &str) -> Result<ParsedDocument> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().check_end_names = false;
        reader.config_mut().allow_unmatched_ends = true;

        let mut tree = XmlTree::new();
        let mut stack: Vec<NodeId> = vec![tree.document];
        let mut markup_errors: u32 = 0;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let id = tree.element_from_tag(&e, false);
                    let top = *stack.last().unwrap_or(&tree.document);
                    tree.append(top, id);
                    stack.push(id);
                }
                Ok(Event::Empty(e)) => {
                    let id = tree.element_from_tag(&e, true);
                    let top = *stack.last().unwrap_or(&tree.document);
                    tree.append(top, id);
                }
                Ok(Event::End(e)) => {
                    let closing = local_name(&String::from_utf8_lossy(e.name().as_ref())).to_string();
                    let matched = stack
                        .iter()
                        .rposition(|&id| tree.local_name(id) == Some(closing.as_str()));
                    match matched {
                        Some(pos) if pos > 0 => {
                            // Auto-close anything opened after the match.
                            markup_errors += (stack.len() - pos - 1) as u32;
                            stack.truncate(pos);
                        }
                        _ => {
                            // Stray end tag with no open element.
                            markup_errors += 1;
                        }
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    let top = *stack.last().unwrap_or(&tree.document);
                    // Character data is split around entity references, so a
                    // whitespace-only fragment that continues an open text run
                    // is content, not structural indentation.
                    let continues_run = tree
                        .get(top)
                        .map(|node| node.last_child)
                        .and_then(|id| tree.text(id))
                        .is_some();
                    if continues_run || !text.chars().all(char::is_whitespace) {
                        tree.append_text(top, &text);
                    }
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    let top = *stack.last().unwrap_or(&tree.document);
                    tree.append_text(top, &text);
                }
                Ok(Event::GeneralRef(e)) => {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    let top = *stack.last().unwrap_or(&tree.document);
                    if let Some(resolved) = resolve_entity(&entity) {
                        tree.append_text(top, &resolved);
                    } else {
                        markup_errors += 1;
                    }
                }
                Ok(Event::Comment(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    let id = tree.create_comment(text);
                    let top = *stack.last().unwrap_or(&tree.document);
                    tree.append(top, id);
                }
                Ok(Event::Decl(_)) | Ok(Event::PI(_)) | Ok(Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::Xml(e)),
            }
        }

        // Unclosed elements at EOF.
        if stack.len() > 1 {
            markup_errors += (stack.len() - 1) as u32;
        }

        Ok(ParsedDocument { tree, markup_errors })
    }

    fn element_from_tag(&mut self, e: &quick_xml::events::BytesStart, self_closed: bool) -> NodeId {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in e.attributes().flatten() {
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            attrs.push(Attr {
                name: String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                value,
            });
        }
        self.create_element(name, attrs, self_closed)
    }
}

impl Default for XmlTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over children of a node.
pub struct Children<'a> {
    tree: &'a XmlTree,
    current: NodeId,
}

impl<'a> Iterator for Children<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        self.current = self
            .tree
            .get(id)
            .map(|n| n.next_sibling)
            .unwrap_or(NodeId::NONE);
        Some(id)
    }
}

/// Depth-first document-order iterator over a subtree.
pub struct Descendants<'a> {
    tree: &'a XmlTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let mut children: Vec<_> = self.tree.children(id).collect();
        children.reverse();
        self.stack.extend(children);
        Some(id)
    }
}

/// Strip a namespace prefix from a qualified name.
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

/// Resolve XML entity references.
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    if let Some(hex) = entity.strip_prefix("#x") {
        if let Ok(code) = u32::from_str_radix(hex, 16)
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    } else if let Some(dec) = entity.strip_prefix('#')
        && let Ok(code) = dec.parse::<u32>()
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let parsed = XmlTree::parse("<root><a x=\"1\">hi</a><b/></root>").unwrap();
        assert_eq!(parsed.markup_errors, 0);
        let tree = &parsed.tree;
        let root = tree.root_element().unwrap();
        assert_eq!(tree.local_name(root), Some("root"));

        let a = tree.find_child(root, "a").unwrap();
        assert_eq!(tree.attr(a, "x"), Some("1"));
        assert_eq!(tree.inner_text(a), "hi");

        let b = tree.find_child(root, "b").unwrap();
        assert!(matches!(
            tree.get(b).map(|n| &n.data),
            Some(NodeData::Element { self_closed: true, .. })
        ));
    }

    #[test]
    fn test_parse_counts_recovered_errors() {
        // Unclosed <i>, mismatched </s>.
        let parsed = XmlTree::parse("<root><p><i>a</p><s>b</root>").unwrap();
        assert!(parsed.markup_errors > 0);
        let tree = &parsed.tree;
        let root = tree.root_element().unwrap();
        assert_eq!(tree.local_name(root), Some("root"));
    }

    #[test]
    fn test_parse_resolves_entities() {
        let parsed = XmlTree::parse("<r>a &amp; b &#x42; &#67;</r>").unwrap();
        let tree = &parsed.tree;
        let root = tree.root_element().unwrap();
        assert_eq!(tree.inner_text(root), "a & b B C");
        assert_eq!(parsed.markup_errors, 0);
    }

    #[test]
    fn test_whitespace_between_references_survives() {
        // Character data splits around references; the gap is content.
        let parsed = XmlTree::parse("<r>&#x41; &#x42;</r>").unwrap();
        let tree = &parsed.tree;
        let root = tree.root_element().unwrap();
        assert_eq!(tree.inner_text(root), "A B");

        // Escaped output from the encoder fallback re-ingests unchanged.
        let parsed = XmlTree::parse("<r>War &amp; Peace</r>").unwrap();
        let tree = &parsed.tree;
        let root = tree.root_element().unwrap();
        assert_eq!(tree.inner_text(root), "War & Peace");
    }

    #[test]
    fn test_parse_drops_whitespace_only_text() {
        let parsed = XmlTree::parse("<r>\n  <p>keep me</p>\n</r>").unwrap();
        let tree = &parsed.tree;
        let root = tree.root_element().unwrap();
        let children: Vec<_> = tree.children(root).collect();
        assert_eq!(children.len(), 1);
        assert_eq!(tree.inner_text(root), "keep me");
    }

    #[test]
    fn test_detach_and_insert_after() {
        let mut tree = XmlTree::new();
        let root = tree.new_element("root");
        let doc = tree.document();
        tree.append(doc, root);

        let outer = tree.new_element("p");
        let inner = tree.new_element("p");
        tree.append(root, outer);
        tree.append(outer, inner);
        tree.append_text(inner, "inner text");

        tree.detach(inner);
        tree.insert_after(outer, inner);

        let children: Vec<_> = tree.children(root).collect();
        assert_eq!(children, vec![outer, inner]);
        assert_eq!(tree.parent(inner), Some(root));
        assert_eq!(tree.inner_text(inner), "inner text");
        assert!(tree.children(outer).next().is_none());
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut tree = XmlTree::new();
        let doc = tree.document();
        let root = tree.new_element("root");
        tree.append(doc, root);
        let a = tree.new_element("a");
        let b = tree.new_element("b");
        let c = tree.new_element("c");
        tree.append(root, a);
        tree.append(root, b);
        tree.append(root, c);

        let b2 = tree.new_element("b2");
        tree.replace(b, b2);

        let names: Vec<_> = tree
            .children(root)
            .filter_map(|id| tree.local_name(id))
            .collect();
        assert_eq!(names, vec!["a", "b2", "c"]);
    }

    #[test]
    fn test_inner_text_document_order() {
        let parsed = XmlTree::parse("<r><a>one </a><b><c>two </c>three</b></r>").unwrap();
        let tree = &parsed.tree;
        let root = tree.root_element().unwrap();
        assert_eq!(tree.inner_text(root), "one two three");
    }

    #[test]
    fn test_namespaced_local_name() {
        let parsed = XmlTree::parse("<r xmlns:l=\"u\"><l:a/></r>").unwrap();
        let tree = &parsed.tree;
        let root = tree.root_element().unwrap();
        let a = tree.find_child(root, "a").unwrap();
        assert_eq!(tree.element_name(a), Some("l:a"));
        assert_eq!(tree.local_name(a), Some("a"));
    }
}
