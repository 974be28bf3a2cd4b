//! Field extraction and storage conventions shared by the description records.
//!
//! Loading is lenient and mirrors what battered FB2 files actually contain:
//! optional scalars treat whitespace-only elements as absent, while required
//! scalars distinguish a present-but-empty tag (`Some("")`) from a missing or
//! self-closed one (`None`). Storing mirrors the asymmetry: empty optionals
//! are omitted and empty required fields come out as self-closing tags.

use crate::tree::{NodeData, NodeId, XmlTree};

/// Typed view over one description element.
pub(crate) trait InfoNode: Sized {
    fn load(tree: &XmlTree, element: NodeId) -> Self;

    /// Write the view as a fresh `tag` element under `parent`. Views with
    /// nothing to say append nothing.
    fn store(&self, tree: &mut XmlTree, parent: NodeId, tag: &str);

    /// True when a loaded view carries no data. Empty views are dropped from
    /// list loads.
    fn is_empty(&self) -> bool;
}

/// First matching child element with non-whitespace text, trimmed.
pub(crate) fn load_element(tree: &XmlTree, parent: NodeId, name: &str) -> Option<String> {
    tree.child_elements(parent)
        .filter(|&child| tree.local_name(child) == Some(name))
        .find_map(|child| {
            let text = tree.inner_text(child);
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
}

/// First matching child element, distinguishing presence from content:
/// missing or self-closed reads as `None`, present-but-empty as `Some("")`.
pub(crate) fn load_required_element(tree: &XmlTree, parent: NodeId, name: &str) -> Option<String> {
    let element = tree
        .child_elements(parent)
        .find(|&child| tree.local_name(child) == Some(name))?;
    match tree.get(element).map(|node| &node.data) {
        Some(NodeData::Element { self_closed: true, .. }) => None,
        _ => Some(tree.inner_text(element).trim().to_string()),
    }
}

/// All matching child elements with non-whitespace text, trimmed.
pub(crate) fn load_elements_list(tree: &XmlTree, parent: NodeId, name: &str) -> Vec<String> {
    tree.child_elements(parent)
        .filter(|&child| tree.local_name(child) == Some(name))
        .filter_map(|child| {
            let text = tree.inner_text(child);
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect()
}

/// First matching child element that has any content, kept as a passthrough
/// subtree. Childless matches read as absent.
pub(crate) fn load_subtree(tree: &XmlTree, parent: NodeId, name: &str) -> Option<NodeId> {
    tree.child_elements(parent)
        .filter(|&child| tree.local_name(child) == Some(name))
        .find(|&child| tree.children(child).next().is_some())
}

/// Append `<name>value</name>`, skipping missing or empty values.
pub(crate) fn store_element(tree: &mut XmlTree, parent: NodeId, name: &str, value: Option<&str>) {
    if let Some(value) = value
        && !value.is_empty()
    {
        let element = tree.new_element(name);
        tree.set_element_text(element, value);
        tree.append(parent, element);
    }
}

/// Append `name` even when its value is empty (it renders self-closing);
/// only a missing value skips the element.
pub(crate) fn store_required_element(
    tree: &mut XmlTree,
    parent: NodeId,
    name: &str,
    value: Option<&str>,
) {
    let Some(value) = value else { return };
    let element = tree.new_element(name);
    if !value.is_empty() {
        tree.set_element_text(element, value);
    }
    tree.append(parent, element);
}

pub(crate) fn store_elements_list(
    tree: &mut XmlTree,
    parent: NodeId,
    name: &str,
    values: &[String],
) {
    for value in values {
        store_element(tree, parent, name, Some(value));
    }
}

/// Re-parent a passthrough subtree (annotation, cover page, history) into a
/// freshly stored parent.
pub(crate) fn store_subtree(tree: &mut XmlTree, parent: NodeId, node: Option<NodeId>) {
    if let Some(node) = node {
        tree.detach(node);
        tree.append(parent, node);
    }
}

/// Load the first matching child as a typed view.
pub(crate) fn load_object<T: InfoNode>(tree: &XmlTree, parent: NodeId, tag: &str) -> Option<T> {
    tree.child_elements(parent)
        .find(|&child| tree.local_name(child) == Some(tag))
        .map(|element| T::load(tree, element))
}

/// Load all matching children as typed views, dropping empty ones.
pub(crate) fn load_object_list<T: InfoNode>(tree: &XmlTree, parent: NodeId, tag: &str) -> Vec<T> {
    tree.child_elements(parent)
        .filter(|&child| tree.local_name(child) == Some(tag))
        .collect::<Vec<_>>()
        .into_iter()
        .map(|element| T::load(tree, element))
        .filter(|item| !item.is_empty())
        .collect()
}

pub(crate) fn store_object_list<T: InfoNode>(
    tree: &mut XmlTree,
    parent: NodeId,
    tag: &str,
    items: &[T],
) {
    for item in items {
        item.store(tree, parent, tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(source: &str) -> (XmlTree, NodeId) {
        let parsed = XmlTree::parse(source).unwrap();
        let root = parsed.tree.root_element().unwrap();
        (parsed.tree, root)
    }

    #[test]
    fn test_load_element_skips_whitespace_only() {
        let (tree, root) = tree_of("<r><a>   </a><a> keep </a></r>");
        assert_eq!(load_element(&tree, root, "a"), Some("keep".to_string()));
        assert_eq!(load_element(&tree, root, "b"), None);
    }

    #[test]
    fn test_required_element_distinguishes_empty_from_absent() {
        let (tree, root) = tree_of("<r><present></present><closed/></r>");
        assert_eq!(
            load_required_element(&tree, root, "present"),
            Some(String::new())
        );
        assert_eq!(load_required_element(&tree, root, "closed"), None);
        assert_eq!(load_required_element(&tree, root, "missing"), None);
    }

    #[test]
    fn test_load_elements_list_drops_blank_entries() {
        let (tree, root) = tree_of("<r><u>one</u><u> </u><u>two</u></r>");
        assert_eq!(load_elements_list(&tree, root, "u"), vec!["one", "two"]);
    }

    #[test]
    fn test_load_subtree_requires_content() {
        let (tree, root) = tree_of("<r><h/><h><p>x</p></h></r>");
        let subtree = load_subtree(&tree, root, "h").unwrap();
        assert!(tree.children(subtree).next().is_some());
    }

    #[test]
    fn test_store_asymmetry() {
        let mut tree = XmlTree::new();
        let doc = tree.document();
        let root = tree.new_element("r");
        tree.append(doc, root);

        store_element(&mut tree, root, "opt", Some(""));
        store_element(&mut tree, root, "opt", None);
        store_required_element(&mut tree, root, "req", Some(""));
        store_required_element(&mut tree, root, "gone", None);

        let names: Vec<_> = tree
            .child_elements(root)
            .filter_map(|id| tree.local_name(id).map(str::to_string))
            .collect();
        assert_eq!(names, vec!["req"]);
        let req = tree.find_child(root, "req").unwrap();
        assert!(tree.children(req).next().is_none());
    }
}
