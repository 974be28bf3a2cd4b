//! Author records shared by the title, document, and publish blocks.

use crate::tree::{NodeId, XmlTree};

use super::fields::{self, InfoNode};

/// One `author`-shaped record. The `author`, `translator`, and `publisher`
/// elements all share this layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorInfo {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub home_pages: Vec<String>,
    pub emails: Vec<String>,
    pub id: Option<String>,
}

impl AuthorInfo {
    /// A record carrying only a nickname, used as the synthesized author of a
    /// generated `document-info`.
    pub fn from_nickname(nickname: &str) -> Self {
        Self {
            nickname: Some(nickname.to_string()),
            ..Self::default()
        }
    }
}

impl InfoNode for AuthorInfo {
    fn load(tree: &XmlTree, element: NodeId) -> Self {
        Self {
            first_name: fields::load_required_element(tree, element, "first-name"),
            middle_name: fields::load_element(tree, element, "middle-name"),
            last_name: fields::load_required_element(tree, element, "last-name"),
            nickname: fields::load_required_element(tree, element, "nickname"),
            id: fields::load_element(tree, element, "id"),
            home_pages: fields::load_elements_list(tree, element, "home-page"),
            emails: fields::load_elements_list(tree, element, "email"),
        }
    }

    fn store(&self, tree: &mut XmlTree, parent: NodeId, tag: &str) {
        let element = tree.new_element(tag);
        fields::store_required_element(tree, element, "first-name", self.first_name.as_deref());
        fields::store_element(tree, element, "middle-name", self.middle_name.as_deref());
        fields::store_required_element(tree, element, "last-name", self.last_name.as_deref());
        fields::store_required_element(tree, element, "nickname", self.nickname.as_deref());
        fields::store_element(tree, element, "id", self.id.as_deref());
        fields::store_elements_list(tree, element, "home-page", &self.home_pages);
        fields::store_elements_list(tree, element, "email", &self.emails);
        // A record with nothing to say leaves no element behind.
        if tree.children(element).next().is_some() {
            tree.append(parent, element);
        }
    }

    fn is_empty(&self) -> bool {
        false
    }
}
