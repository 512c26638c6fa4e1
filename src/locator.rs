//! Element lookup against a captured [`UiTree`].
//!
//! A [`Selector`] names one logical control and lists the descriptors that
//! may identify it, most specific first. The first descriptor with a match
//! wins.

use crate::ui_tree::{Point, UiNode, UiTree};

#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    /// Exact `resource-id` (Compose test tags show up here too).
    ResourceId(String),
    /// Case-sensitive substring of the node text.
    TextContains(String),
    /// Case-insensitive substring of the content description.
    DescContains(String),
    /// Clickable node whose text contains any of the needles.
    ClickableTextAny(Vec<String>),
    /// Exact `resource-id` whose text contains the needle.
    ResourceIdWithText { id: String, needle: String },
}

impl Descriptor {
    pub fn matches(&self, node: &UiNode) -> bool {
        match self {
            Descriptor::ResourceId(id) => node.resource_id == *id,
            Descriptor::TextContains(needle) => !node.text.is_empty() && node.text.contains(needle.as_str()),
            Descriptor::DescContains(needle) => node
                .content_desc
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            Descriptor::ClickableTextAny(needles) => {
                node.clickable
                    && !node.text.is_empty()
                    && needles.iter().any(|n| node.text.contains(n.as_str()))
            }
            Descriptor::ResourceIdWithText { id, needle } => {
                node.resource_id == *id && node.text.contains(needle.as_str())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub name: &'static str,
    pub descriptors: Vec<Descriptor>,
    /// Resource id of a container; only nodes inside its bounds match.
    pub within: Option<String>,
}

impl Selector {
    pub fn new(name: &'static str, first: Descriptor) -> Self {
        Self {
            name,
            descriptors: vec![first],
            within: None,
        }
    }

    pub fn within(mut self, container_id: &str) -> Self {
        self.within = Some(container_id.to_string());
        self
    }

    pub fn or(mut self, alternative: Descriptor) -> Self {
        self.descriptors.push(alternative);
        self
    }
}

/// A located control and the point to tap it at.
#[derive(Debug, Clone, PartialEq)]
pub struct UiElement {
    pub selector: &'static str,
    pub node: UiNode,
    pub point: Point,
}

impl UiElement {
    pub fn text(&self) -> &str {
        &self.node.text
    }
}

pub trait ElementLocator: Send {
    fn find(&self, tree: &UiTree, selector: &Selector) -> Option<UiElement>;

    fn exists(&self, tree: &UiTree, selector: &Selector) -> bool {
        self.find(tree, selector).is_some()
    }
}

/// Default locator: descriptor matching over the dumped tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeLocator;

impl ElementLocator for TreeLocator {
    fn find(&self, tree: &UiTree, selector: &Selector) -> Option<UiElement> {
        let scope = match &selector.within {
            Some(id) => Some(tree.nodes.iter().find(|n| n.resource_id == *id)?),
            None => None,
        };
        let in_scope = |node: &UiNode| match scope {
            Some(container) => !std::ptr::eq(node, container) && container.bounds.encloses(&node.bounds),
            None => true,
        };

        selector.descriptors.iter().find_map(|descriptor| {
            tree.nodes
                .iter()
                .filter(|node| !node.bounds.is_empty() && in_scope(*node))
                .find(|node| descriptor.matches(node))
                .map(|node| UiElement {
                    selector: selector.name,
                    node: node.clone(),
                    point: node.bounds.center(),
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui_tree::Bounds;

    fn tree() -> UiTree {
        UiTree::new(vec![
            UiNode::new("pkg:id/header", Bounds::new(0, 0, 100, 50)).with_text("Start chat"),
            UiNode::new("pkg:id/fab", Bounds::new(0, 100, 100, 200)).clickable(),
            UiNode::new("", Bounds::new(0, 0, 40, 40)).with_desc("Navigate Back").clickable(),
            UiNode::new("pkg:id/hidden", Bounds::default()).with_text("Send to 555"),
        ])
    }

    #[test]
    fn test_first_descriptor_wins() {
        let selector = Selector::new("start", Descriptor::ResourceId("pkg:id/fab".into()))
            .or(Descriptor::TextContains("Start chat".into()));
        let found = TreeLocator.find(&tree(), &selector).unwrap();
        assert_eq!(found.node.resource_id, "pkg:id/fab");
        assert_eq!(found.point, Point { x: 50, y: 150 });
    }

    #[test]
    fn test_alternative_used_when_primary_missing() {
        let selector = Selector::new("start", Descriptor::ResourceId("pkg:id/missing".into()))
            .or(Descriptor::TextContains("Start chat".into()));
        let found = TreeLocator.find(&tree(), &selector).unwrap();
        assert_eq!(found.node.resource_id, "pkg:id/header");
    }

    #[test]
    fn test_desc_is_case_insensitive() {
        let selector = Selector::new("back", Descriptor::DescContains("back".into()));
        assert!(TreeLocator.exists(&tree(), &selector));
    }

    #[test]
    fn test_within_skips_nodes_outside_container() {
        let tree = UiTree::new(vec![
            UiNode::new("search", Bounds::new(160, 80, 1080, 220)).with_text("4155550100").clickable(),
            UiNode::new("list", Bounds::new(0, 300, 1080, 900)),
            UiNode::new("row", Bounds::new(0, 300, 1080, 450)).with_text("Send to 4155550100").clickable(),
        ]);
        let loose = Selector::new("suggestion", Descriptor::ClickableTextAny(vec!["4155550100".into()]));
        assert_eq!(TreeLocator.find(&tree, &loose).unwrap().node.resource_id, "search");

        let scoped = loose.within("list");
        assert_eq!(TreeLocator.find(&tree, &scoped).unwrap().node.resource_id, "row");
        assert!(TreeLocator.find(&tree, &scoped.clone().within("missing")).is_none());
    }

    #[test]
    fn test_id_with_text() {
        let selector = Selector::new(
            "row",
            Descriptor::ResourceIdWithText {
                id: "pkg:id/fab".into(),
                needle: "x".into(),
            },
        );
        assert!(TreeLocator.find(&tree(), &selector).is_none());
    }

    #[test]
    fn test_zero_size_nodes_are_ignored() {
        let selector = Selector::new("suggestion", Descriptor::TextContains("Send to".into()));
        assert!(TreeLocator.find(&tree(), &selector).is_none());
    }
}
