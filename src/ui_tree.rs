//! View tree captured with `uiautomator dump`.
//!
//! The dump is flat-parsed: every `<node .../>` becomes one [`UiNode`] in
//! document order, which is enough for descriptor lookups.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<node\b([^>]*?)/?>").expect("node regex"));
static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([A-Za-z_][\w:.-]*)="([^"]*)""#).expect("attr regex"));
static BOUNDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]").expect("bounds regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn center(&self) -> Point {
        Point {
            x: (self.left + self.right) / 2,
            y: (self.top + self.bottom) / 2,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x < self.right && p.y >= self.top && p.y < self.bottom
    }

    pub fn encloses(&self, other: &Bounds) -> bool {
        other.left >= self.left && other.top >= self.top && other.right <= self.right && other.bottom <= self.bottom
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    fn parse(raw: &str) -> Option<Self> {
        let caps = BOUNDS_RE.captures(raw)?;
        let n = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<i32>().ok());
        Some(Self::new(n(1)?, n(2)?, n(3)?, n(4)?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiNode {
    pub resource_id: String,
    pub text: String,
    pub content_desc: String,
    pub clickable: bool,
    pub bounds: Bounds,
}

impl UiNode {
    pub fn new(resource_id: &str, bounds: Bounds) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            bounds,
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_desc(mut self, desc: &str) -> Self {
        self.content_desc = desc.to_string();
        self
    }

    pub fn clickable(mut self) -> Self {
        self.clickable = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiTree {
    pub nodes: Vec<UiNode>,
}

impl UiTree {
    pub fn new(nodes: Vec<UiNode>) -> Self {
        Self { nodes }
    }

    pub fn parse(xml: &str) -> Self {
        let nodes = NODE_RE
            .captures_iter(xml)
            .filter_map(|caps| caps.get(1))
            .map(|attrs| parse_node(attrs.as_str()))
            .collect();
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Topmost clickable node under a point (later nodes draw above earlier ones).
    pub fn hit_test(&self, p: Point) -> Option<&UiNode> {
        self.nodes
            .iter()
            .rev()
            .find(|n| n.clickable && n.bounds.contains(p))
    }
}

fn parse_node(attrs: &str) -> UiNode {
    let mut node = UiNode::default();
    for caps in ATTR_RE.captures_iter(attrs) {
        let (Some(key), Some(raw)) = (caps.get(1), caps.get(2)) else { continue };
        let value = unescape(raw.as_str());
        match key.as_str() {
            "resource-id" => node.resource_id = value,
            "text" => node.text = value,
            "content-desc" => node.content_desc = value,
            "clickable" => node.clickable = value == "true",
            "bounds" => node.bounds = Bounds::parse(&value).unwrap_or_default(),
            _ => {}
        }
    }
    node
}

fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#10;", "\n")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><hierarchy rotation="0"><node index="0" text="" resource-id="" class="android.widget.FrameLayout" package="com.google.android.apps.messaging" content-desc="" clickable="false" focused="false" bounds="[0,0][1080,2400]"><node index="0" text="Start chat" resource-id="com.google.android.apps.messaging:id/start_chat_fab" class="android.widget.Button" content-desc="" clickable="true" focused="false" bounds="[700,2000][1040,2150]" /><node index="1" text="Tom &amp; Jerry" resource-id="com.google.android.apps.messaging:id/swipeableContainer" class="android.view.ViewGroup" content-desc="" clickable="true" focused="false" bounds="[0,300][1080,500]" /></node></hierarchy>"#;

    #[test]
    fn test_parse_dump() {
        let tree = UiTree::parse(DUMP);
        assert_eq!(tree.nodes.len(), 3);
        let fab = &tree.nodes[1];
        assert_eq!(fab.resource_id, "com.google.android.apps.messaging:id/start_chat_fab");
        assert!(fab.clickable);
        assert_eq!(fab.bounds, Bounds::new(700, 2000, 1040, 2150));
        assert_eq!(fab.bounds.center(), Point { x: 870, y: 2075 });
        assert_eq!(tree.nodes[2].text, "Tom & Jerry");
    }

    #[test]
    fn test_hit_test_prefers_topmost_clickable() {
        let tree = UiTree::parse(DUMP);
        let hit = tree.hit_test(Point { x: 800, y: 2100 }).unwrap();
        assert!(hit.resource_id.ends_with("start_chat_fab"));
        assert!(tree.hit_test(Point { x: 10, y: 10 }).is_none());
    }

    #[test]
    fn test_garbage_is_empty_tree() {
        assert!(UiTree::parse("ERROR: null root node returned by UiTestAutomationBridge.").is_empty());
    }
}
