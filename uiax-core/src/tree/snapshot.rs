//! Owned, serializable copies of an element subtree.
//!
//! [`ElementSnapshot`] holds no native handles or adapter links, so it is
//! `Send`, `Serialize`, and safe to hand across FFI or into Python after the
//! finder is closed.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::cancel::CancelToken;
use crate::element::{Element, ElementId};
use crate::errors::UiaxError;
use crate::geometry::Rect;
use crate::role::Role;

/// A detached copy of one element and the captured part of its subtree.
#[derive(Debug, Clone, Serialize)]
pub struct ElementSnapshot {
    pub id: ElementId,
    pub role: Role,
    pub name: String,
    pub title: String,
    pub value: String,
    pub description: String,
    pub bounds: Rect,
    pub enabled: bool,
    pub focused: bool,
    pub selected: bool,
    pub pid: u32,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
    pub depth: usize,
    pub children: Vec<ElementSnapshot>,
}

impl ElementSnapshot {
    fn leaf(e: &Element, depth: usize) -> Self {
        Self {
            id: e.id(),
            role: e.role(),
            name: e.name().to_owned(),
            title: e.title().to_owned(),
            value: e.value().to_owned(),
            description: e.description().to_owned(),
            bounds: e.bounds(),
            enabled: e.is_enabled(),
            focused: e.is_focused(),
            selected: e.is_selected(),
            pid: e.pid(),
            attributes: e.attributes().clone(),
            depth,
            children: Vec::new(),
        }
    }

    /// Total nodes in this snapshot, itself included.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

/// Capture `root` and its descendants, `max_depth` levels deep (`0` means
/// unlimited).  Children are loaded through the adapter as needed.
///
/// Nodes are gathered pre-order with an explicit stack and then linked
/// bottom-up, so depth is bounded by the heap rather than the thread stack.
pub fn snapshot(
    root: &Arc<Element>,
    max_depth: usize,
    cancel: &CancelToken,
) -> Result<ElementSnapshot, UiaxError> {
    // (snapshot, index of parent in `nodes`)
    let mut nodes: Vec<(ElementSnapshot, Option<usize>)> = Vec::new();
    let mut stack: Vec<(Arc<Element>, usize, Option<usize>)> = vec![(Arc::clone(root), 0, None)];

    while let Some((element, depth, parent)) = stack.pop() {
        cancel.check()?;
        let index = nodes.len();
        nodes.push((ElementSnapshot::leaf(&element, depth), parent));

        let level = depth + 1;
        if max_depth != 0 && level >= max_depth {
            continue;
        }
        for child in element.children().iter().rev() {
            stack.push((Arc::clone(child), level, Some(index)));
        }
    }

    // Children always follow their parent in pre-order, so a reverse pass
    // sees every subtree complete before attaching it.
    let mut root_snap = None;
    while let Some((mut snap, parent)) = nodes.pop() {
        snap.children.reverse();
        match parent {
            Some(p) => nodes[p].0.children.push(snap),
            None => root_snap = Some(snap),
        }
    }
    root_snap.ok_or_else(|| UiaxError::generic(-1, "snapshot produced no root"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Arc<Element> {
        Element::builder(Role::Window)
            .name("main")
            .pid(9)
            .child(
                Element::builder(Role::Group)
                    .child(Element::builder(Role::Button).name("OK").pid(9)),
            )
            .child(Element::builder(Role::StaticText).value("hi"))
            .build()
    }

    #[test]
    fn test_snapshot_full() {
        let snap = snapshot(&sample(), 0, &CancelToken::new()).unwrap();
        assert_eq!(snap.node_count(), 4);
        assert_eq!(snap.children[0].children[0].name, "OK");
        assert_eq!(snap.children[0].children[0].depth, 2);
    }

    #[test]
    fn test_snapshot_depth_limit() {
        let snap = snapshot(&sample(), 2, &CancelToken::new()).unwrap();
        assert_eq!(snap.node_count(), 3);
        assert!(snap.children[0].children.is_empty());
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = snapshot(&sample(), 0, &CancelToken::new()).unwrap();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["role"], "Window");
        assert_eq!(json["children"][1]["value"], "hi");
        assert!(json.get("attributes").is_none());
    }

    #[test]
    fn test_snapshot_deep_chain() {
        let mut builder = Element::builder(Role::Group).name("leaf");
        for i in 0..1_000 {
            builder = Element::builder(Role::Group).name(format!("g{i}")).child(builder);
        }
        let root = builder.build();
        let snap = snapshot(&root, 0, &CancelToken::new()).unwrap();

        let mut node = &snap;
        let mut depth = 0;
        while let Some(child) = node.children.first() {
            assert_eq!(child.depth, depth + 1);
            node = child;
            depth += 1;
        }
        assert_eq!(depth, 1_000);
        assert_eq!(node.name, "leaf");
    }

    #[test]
    fn test_snapshot_keeps_sibling_order() {
        let root = Element::builder(Role::List)
            .child(Element::builder(Role::ListItem).name("a").child(Element::builder(Role::Cell).name("a1")))
            .child(Element::builder(Role::ListItem).name("b"))
            .child(Element::builder(Role::ListItem).name("c"))
            .build();
        let snap = snapshot(&root, 0, &CancelToken::new()).unwrap();
        let names: Vec<&str> = snap.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(snap.children[0].children[0].name, "a1");
    }

    #[test]
    fn test_snapshot_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(snapshot(&sample(), 0, &cancel), Err(UiaxError::Cancelled)));
    }
}
