//! Lazy depth-first traversal over [`Element`] trees.
//!
//! [`walk`] is the engine: a pre-order walk that loads each node's children
//! through the adapter on first descent and checks the caller's
//! [`CancelToken`] before every node.  The remaining functions (`find`,
//! `find_all`, `count`, `depth`, `print_tree`, [`snapshot`]) are built on it.
//!
//! The walk keeps an explicit stack instead of recursing, so arbitrarily
//! deep application trees cannot overflow the thread stack.
//!
//! `ancestors`, `siblings` and `path` follow the weak parent links and
//! never touch the adapter except to load a parent's children.

pub mod snapshot;

use std::fmt::Write as _;
use std::sync::Arc;

pub use snapshot::{snapshot, ElementSnapshot};

use crate::cancel::CancelToken;
use crate::element::{truncate_label, Element};
use crate::errors::UiaxError;
use crate::selector::Selector;

// ---------------------------------------------------------------------------
// Walk engine
// ---------------------------------------------------------------------------

/// Visit `root` and its descendants in pre-order.
///
/// `visit` receives each node and its depth (root = 0).  Returning `false`
/// ends the whole walk without error: the node's descendants and every
/// later node are skipped.  Returns [`UiaxError::Cancelled`] if `cancel`
/// trips between nodes.
pub fn walk<F>(root: &Arc<Element>, cancel: &CancelToken, mut visit: F) -> Result<(), UiaxError>
where
    F: FnMut(&Arc<Element>, usize) -> bool,
{
    let mut stack: Vec<(Arc<Element>, usize)> = vec![(Arc::clone(root), 0)];

    while let Some((node, depth)) = stack.pop() {
        cancel.check()?;
        log::trace!("walk: visiting {} at depth {depth}", node.id());

        if !visit(&node, depth) {
            return Ok(());
        }

        // Push in reverse so children come off the stack left-to-right.
        for child in node.children().iter().rev() {
            stack.push((Arc::clone(child), depth + 1));
        }
    }

    Ok(())
}

/// First node in pre-order that matches, or `None`.
pub fn find(
    root: &Arc<Element>,
    selector: &Selector,
    cancel: &CancelToken,
) -> Result<Option<Arc<Element>>, UiaxError> {
    let mut found = None;
    walk(root, cancel, |node, _| {
        if selector.matches(node) {
            found = Some(Arc::clone(node));
            false
        } else {
            true
        }
    })?;
    Ok(found)
}

/// Every matching node, in pre-order.
pub fn find_all(
    root: &Arc<Element>,
    selector: &Selector,
    cancel: &CancelToken,
) -> Result<Vec<Arc<Element>>, UiaxError> {
    let mut found = Vec::new();
    walk(root, cancel, |node, _| {
        if selector.matches(node) {
            found.push(Arc::clone(node));
        }
        true
    })?;
    Ok(found)
}

/// Number of matching nodes.
pub fn count(
    root: &Arc<Element>,
    selector: &Selector,
    cancel: &CancelToken,
) -> Result<usize, UiaxError> {
    let mut n = 0;
    walk(root, cancel, |node, _| {
        if selector.matches(node) {
            n += 1;
        }
        true
    })?;
    Ok(n)
}

/// Number of levels in the tree: 0 for no root, 1 for a childless root.
pub fn depth(root: Option<&Arc<Element>>, cancel: &CancelToken) -> Result<usize, UiaxError> {
    let Some(root) = root else {
        return Ok(0);
    };
    let mut deepest = 0;
    walk(root, cancel, |_, d| {
        deepest = deepest.max(d + 1);
        true
    })?;
    Ok(deepest)
}

// ---------------------------------------------------------------------------
// Parent-link queries
// ---------------------------------------------------------------------------

/// From the immediate parent upward, stopping at the first missing parent
/// and before the synthetic cross-application root.
pub fn ancestors(element: &Element) -> Vec<Arc<Element>> {
    let mut out = Vec::new();
    let mut current = element.parent();
    while let Some(parent) = current {
        if parent.is_synthetic_root() {
            break;
        }
        current = parent.parent();
        out.push(parent);
    }
    out
}

/// The parent's children without `element` (compared by id), in order.
/// Empty when there is no parent.
pub fn siblings(element: &Element) -> Vec<Arc<Element>> {
    let Some(parent) = element.parent() else {
        return Vec::new();
    };
    parent
        .children()
        .iter()
        .filter(|c| c.id() != element.id())
        .cloned()
        .collect()
}

/// Topmost ancestor down to `element`, inclusive.
pub fn path(element: &Arc<Element>) -> Vec<Arc<Element>> {
    let mut out = ancestors(element);
    out.reverse();
    out.push(Arc::clone(element));
    out
}

// ---------------------------------------------------------------------------
// Text rendering
// ---------------------------------------------------------------------------

/// Render one line per node with box-drawing connectors:
///
/// ```text
/// Window: Untitled [0,0 800×600]
/// ├── Button: OK [10,10 80×24]
/// └── Group: (unnamed) [0,40 800×560]
///     └── StaticText: Hello [8,48 60×16]
/// ```
///
/// `max_depth` counts printed levels; `0` means unlimited.
pub fn print_tree(
    root: &Arc<Element>,
    max_depth: usize,
    cancel: &CancelToken,
) -> Result<String, UiaxError> {
    let mut out = String::new();
    render_line(&mut out, "", root);

    // (node, prefix for its own line, is_last among siblings, level)
    let mut stack: Vec<(Arc<Element>, String, bool, usize)> = Vec::new();
    push_children(&mut stack, root, String::new(), 1, max_depth);

    while let Some((node, prefix, is_last, level)) = stack.pop() {
        cancel.check()?;
        let connector = if is_last { "└── " } else { "├── " };
        render_line(&mut out, &format!("{prefix}{connector}"), &node);

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        push_children(&mut stack, &node, child_prefix, level + 1, max_depth);
    }

    Ok(out)
}

fn push_children(
    stack: &mut Vec<(Arc<Element>, String, bool, usize)>,
    node: &Arc<Element>,
    prefix: String,
    level: usize,
    max_depth: usize,
) {
    if max_depth != 0 && level >= max_depth {
        return;
    }
    let children = node.children();
    let last = children.len().saturating_sub(1);
    for (i, child) in children.iter().enumerate().rev() {
        stack.push((Arc::clone(child), prefix.clone(), i == last, level));
    }
}

fn render_line(out: &mut String, lead: &str, node: &Element) {
    let _ = writeln!(
        out,
        "{lead}{}: {} [{}]",
        node.role(),
        truncate_label(node.label()),
        node.bounds()
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
