//! The platform-neutral UI element.
//!
//! An [`Element`] is an immutable attribute record plus one owned native
//! handle.  The only state that changes after construction is the children
//! slot, which is filled at most once, on first descent.
//!
//! # Hierarchy
//!
//! Elements live behind `Arc`.  A parent owns its loaded children; a child
//! only keeps a `Weak` link back, so an application tree never forms an
//! ownership cycle.  The flip side: once every strong reference to a root
//! is gone, its descendants report no parent.  Hold the root for as long as
//! you need [`ancestors`](crate::tree::ancestors) or
//! [`path`](crate::tree::path) on its descendants.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use serde::Serialize;

use crate::errors::UiaxError;
use crate::geometry::Rect;
use crate::platform::{Adapter, NativeElement, NativeHandle};
use crate::role::Role;

/// Longest label rendered before truncation.
pub(crate) const MAX_LABEL_CHARS: usize = 40;

/// Opaque per-query identifier: owning process plus native handle address.
///
/// Not stable across queries; never persist it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ElementId {
    pub pid: u32,
    pub address: usize,
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}", self.pid, self.address)
    }
}

/// One node of the UI element tree.
pub struct Element {
    id: ElementId,
    role: Role,
    name: String,
    title: String,
    value: String,
    description: String,
    bounds: Rect,
    enabled: bool,
    focused: bool,
    selected: bool,
    pid: u32,
    attributes: HashMap<String, serde_json::Value>,
    synthetic_root: bool,
    parent: Weak<Element>,
    /// Unset = not yet loaded; set-but-empty = loaded leaf.
    children: OnceLock<Vec<Arc<Element>>>,
    handle: Option<NativeHandle>,
    adapter: Option<Weak<dyn Adapter>>,
}

impl Element {
    /// Wrap an adapter record, linking it under `parent`.
    pub(crate) fn from_native(
        native: NativeElement,
        parent: Option<&Arc<Element>>,
        adapter: &Arc<dyn Adapter>,
        synthetic_root: bool,
    ) -> Arc<Element> {
        let NativeElement {
            role,
            name,
            title,
            value,
            description,
            bounds,
            enabled,
            focused,
            selected,
            pid,
            attributes,
            handle,
        } = native;

        Arc::new(Element {
            id: ElementId {
                pid,
                address: handle.address(),
            },
            role,
            name,
            title,
            value,
            description,
            bounds,
            enabled,
            focused,
            selected,
            pid,
            attributes,
            synthetic_root,
            parent: parent.map(Arc::downgrade).unwrap_or_default(),
            children: OnceLock::new(),
            handle: Some(handle),
            adapter: Some(Arc::downgrade(adapter)),
        })
    }

    /// Start building a detached element that is not backed by any adapter.
    pub fn builder(role: Role) -> ElementBuilder {
        ElementBuilder::new(role)
    }

    // -- attributes ---------------------------------------------------------

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Screen-space bounds.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Owning process id; `0` for the cross-application root.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn attributes(&self) -> &HashMap<String, serde_json::Value> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    /// True for the cross-application root handed out by `Finder::root`.
    pub fn is_synthetic_root(&self) -> bool {
        self.synthetic_root
    }

    /// First non-empty of name, title, value; `"(unnamed)"` otherwise.
    pub fn label(&self) -> &str {
        [&self.name, &self.title, &self.value]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or("(unnamed)")
    }

    // -- hierarchy ----------------------------------------------------------

    pub fn parent(&self) -> Option<Arc<Element>> {
        self.parent.upgrade()
    }

    /// Children, loading them through the adapter on first call.
    pub fn children(self: &Arc<Self>) -> &[Arc<Element>] {
        self.children.get_or_init(|| self.fetch_children())
    }

    /// Children if already loaded, without touching the adapter.
    pub fn loaded_children(&self) -> Option<&[Arc<Element>]> {
        self.children.get().map(Vec::as_slice)
    }

    pub fn children_loaded(&self) -> bool {
        self.children.get().is_some()
    }

    /// Populate the children slot.  Idempotent; native failures leave the
    /// element as a loaded leaf.
    pub fn load_children(self: &Arc<Self>) {
        let _ = self.children();
    }

    fn fetch_children(self: &Arc<Self>) -> Vec<Arc<Element>> {
        let (Some(handle), Some(adapter)) = (self.handle.as_ref(), self.adapter()) else {
            return Vec::new();
        };
        match adapter.load_children(handle) {
            Ok(natives) => natives
                .into_iter()
                .map(|native| Element::from_native(native, Some(self), &adapter, false))
                .collect(),
            Err(e) => {
                log::debug!("load_children({}) failed, treating as leaf: {e}", self.id);
                Vec::new()
            }
        }
    }

    // -- actions ------------------------------------------------------------

    /// Make this element the keyboard-focus target.
    pub fn focus(&self) -> Result<(), UiaxError> {
        let (adapter, handle) = self.native()?;
        adapter.focus(handle)
    }

    /// Invoke a named action (`"AXPress"`, `"press"`, ...).
    pub fn perform_action(&self, action: &str) -> Result<(), UiaxError> {
        let (adapter, handle) = self.native()?;
        adapter.perform_action(handle, action)
    }

    /// Set the element's textual value.
    pub fn set_value(&self, value: &str) -> Result<(), UiaxError> {
        let (adapter, handle) = self.native()?;
        adapter.set_value(handle, value)
    }

    fn adapter(&self) -> Option<Arc<dyn Adapter>> {
        self.adapter.as_ref().and_then(Weak::upgrade)
    }

    fn native(&self) -> Result<(Arc<dyn Adapter>, &NativeHandle), UiaxError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| UiaxError::InvalidElement(format!("element {} has no native handle", self.id)))?;
        let adapter = self.adapter().ok_or_else(UiaxError::closed)?;
        Ok((adapter, handle))
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("name", &self.name)
            .field("title", &self.title)
            .field("bounds", &self.bounds)
            .field("children_loaded", &self.children_loaded())
            .finish()
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [{}]",
            self.role,
            truncate_label(self.label()),
            self.bounds
        )
    }
}

/// Cap a label at [`MAX_LABEL_CHARS`] characters, ending in `…` when cut.
pub(crate) fn truncate_label(label: &str) -> String {
    if label.chars().count() <= MAX_LABEL_CHARS {
        return label.to_owned();
    }
    let mut out: String = label.chars().take(MAX_LABEL_CHARS - 1).collect();
    out.push('…');
    out
}

// ---------------------------------------------------------------------------
// Detached construction
// ---------------------------------------------------------------------------

/// Synthetic addresses for detached elements, far from real pointers.
static NEXT_DETACHED: AtomicUsize = AtomicUsize::new(1);

/// Builds adapter-free elements, e.g. to exercise selectors or render
/// fixtures.  Children given to the builder are attached eagerly, so a
/// built element's children slot is always loaded.
#[derive(Debug, Clone)]
pub struct ElementBuilder {
    role: Role,
    name: String,
    title: String,
    value: String,
    description: String,
    bounds: Rect,
    enabled: bool,
    focused: bool,
    selected: bool,
    pid: u32,
    attributes: HashMap<String, serde_json::Value>,
    children: Vec<ElementBuilder>,
}

impl ElementBuilder {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            name: String::new(),
            title: String::new(),
            value: String::new(),
            description: String::new(),
            bounds: Rect::default(),
            enabled: true,
            focused: false,
            selected: false,
            pid: 0,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn child(mut self, child: ElementBuilder) -> Self {
        self.children.push(child);
        self
    }

    pub fn build(self) -> Arc<Element> {
        self.build_under(Weak::new())
    }

    fn build_under(self, parent: Weak<Element>) -> Arc<Element> {
        let ElementBuilder {
            role,
            name,
            title,
            value,
            description,
            bounds,
            enabled,
            focused,
            selected,
            pid,
            attributes,
            children,
        } = self;
        let address = NEXT_DETACHED.fetch_add(1, Ordering::Relaxed);

        Arc::new_cyclic(|me: &Weak<Element>| {
            let built: Vec<Arc<Element>> = children
                .into_iter()
                .map(|child| child.build_under(me.clone()))
                .collect();
            Element {
                id: ElementId { pid, address },
                role,
                name,
                title,
                value,
                description,
                bounds,
                enabled,
                focused,
                selected,
                pid,
                attributes,
                synthetic_root: false,
                parent,
                children: OnceLock::from(built),
                handle: None,
                adapter: None,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_has_role_and_label() {
        let e = Element::builder(Role::Button)
            .name("Save")
            .bounds(Rect::new(10, 20, 80, 24))
            .build();
        let text = e.to_string();
        assert!(text.contains("Button"));
        assert!(text.contains("Save"));
        assert_eq!(text, "Button: Save [10,20 80×24]");
    }

    #[test]
    fn test_label_fallbacks() {
        let titled = Element::builder(Role::Window).title("Untitled").build();
        assert_eq!(titled.label(), "Untitled");
        let valued = Element::builder(Role::TextField).value("hello").build();
        assert_eq!(valued.label(), "hello");
        let bare = Element::builder(Role::Group).build();
        assert_eq!(bare.label(), "(unnamed)");
        assert!(bare.to_string().starts_with("Group: (unnamed)"));
    }

    #[test]
    fn test_truncate_label() {
        let long = "x".repeat(60);
        let cut = truncate_label(&long);
        assert_eq!(cut.chars().count(), MAX_LABEL_CHARS);
        assert!(cut.ends_with('…'));
        let exact = "y".repeat(MAX_LABEL_CHARS);
        assert_eq!(truncate_label(&exact), exact);
    }

    #[test]
    fn test_builder_links_parent() {
        let root = Element::builder(Role::Window)
            .pid(42)
            .child(Element::builder(Role::Button).pid(42).name("OK"))
            .build();
        let kids = root.children();
        assert_eq!(kids.len(), 1);
        let parent = kids[0].parent().unwrap();
        assert_eq!(parent.id(), root.id());
        assert_eq!(kids[0].pid(), root.pid());
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_builder_children_are_loaded() {
        let leaf = Element::builder(Role::StaticText).build();
        assert!(leaf.children_loaded());
        assert_eq!(leaf.loaded_children().map(<[_]>::len), Some(0));
        leaf.load_children();
        assert!(leaf.children().is_empty());
    }

    #[test]
    fn test_detached_actions_are_invalid() {
        let e = Element::builder(Role::Button).build();
        assert!(matches!(e.focus(), Err(UiaxError::InvalidElement(_))));
        assert!(matches!(e.perform_action("AXPress"), Err(UiaxError::InvalidElement(_))));
        assert!(matches!(e.set_value("x"), Err(UiaxError::InvalidElement(_))));
    }

    #[test]
    fn test_ids_are_distinct() {
        let a = Element::builder(Role::Button).build();
        let b = Element::builder(Role::Button).build();
        assert_ne!(a.id(), b.id());
        assert_ne!(*a, *b);
        assert_eq!(ElementId { pid: 7, address: 0x10 }.to_string(), "7:0x10");
    }
}
