//! Arena of live elements.
//!
//! Elements are addressed by [`ElementId`]; parent/child links are indices
//! into the arena, so removing a subtree is an explicit-stack walk rather
//! than recursion.

use crate::behavior::{EventBinding, UiEvent};
use crate::protocol::Update;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

impl ElementId {
    pub fn index(self) -> usize {
        self.0
    }
}

pub struct LiveElement<H> {
    pub key: String,
    pub kind: String,
    pub tag: String,
    pub classes: Vec<String>,
    pub handle: H,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    bindings: Vec<EventBinding>,
}

impl<H> LiveElement<H> {
    pub fn new(
        key: impl Into<String>,
        kind: impl Into<String>,
        tag: impl Into<String>,
        classes: Vec<String>,
        handle: H,
    ) -> Self {
        Self {
            key: key.into(),
            kind: kind.into(),
            tag: tag.into(),
            classes,
            handle,
            parent: None,
            children: Vec::new(),
            bindings: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    pub fn bindings(&self) -> &[EventBinding] {
        &self.bindings
    }

    /// Runs the bindings installed for `event.name`.
    ///
    /// Returns the produced updates and whether the event keeps bubbling to
    /// the parent. An element with no matching binding lets it bubble.
    pub fn handle_event(&self, event: &UiEvent) -> (Vec<Update>, bool) {
        let mut updates = Vec::new();
        let mut bubbles = true;

        for binding in self.bindings.iter().filter(|b| b.event() == event.name) {
            updates.extend(binding.handle(&self.key, event));
            bubbles &= binding.propagates();
        }

        (updates, bubbles)
    }
}

impl<H: std::fmt::Debug> std::fmt::Debug for LiveElement<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveElement")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("tag", &self.tag)
            .field("classes", &self.classes)
            .field("handle", &self.handle)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

pub struct ElementTree<H> {
    slots: Vec<Option<LiveElement<H>>>,
    free: Vec<usize>,
    root: Option<ElementId>,
    len: usize,
}

impl<H> Default for ElementTree<H> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        }
    }
}

impl<H> ElementTree<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn root(&self) -> Option<ElementId> {
        self.root
    }

    pub fn set_root(&mut self, root: Option<ElementId>) {
        self.root = root;
    }

    pub fn get(&self, id: ElementId) -> Option<&LiveElement<H>> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut LiveElement<H>> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.get(id).map(LiveElement::children).unwrap_or(&[])
    }

    /// Adds a detached element.
    pub fn insert(&mut self, element: LiveElement<H>) -> ElementId {
        self.len += 1;

        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(element);
                ElementId(index)
            }
            None => {
                self.slots.push(Some(element));
                ElementId(self.slots.len() - 1)
            }
        }
    }

    pub fn set_bindings(&mut self, id: ElementId, bindings: Vec<EventBinding>) {
        if let Some(element) = self.get_mut(id) {
            element.bindings = bindings;
        }
    }

    pub fn append_child(&mut self, parent: ElementId, child: ElementId) {
        let at = self.children(parent).len();
        self.insert_child(parent, at, child);
    }

    /// Attaches `child` at `at`, clamped to the current child count. Returns
    /// the index actually used.
    pub fn insert_child(&mut self, parent: ElementId, at: usize, child: ElementId) -> usize {
        let Some(parent_element) = self.get_mut(parent) else {
            return 0;
        };
        let at = at.min(parent_element.children.len());
        parent_element.children.insert(at, child);

        if let Some(child_element) = self.get_mut(child) {
            child_element.parent = Some(parent);
        }

        at
    }

    /// Unlinks up to `count` consecutive children starting at `at`. The
    /// detached subtrees stay in the arena until [`remove_subtree`] is called.
    ///
    /// [`remove_subtree`]: ElementTree::remove_subtree
    pub fn detach_range(&mut self, parent: ElementId, at: usize, count: usize) -> Vec<ElementId> {
        let Some(parent_element) = self.get_mut(parent) else {
            return Vec::new();
        };

        let len = parent_element.children.len();
        let start = at.min(len);
        let end = at.saturating_add(count).min(len);
        let detached: Vec<ElementId> = parent_element.children.drain(start..end).collect();

        for id in &detached {
            if let Some(element) = self.get_mut(*id) {
                element.parent = None;
            }
        }

        detached
    }

    /// Frees `root` and every descendant, returning them in pre-order.
    pub fn remove_subtree(&mut self, root: ElementId) -> Vec<(ElementId, LiveElement<H>)> {
        if let Some(parent) = self.get(root).and_then(LiveElement::parent) {
            if let Some(parent_element) = self.get_mut(parent) {
                parent_element.children.retain(|child| *child != root);
            }
        }
        if self.root == Some(root) {
            self.root = None;
        }

        let mut removed = Vec::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            let Some(element) = self.slots.get_mut(id.0).and_then(Option::take) else {
                continue;
            };
            self.free.push(id.0);
            self.len -= 1;

            stack.extend(element.children.iter().rev().copied());
            removed.push((id, element));
        }

        removed
    }

    /// Empties the arena, returning every element that was live.
    pub fn clear(&mut self) -> Vec<LiveElement<H>> {
        self.root = None;
        self.free.clear();
        self.len = 0;
        self.slots.drain(..).flatten().collect()
    }

    /// Pre-order walk from the root with the depth of each element.
    pub fn walk(&self) -> Vec<(ElementId, usize)> {
        let mut visited = Vec::with_capacity(self.len);
        let mut stack: Vec<(ElementId, usize)> = self.root.into_iter().map(|id| (id, 0)).collect();

        while let Some((id, depth)) = stack.pop() {
            let Some(element) = self.get(id) else {
                continue;
            };
            visited.push((id, depth));
            stack.extend(element.children.iter().rev().map(|child| (*child, depth + 1)));
        }

        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(key: &str) -> LiveElement<()> {
        LiveElement::new(key, "container", "div", Vec::new(), ())
    }

    fn keys(tree: &ElementTree<()>, ids: &[ElementId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| tree.get(*id))
            .map(|element| element.key.clone())
            .collect()
    }

    #[test]
    fn insert_child_clamps_index_past_the_end() {
        let mut tree = ElementTree::new();
        let root = tree.insert(element("root"));
        let a = tree.insert(element("a"));
        let b = tree.insert(element("b"));

        assert_eq!(tree.insert_child(root, 0, a), 0);
        assert_eq!(tree.insert_child(root, 7, b), 1);
        assert_eq!(keys(&tree, tree.children(root)), vec!["a", "b"]);
        assert_eq!(tree.get(b).and_then(LiveElement::parent), Some(root));
    }

    #[test]
    fn remove_subtree_frees_descendants_in_pre_order() {
        let mut tree = ElementTree::new();
        let root = tree.insert(element("root"));
        tree.set_root(Some(root));
        let list = tree.insert(element("list"));
        let item_a = tree.insert(element("item-a"));
        let item_b = tree.insert(element("item-b"));
        let label = tree.insert(element("label"));
        tree.append_child(root, list);
        tree.append_child(list, item_a);
        tree.append_child(list, item_b);
        tree.append_child(item_a, label);

        let detached = tree.detach_range(root, 0, 1);
        assert_eq!(detached, vec![list]);
        let removed: Vec<String> = tree
            .remove_subtree(list)
            .into_iter()
            .map(|(_, element)| element.key)
            .collect();

        assert_eq!(removed, vec!["list", "item-a", "label", "item-b"]);
        assert_eq!(tree.len(), 1);
        assert!(tree.children(root).is_empty());

        // Freed slots are reused.
        let reused = tree.insert(element("fresh"));
        assert!(reused.index() < 5);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn detach_range_is_clamped_to_live_children() {
        let mut tree = ElementTree::new();
        let root = tree.insert(element("root"));
        for key in ["a", "b", "c"] {
            let child = tree.insert(element(key));
            tree.append_child(root, child);
        }

        let detached = tree.detach_range(root, 1, 10);
        assert_eq!(keys(&tree, &detached), vec!["b", "c"]);
        assert_eq!(keys(&tree, tree.children(root)), vec!["a"]);
        assert!(tree.detach_range(root, 4, 1).is_empty());
    }

    #[test]
    fn walk_reports_depths() {
        let mut tree = ElementTree::new();
        let root = tree.insert(element("root"));
        tree.set_root(Some(root));
        let nav = tree.insert(element("nav"));
        let link = tree.insert(element("link"));
        let body = tree.insert(element("body"));
        tree.append_child(root, nav);
        tree.append_child(nav, link);
        tree.append_child(root, body);

        let walked: Vec<(String, usize)> = tree
            .walk()
            .into_iter()
            .filter_map(|(id, depth)| tree.get(id).map(|e| (e.key.clone(), depth)))
            .collect();
        assert_eq!(
            walked,
            vec![
                ("root".to_string(), 0),
                ("nav".to_string(), 1),
                ("link".to_string(), 2),
                ("body".to_string(), 1),
            ]
        );

        assert_eq!(tree.clear().len(), 4);
        assert!(tree.is_empty());
        assert!(tree.walk().is_empty());
    }
}
