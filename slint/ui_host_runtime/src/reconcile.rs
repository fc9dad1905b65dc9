//! Tree materialization and keyed diff application.
//!
//! Nothing here suspends: a full tree or a diff is applied to the arena and
//! both caches in one synchronous pass. Expected problems (unknown keys,
//! kinds or properties, malformed entries) are logged, collected in a
//! [`DiffOutcome`], and skipped.

use crate::behavior::{BehaviorTable, NodeBehavior};
use crate::error::ReconcileError;
use crate::protocol::{DiffEntry, Node, RangeOp};
use crate::session::SessionContext;
use crate::tree::{ElementId, LiveElement};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementCacheEntry {
    pub kind: String,
    pub tag: String,
    pub element: ElementId,
}

/// Live key → element lookup. A key is present iff its element is live.
pub type ElementCache = HashMap<String, ElementCacheEntry>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiffOutcome {
    /// Diff entries (or the one root node) that were applied, even partially.
    pub applied: usize,
    pub errors: Vec<ReconcileError>,
}

impl DiffOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn report(&mut self, error: ReconcileError) {
        tracing::warn!(error = %error, "reconcile step skipped");
        self.errors.push(error);
    }
}

pub struct Reconciler<H> {
    behaviors: BehaviorTable<H>,
}

impl<H> Reconciler<H> {
    pub fn new(behaviors: BehaviorTable<H>) -> Self {
        Self { behaviors }
    }

    /// Tears down everything live, empties both caches and the style sheet,
    /// then materializes `root` from scratch.
    pub fn replace_root(&self, cx: &mut SessionContext<H>, root: &Node) -> DiffOutcome {
        let mut outcome = DiffOutcome::default();

        for mut element in cx.tree.clear() {
            self.teardown(&mut element);
        }
        cx.elements.clear();
        cx.styles.reset_all();

        let root_id = self.materialize(cx, root, &mut outcome);
        cx.tree.set_root(root_id);
        if root_id.is_some() {
            outcome.applied = 1;
        }

        tracing::debug!(
            elements = cx.tree.len(),
            rules = cx.styles.sheet().len(),
            "materialized tree"
        );
        outcome
    }

    /// Creates `node` and its subtree, depth-first and parent before
    /// children. The returned element is detached; the caller links it.
    ///
    /// A node whose kind has no behavior, or whose creation fails, is skipped
    /// together with its whole subtree.
    pub fn materialize(
        &self,
        cx: &mut SessionContext<H>,
        node: &Node,
        outcome: &mut DiffOutcome,
    ) -> Option<ElementId> {
        let Some(behavior) = self.behaviors.resolve(&node.kind, &node.tag) else {
            outcome.report(ReconcileError::UnknownKind {
                key: node.key.clone(),
                kind: node.kind.clone(),
                tag: node.tag.clone(),
            });
            return None;
        };

        let mut handle = match behavior.create(node) {
            Ok(handle) => handle,
            Err(source) => {
                outcome.report(ReconcileError::Create {
                    key: node.key.clone(),
                    source,
                });
                return None;
            }
        };

        for (property, value) in &node.properties {
            if let Err(source) = behavior.update_property(&mut handle, &node.kind, property, value) {
                outcome.report(ReconcileError::Property {
                    key: node.key.clone(),
                    property: property.clone(),
                    source,
                });
            }
        }

        let id = cx.tree.insert(LiveElement::new(
            node.key.clone(),
            node.kind.clone(),
            node.tag.clone(),
            node.classes.clone(),
            handle,
        ));

        for child in &node.children {
            if let Some(child_id) = self.materialize(cx, child, outcome) {
                cx.tree.append_child(id, child_id);
            }
        }

        cx.tree.set_bindings(id, behavior.event_bindings().to_vec());
        if let Some(element) = cx.tree.get_mut(id) {
            behavior.special_setup(&mut element.handle, node);
        }

        let previous = cx.elements.insert(
            node.key.clone(),
            ElementCacheEntry {
                kind: node.kind.clone(),
                tag: node.tag.clone(),
                element: id,
            },
        );
        if previous.is_some() {
            tracing::warn!(key = %node.key, "duplicate key; newest element wins the cache entry");
        }

        if let Some(style) = &node.style {
            cx.styles.set_style(&node.key, style);
        }

        Some(id)
    }

    /// Applies `diff` entry by entry in the order the server wrote them.
    /// Each key's changes are visible to the keys after it.
    pub fn apply_diff(&self, cx: &mut SessionContext<H>, diff: &Map<String, Value>) -> DiffOutcome {
        let mut outcome = DiffOutcome::default();

        for (key, raw) in diff {
            let entry = match DiffEntry::deserialize(raw) {
                Ok(entry) => entry,
                Err(err) => {
                    outcome.report(ReconcileError::MalformedEntry {
                        key: key.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let Some(cached) = cx.elements.get(key).cloned() else {
                outcome.report(ReconcileError::UnknownKey(key.clone()));
                continue;
            };

            if let Some(properties) = &entry.properties {
                self.apply_properties(cx, key, &cached, properties, &mut outcome);
            }

            if let Some(ops) = &entry.children {
                for op in ops {
                    self.apply_range_op(cx, key, cached.element, op, &mut outcome);
                }
            }

            if let Some(style) = &entry.style {
                cx.styles.set_style(key, style);
            }

            outcome.applied += 1;
        }

        outcome
    }

    fn apply_properties(
        &self,
        cx: &mut SessionContext<H>,
        key: &str,
        cached: &ElementCacheEntry,
        properties: &Map<String, Value>,
        outcome: &mut DiffOutcome,
    ) {
        let Some(behavior) = self.behaviors.resolve(&cached.kind, &cached.tag) else {
            outcome.report(ReconcileError::UnknownKind {
                key: key.to_string(),
                kind: cached.kind.clone(),
                tag: cached.tag.clone(),
            });
            return;
        };
        let Some(element) = cx.tree.get_mut(cached.element) else {
            outcome.report(ReconcileError::UnknownKey(key.to_string()));
            return;
        };

        for (property, value) in properties {
            if let Err(source) =
                behavior.update_property(&mut element.handle, &cached.kind, property, value)
            {
                outcome.report(ReconcileError::Property {
                    key: key.to_string(),
                    property: property.clone(),
                    source,
                });
            }
        }
    }

    fn apply_range_op(
        &self,
        cx: &mut SessionContext<H>,
        key: &str,
        parent: ElementId,
        op: &RangeOp,
        outcome: &mut DiffOutcome,
    ) {
        match op {
            RangeOp::Insert { at, nodes } => {
                let len = cx.tree.children(parent).len();
                let mut position = if *at > len {
                    tracing::warn!(key, at, len, "insert past the end; appending");
                    len
                } else {
                    *at
                };

                for node in nodes {
                    if let Some(child) = self.materialize(cx, node, outcome) {
                        cx.tree.insert_child(parent, position, child);
                        position += 1;
                    }
                }
            }
            RangeOp::Delete { at, count } => {
                let detached = cx.tree.detach_range(parent, *at, *count);
                if detached.len() < *count {
                    outcome.report(ReconcileError::ShortDelete {
                        key: key.to_string(),
                        at: *at,
                        count: *count,
                        removed: detached.len(),
                    });
                }

                let mut purged = Vec::new();
                for root in detached {
                    for (id, mut element) in cx.tree.remove_subtree(root) {
                        if cx
                            .elements
                            .get(&element.key)
                            .is_some_and(|entry| entry.element == id)
                        {
                            cx.elements.remove(&element.key);
                            purged.push(element.key.clone());
                        }
                        self.teardown(&mut element);
                    }
                }

                cx.styles.remove_styles(&purged);
                tracing::trace!(key, removed = purged.len(), "deleted child range");
            }
        }
    }

    fn teardown(&self, element: &mut LiveElement<H>) {
        if let Some(behavior) = self.behavior_for(element) {
            behavior.teardown(&mut element.handle);
        }
    }

    fn behavior_for(&self, element: &LiveElement<H>) -> Option<Rc<NodeBehavior<H>>> {
        self.behaviors.resolve(&element.kind, &element.tag)
    }
}
