//! Selector-indexed style rules.
//!
//! The sheet is one shared, ordered rule list. The cache indexes the live
//! rule for every selector and remembers which selectors each key owns, so
//! updates touch only the rules that changed.

use crate::protocol::StyleMap;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    id: RuleId,
    selector: String,
    text: String,
}

impl StyleRule {
    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// `selector {text}`
    pub fn css(&self) -> String {
        format!("{} {{{}}}", self.selector, self.text)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleSheet {
    order: Vec<RuleId>,
    rules: HashMap<RuleId, StyleRule>,
    next_id: u64,
}

impl StyleSheet {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn rule(&self, id: RuleId) -> Option<&StyleRule> {
        self.rules.get(&id)
    }

    pub fn rules(&self) -> impl Iterator<Item = &StyleRule> {
        self.order.iter().filter_map(|id| self.rules.get(id))
    }

    pub fn css_text(&self) -> String {
        self.rules()
            .map(StyleRule::css)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn append(&mut self, selector: &str, text: &str) -> RuleId {
        let id = RuleId(self.next_id);
        self.next_id += 1;
        self.order.push(id);
        self.rules.insert(
            id,
            StyleRule {
                id,
                selector: selector.to_string(),
                text: text.to_string(),
            },
        );
        id
    }

    fn rewrite(&mut self, id: RuleId, text: &str) -> bool {
        match self.rules.get_mut(&id) {
            Some(rule) => {
                rule.text = text.to_string();
                true
            }
            None => false,
        }
    }

    /// One pass over the rule list.
    fn remove_selectors(&mut self, selectors: &HashSet<String>) -> usize {
        let before = self.order.len();
        let rules = &mut self.rules;

        self.order.retain(|id| {
            let doomed = rules
                .get(id)
                .is_none_or(|rule| selectors.contains(&rule.selector));
            if doomed {
                rules.remove(id);
            }
            !doomed
        });

        before - self.order.len()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.rules.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleCache {
    sheet: StyleSheet,
    index: HashMap<String, RuleId>,
    by_key: HashMap<String, HashMap<String, String>>,
}

impl StyleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(&self) -> &StyleSheet {
        &self.sheet
    }

    pub fn rule_for(&self, selector: &str) -> Option<&StyleRule> {
        self.index.get(selector).and_then(|id| self.sheet.rule(*id))
    }

    pub fn style_of(&self, key: &str) -> Option<&HashMap<String, String>> {
        self.by_key.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }

    /// Replaces the style owned by `key`: vanished selectors are removed,
    /// changed text is rewritten in place, new selectors are appended.
    pub fn set_style(&mut self, key: &str, style: &StyleMap) {
        let previous = self.by_key.remove(key).unwrap_or_default();

        let vanished: HashSet<String> = previous
            .keys()
            .filter(|selector| style.get(selector).is_none())
            .cloned()
            .collect();
        self.remove_selectors(&vanished);

        let mut current = HashMap::with_capacity(style.len());
        for (selector, text) in style.iter() {
            if previous.get(selector).map(String::as_str) != Some(text) {
                self.upsert(selector, text);
            }
            current.insert(selector.to_string(), text.to_string());
        }

        if !current.is_empty() {
            self.by_key.insert(key.to_string(), current);
        }
    }

    /// Drops every selector owned by `keys` with a single pass over the sheet.
    pub fn remove_styles<I, K>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut selectors = HashSet::new();
        for key in keys {
            if let Some(owned) = self.by_key.remove(key.as_ref()) {
                selectors.extend(owned.into_keys());
            }
        }

        self.remove_selectors(&selectors);
    }

    pub fn reset_all(&mut self) {
        self.sheet.clear();
        self.index.clear();
        self.by_key.clear();
    }

    fn upsert(&mut self, selector: &str, text: &str) {
        if let Some(id) = self.index.get(selector) {
            if self.sheet.rewrite(*id, text) {
                return;
            }
        }

        let id = self.sheet.append(selector, text);
        self.index.insert(selector.to_string(), id);
    }

    fn remove_selectors(&mut self, selectors: &HashSet<String>) {
        if selectors.is_empty() {
            return;
        }

        let removed = self.sheet.remove_selectors(selectors);
        for selector in selectors {
            self.index.remove(selector);
        }
        tracing::trace!(removed, "removed style rules");
    }
}
