//! Per-kind dispatch table consulted by the reconciler.
//!
//! A [`NodeBehavior`] is a bundle of function values for one node kind. The
//! surrounding application registers one per kind it can draw; the
//! reconciler never knows about concrete widgets.

use crate::error::BehaviorError;
use crate::protocol::{Node, Update};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// User interaction delivered to an element.
#[derive(Debug, Clone, PartialEq)]
pub struct UiEvent {
    pub name: String,
    pub value: Option<Value>,
}

impl UiEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }
}

pub type EventHandler = Rc<dyn Fn(&str, &UiEvent) -> Vec<Update>>;

/// Event name plus the handler that turns `(key, event)` into outbound
/// updates.
#[derive(Clone)]
pub struct EventBinding {
    event: String,
    propagates: bool,
    handler: EventHandler,
}

impl EventBinding {
    pub fn new(
        event: impl Into<String>,
        handler: impl Fn(&str, &UiEvent) -> Vec<Update> + 'static,
    ) -> Self {
        Self {
            event: event.into(),
            propagates: false,
            handler: Rc::new(handler),
        }
    }

    /// Lets the event continue to the parent element after this binding ran.
    pub fn propagating(mut self) -> Self {
        self.propagates = true;
        self
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn propagates(&self) -> bool {
        self.propagates
    }

    pub fn handle(&self, key: &str, event: &UiEvent) -> Vec<Update> {
        (self.handler)(key, event)
    }
}

impl fmt::Debug for EventBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBinding")
            .field("event", &self.event)
            .field("propagates", &self.propagates)
            .finish_non_exhaustive()
    }
}

/// Bindings shared by most interactive kinds.
pub mod bindings {
    use super::{EventBinding, UiEvent};
    use crate::protocol::Update;
    use serde_json::Value;

    pub fn on_click() -> EventBinding {
        EventBinding::new("click", |key, _event| vec![Update::new(key, "clicked", true)])
    }

    pub fn on_click_propagate() -> EventBinding {
        on_click().propagating()
    }

    pub fn on_show() -> EventBinding {
        EventBinding::new("show", |key, _event| {
            vec![
                Update::new(key, "opened", true),
                Update::new(key, "visibility_changed", true),
            ]
        })
    }

    pub fn on_hide() -> EventBinding {
        EventBinding::new("hide", |key, _event| {
            vec![
                Update::new(key, "opened", false),
                Update::new(key, "visibility_changed", true),
            ]
        })
    }

    pub fn on_input() -> EventBinding {
        EventBinding::new("input", value_changed)
    }

    pub fn on_change() -> EventBinding {
        EventBinding::new("change", value_changed)
    }

    fn value_changed(key: &str, event: &UiEvent) -> Vec<Update> {
        vec![
            Update::new(key, "value", event.value.clone().unwrap_or(Value::Null)),
            Update::new(key, "changed", true),
        ]
    }
}

type CreateFn<H> = Rc<dyn Fn(&Node) -> Result<H, BehaviorError>>;
type UpdatePropertyFn<H> = Rc<dyn Fn(&mut H, &str, &str, &Value) -> Result<(), BehaviorError>>;
type SpecialSetupFn<H> = Rc<dyn Fn(&mut H, &Node)>;
type TeardownFn<H> = Rc<dyn Fn(&mut H)>;

pub struct NodeBehavior<H> {
    create: CreateFn<H>,
    update_property: UpdatePropertyFn<H>,
    event_bindings: Vec<EventBinding>,
    special_setup: Option<SpecialSetupFn<H>>,
    teardown: Option<TeardownFn<H>>,
}

impl<H> Clone for NodeBehavior<H> {
    fn clone(&self) -> Self {
        Self {
            create: self.create.clone(),
            update_property: self.update_property.clone(),
            event_bindings: self.event_bindings.clone(),
            special_setup: self.special_setup.clone(),
            teardown: self.teardown.clone(),
        }
    }
}

impl<H> NodeBehavior<H> {
    pub fn new(
        create: impl Fn(&Node) -> Result<H, BehaviorError> + 'static,
        update_property: impl Fn(&mut H, &str, &str, &Value) -> Result<(), BehaviorError> + 'static,
    ) -> Self {
        Self {
            create: Rc::new(create),
            update_property: Rc::new(update_property),
            event_bindings: Vec::new(),
            special_setup: None,
            teardown: None,
        }
    }

    pub fn with_event_binding(mut self, binding: EventBinding) -> Self {
        self.event_bindings.push(binding);
        self
    }

    pub fn with_special_setup(mut self, setup: impl Fn(&mut H, &Node) + 'static) -> Self {
        self.special_setup = Some(Rc::new(setup));
        self
    }

    pub fn with_teardown(mut self, teardown: impl Fn(&mut H) + 'static) -> Self {
        self.teardown = Some(Rc::new(teardown));
        self
    }

    pub fn create(&self, node: &Node) -> Result<H, BehaviorError> {
        (self.create)(node)
    }

    pub fn update_property(
        &self,
        handle: &mut H,
        kind: &str,
        property: &str,
        value: &Value,
    ) -> Result<(), BehaviorError> {
        (self.update_property)(handle, kind, property, value)
    }

    pub fn event_bindings(&self) -> &[EventBinding] {
        &self.event_bindings
    }

    pub fn special_setup(&self, handle: &mut H, node: &Node) {
        if let Some(setup) = &self.special_setup {
            setup(handle, node);
        }
    }

    pub fn teardown(&self, handle: &mut H) {
        if let Some(teardown) = &self.teardown {
            teardown(handle);
        }
    }
}

/// Lookup order: exact kind, then the first matching tag prefix, then the
/// fallback.
pub struct BehaviorTable<H> {
    by_kind: HashMap<String, Rc<NodeBehavior<H>>>,
    by_tag_prefix: Vec<(String, Rc<NodeBehavior<H>>)>,
    fallback: Option<Rc<NodeBehavior<H>>>,
}

impl<H> Default for BehaviorTable<H> {
    fn default() -> Self {
        Self {
            by_kind: HashMap::new(),
            by_tag_prefix: Vec::new(),
            fallback: None,
        }
    }
}

impl<H> BehaviorTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, behavior: NodeBehavior<H>) -> &mut Self {
        self.by_kind.insert(kind.into(), Rc::new(behavior));
        self
    }

    pub fn register_tag_prefix(
        &mut self,
        prefix: impl Into<String>,
        behavior: NodeBehavior<H>,
    ) -> &mut Self {
        self.by_tag_prefix.push((prefix.into(), Rc::new(behavior)));
        self
    }

    pub fn set_fallback(&mut self, behavior: NodeBehavior<H>) -> &mut Self {
        self.fallback = Some(Rc::new(behavior));
        self
    }

    pub fn resolve(&self, kind: &str, tag: &str) -> Option<Rc<NodeBehavior<H>>> {
        if let Some(behavior) = self.by_kind.get(kind) {
            return Some(behavior.clone());
        }

        self.by_tag_prefix
            .iter()
            .find(|(prefix, _)| tag.starts_with(prefix.as_str()))
            .map(|(_, behavior)| behavior.clone())
            .or_else(|| self.fallback.clone())
    }
}
