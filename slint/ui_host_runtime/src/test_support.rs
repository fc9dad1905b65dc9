//! Fixtures shared by the unit tests.

use crate::behavior::{BehaviorTable, NodeBehavior, bindings};
use crate::error::{BehaviorError, TransportError};
use crate::transport::{Connection, Transport};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use url::Url;

/// Stand-in widget that records what the reconciler did to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub kind: String,
    pub properties: Map<String, Value>,
    pub set_up: bool,
}

pub type TornDown = Rc<RefCell<Vec<String>>>;

fn widget_behavior(known: &'static [&'static str], torn_down: TornDown) -> NodeBehavior<Widget> {
    NodeBehavior::new(
        |node| {
            Ok(Widget {
                kind: node.kind.clone(),
                properties: Map::new(),
                set_up: false,
            })
        },
        move |widget, kind, property, value| {
            if !known.contains(&property) {
                return Err(BehaviorError::UnknownProperty {
                    kind: kind.to_string(),
                    property: property.to_string(),
                });
            }
            widget.properties.insert(property.to_string(), value.clone());
            Ok(())
        },
    )
    .with_special_setup(|widget, _node| widget.set_up = true)
    .with_teardown(move |widget| torn_down.borrow_mut().push(widget.kind.clone()))
}

/// `container`, `button` (clickable), `text`, and a `link` whose click
/// bubbles to its parent.
pub fn widgets() -> (BehaviorTable<Widget>, TornDown) {
    let torn_down = TornDown::default();
    let mut table = BehaviorTable::new();

    table
        .register("container", widget_behavior(&["gap", "direction"], torn_down.clone()))
        .register(
            "button",
            widget_behavior(&["label", "disabled"], torn_down.clone())
                .with_event_binding(bindings::on_click()),
        )
        .register(
            "link",
            widget_behavior(&["label", "href"], torn_down.clone())
                .with_event_binding(bindings::on_click_propagate()),
        )
        .register("text", widget_behavior(&["content"], torn_down.clone()));

    (table, torn_down)
}

#[derive(Default)]
pub struct Script {
    pub fail_first: usize,
    pub attempts: Vec<(Instant, Url)>,
    pub sent: Rc<RefCell<Vec<String>>>,
    pub open: Option<Rc<Cell<bool>>>,
    pub inbound: Option<UnboundedSender<String>>,
}

impl Script {
    pub fn close_current(&self) {
        if let Some(open) = &self.open {
            open.set(false);
        }
    }

    pub fn push_inbound(&self, frame: &str) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(frame.to_string());
        }
    }
}

/// In-memory transport driven by a shared [`Script`].
pub struct ScriptedTransport(pub Rc<RefCell<Script>>);

pub struct ScriptedConnection {
    open: Rc<Cell<bool>>,
    sent: Rc<RefCell<Vec<String>>>,
}

#[async_trait(?Send)]
impl Transport for ScriptedTransport {
    type Connection = ScriptedConnection;

    async fn connect(
        &mut self,
        url: &Url,
        inbound: UnboundedSender<String>,
    ) -> Result<ScriptedConnection, TransportError> {
        let mut script = self.0.borrow_mut();
        script.attempts.push((Instant::now(), url.clone()));

        if script.attempts.len() <= script.fail_first {
            return Err(TransportError::Closed);
        }

        let open = Rc::new(Cell::new(true));
        script.open = Some(open.clone());
        script.inbound = Some(inbound);

        Ok(ScriptedConnection {
            open,
            sent: script.sent.clone(),
        })
    }
}

impl Connection for ScriptedConnection {
    fn is_open(&self) -> bool {
        self.open.get()
    }

    fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.sent.borrow_mut().push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.open.set(false);
    }
}
