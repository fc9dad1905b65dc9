use super::EnvironmentAdapter;
use crate::batch::Outbox;
use crate::protocol::Update;
use serde_json::{Map, Value};

type ClipboardWriter = Box<dyn FnMut(&str)>;

/// Write-only clipboard. Every server write is acknowledged by resetting
/// `_value`, so writing the same text twice is seen as two writes.
pub struct ClipboardAdapter {
    outbox: Outbox,
    writer: ClipboardWriter,
}

impl ClipboardAdapter {
    pub fn new(outbox: Outbox, writer: impl FnMut(&str) + 'static) -> Self {
        Self {
            outbox,
            writer: Box::new(writer),
        }
    }
}

impl EnvironmentAdapter for ClipboardAdapter {
    fn name(&self) -> &'static str {
        "clipboard"
    }

    fn initial_updates(&self) -> Vec<Update> {
        vec![Update::new("clipboard", "_value", "")]
    }

    fn apply_server_state(&mut self, props: &Map<String, Value>) {
        let text = props
            .get("value")
            .or_else(|| props.get("_value"))
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty());

        if let Some(text) = text {
            (self.writer)(text);
        }

        self.outbox
            .enqueue(Update::new("clipboard", "_value", "$reset"));
    }
}
