use super::EnvironmentAdapter;
use crate::batch::Outbox;
use crate::protocol::Update;
use serde_json::{Map, Value};

/// Viewport size. Read-only from the server's side.
pub struct WindowAdapter {
    outbox: Outbox,
    width: u32,
    height: u32,
}

impl WindowAdapter {
    pub fn new(outbox: Outbox, width: u32, height: u32) -> Self {
        Self {
            outbox,
            width,
            height,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Reports the new size unless it is unchanged.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if (width, height) == (self.width, self.height) {
            return false;
        }

        self.width = width;
        self.height = height;

        let mut updates = self.initial_updates();
        updates.push(Update::new("window", "changed", true));
        self.outbox.enqueue_all(updates);
        true
    }
}

impl EnvironmentAdapter for WindowAdapter {
    fn name(&self) -> &'static str {
        "window"
    }

    fn initial_updates(&self) -> Vec<Update> {
        vec![
            Update::new("window", "width", self.width),
            Update::new("window", "height", self.height),
        ]
    }

    fn apply_server_state(&mut self, _props: &Map<String, Value>) {}
}
