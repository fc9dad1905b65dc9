use super::EnvironmentAdapter;
use crate::batch::Outbox;
use crate::protocol::Update;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemeMode {
    #[default]
    System,
    Light,
    Dark,
}

impl ThemeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ThemeMode::System => "system",
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "system" => Some(ThemeMode::System),
            "light" => Some(ThemeMode::Light),
            "dark" => Some(ThemeMode::Dark),
            _ => None,
        }
    }
}

/// What is actually drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Appearance {
    #[default]
    Light,
    Dark,
}

impl Appearance {
    pub fn as_str(self) -> &'static str {
        match self {
            Appearance::Light => "light",
            Appearance::Dark => "dark",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "light" => Some(Appearance::Light),
            "dark" => Some(Appearance::Dark),
            _ => None,
        }
    }
}

pub struct ThemeAdapter {
    outbox: Outbox,
    mode: ThemeMode,
    system: Appearance,
}

impl ThemeAdapter {
    pub fn new(outbox: Outbox, system: Appearance) -> Self {
        Self {
            outbox,
            mode: ThemeMode::System,
            system,
        }
    }

    /// Mode chosen by the user before the session started.
    pub fn with_mode(mut self, mode: ThemeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ThemeMode {
        self.mode
    }

    pub fn system_mode(&self) -> Appearance {
        self.system
    }

    /// `system` follows the host; the explicit modes override it.
    pub fn appearance(&self) -> Appearance {
        match self.mode {
            ThemeMode::System => self.system,
            ThemeMode::Light => Appearance::Light,
            ThemeMode::Dark => Appearance::Dark,
        }
    }

    /// The host's color-scheme preference changed.
    pub fn set_system_mode(&mut self, system: Appearance) {
        self.system = system;

        let mut updates = self.updates();
        updates.push(Update::new("theme", "changed", true));
        self.outbox.enqueue_all(updates);
    }

    fn updates(&self) -> Vec<Update> {
        vec![
            Update::new("theme", "mode", self.mode.as_str()),
            Update::new("theme", "system_mode", self.system.as_str()),
        ]
    }
}

impl EnvironmentAdapter for ThemeAdapter {
    fn name(&self) -> &'static str {
        "theme"
    }

    fn initial_updates(&self) -> Vec<Update> {
        self.updates()
    }

    fn apply_server_state(&mut self, props: &Map<String, Value>) {
        if let Some(raw) = props.get("mode").and_then(Value::as_str) {
            match ThemeMode::parse(raw) {
                Some(mode) => self.mode = mode,
                None => tracing::warn!(mode = raw, "ignoring unknown theme mode"),
            }
        }
        if let Some(system) = props
            .get("system_mode")
            .and_then(Value::as_str)
            .and_then(Appearance::parse)
        {
            self.system = system;
        }

        tracing::debug!(appearance = self.appearance().as_str(), "theme applied");
        self.outbox.enqueue(Update::new("theme", "changed", true));
    }
}
