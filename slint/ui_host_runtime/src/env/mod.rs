//! Environment adapters.
//!
//! Each adapter mirrors one piece of host state (location, theme, window,
//! clipboard) under a fixed key. It contributes bootstrap updates to the
//! connection URL and consumes its `singletons` entry from server frames.

mod clipboard;
mod location;
mod theme;
mod window;

pub use clipboard::ClipboardAdapter;
pub use location::{Location, LocationAdapter};
pub use theme::{Appearance, ThemeAdapter, ThemeMode};
pub use window::WindowAdapter;

use crate::protocol::Update;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub trait EnvironmentAdapter {
    /// Key of the adapter in `singletons` and in outbound updates.
    fn name(&self) -> &'static str;

    fn initial_updates(&self) -> Vec<Update>;

    fn apply_server_state(&mut self, props: &Map<String, Value>);
}

/// Lets the host keep a handle to an adapter it also feeds from the UI
/// (resize, back navigation, system theme changes).
impl<A: EnvironmentAdapter> EnvironmentAdapter for Rc<RefCell<A>> {
    fn name(&self) -> &'static str {
        self.borrow().name()
    }

    fn initial_updates(&self) -> Vec<Update> {
        self.borrow().initial_updates()
    }

    fn apply_server_state(&mut self, props: &Map<String, Value>) {
        self.borrow_mut().apply_server_state(props);
    }
}

#[derive(Default)]
pub struct Environment {
    adapters: Vec<Box<dyn EnvironmentAdapter>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: impl EnvironmentAdapter + 'static) -> &mut Self {
        self.adapters.push(Box::new(adapter));
        self
    }

    /// Bootstrap updates of every adapter, in registration order.
    pub fn initial_updates(&self) -> Vec<Update> {
        self.adapters
            .iter()
            .flat_map(|adapter| adapter.initial_updates())
            .collect()
    }

    pub fn apply_singletons(&mut self, singletons: &Map<String, Value>) {
        for (name, state) in singletons {
            let Some(adapter) = self.adapters.iter_mut().find(|a| a.name() == name) else {
                tracing::warn!(singleton = %name, "no environment adapter; skipping");
                continue;
            };

            match singleton_props(state) {
                Some(props) => adapter.apply_server_state(props),
                None => tracing::warn!(singleton = %name, "singleton state is not an object"),
            }
        }
    }
}

/// Singleton state is Node-shaped (`{"props": {...}}`); a bare object is
/// taken as the props themselves.
fn singleton_props(state: &Value) -> Option<&Map<String, Value>> {
    let object = state.as_object()?;

    match object.get("props").or_else(|| object.get("properties")) {
        Some(Value::Object(props)) => Some(props),
        _ => Some(object),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Outbox;
    use serde_json::json;
    use url::Url;

    fn environment(outbox: &Outbox) -> (Environment, Rc<RefCell<LocationAdapter>>) {
        let origin = Url::parse("tcp://127.0.0.1:8988/ws").expect("origin");
        let location = Rc::new(RefCell::new(LocationAdapter::new(outbox.clone(), origin, "/")));

        let mut environment = Environment::new();
        environment
            .register(location.clone())
            .register(ThemeAdapter::new(outbox.clone(), Appearance::Dark))
            .register(WindowAdapter::new(outbox.clone(), 840, 998))
            .register(ClipboardAdapter::new(outbox.clone(), |_text| {}));
        (environment, location)
    }

    #[test]
    fn initial_updates_follow_registration_order() {
        let outbox = Outbox::new();
        let (environment, _) = environment(&outbox);

        let keys: Vec<(String, String)> = environment
            .initial_updates()
            .into_iter()
            .map(|update| (update.key().to_string(), update.property().to_string()))
            .collect();
        let expected = [
            ("location", "protocol"),
            ("location", "host"),
            ("location", "path"),
            ("location", "query_args"),
            ("location", "hash_arg"),
            ("theme", "mode"),
            ("theme", "system_mode"),
            ("window", "width"),
            ("window", "height"),
            ("clipboard", "_value"),
        ];
        assert_eq!(
            keys,
            expected
                .iter()
                .map(|(k, p)| (k.to_string(), p.to_string()))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn singletons_reach_their_adapter_and_unknown_names_are_skipped() {
        let outbox = Outbox::new();
        let (mut environment, location) = environment(&outbox);

        let Value::Object(singletons) = json!({
            "cookies": {"props": {"session": "x"}},
            "location": {"props": {"path": "/inbox", "query_args": "", "hash_arg": ""}},
            "theme": {"mode": "light"},
            "window": 3
        }) else {
            panic!("object");
        };
        environment.apply_singletons(&singletons);

        assert_eq!(location.borrow().current(), &Location::new("/inbox", "", ""));
        assert_eq!(outbox.drain(), vec![Update::new("theme", "changed", true)]);
    }
}
