use super::EnvironmentAdapter;
use crate::batch::Outbox;
use crate::error::LocationError;
use crate::protocol::Update;
use serde_json::{Map, Value};
use std::fmt;
use url::Url;

/// Navigable location: `path[?query_args][#hash_arg]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub query_args: String,
    pub hash_arg: String,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            query_args: String::new(),
            hash_arg: String::new(),
        }
    }
}

impl Location {
    pub fn new(
        path: impl Into<String>,
        query_args: impl Into<String>,
        hash_arg: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            query_args: query_args.into(),
            hash_arg: hash_arg.into(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        let (rest, hash_arg) = raw.split_once('#').unwrap_or((raw, ""));
        let (path, query_args) = rest.split_once('?').unwrap_or((rest, ""));
        let path = if path.is_empty() { "/" } else { path };

        Self::new(path, query_args, hash_arg)
    }

    /// Missing parts read as empty; a missing path keeps `fallback`'s path.
    fn from_props(props: &Map<String, Value>, fallback: &Location) -> Self {
        let part = |name: &str| props.get(name).and_then(Value::as_str).map(str::to_string);

        Self {
            path: part("path").unwrap_or_else(|| fallback.path.clone()),
            query_args: part("query_args").unwrap_or_default(),
            hash_arg: part("hash_arg").unwrap_or_default(),
        }
    }

    /// Strips one trailing slash from any path but the root.
    pub fn normalized(mut self) -> Self {
        if self.path != "/" && self.path.ends_with('/') {
            self.path.pop();
        }
        self
    }

    pub fn updates(&self) -> Vec<Update> {
        vec![
            Update::new("location", "path", self.path.as_str()),
            Update::new("location", "query_args", self.query_args.as_str()),
            Update::new("location", "hash_arg", self.hash_arg.as_str()),
        ]
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        if !self.query_args.is_empty() {
            write!(f, "?{}", self.query_args)?;
        }
        if !self.hash_arg.is_empty() {
            write!(f, "#{}", self.hash_arg)?;
        }
        Ok(())
    }
}

/// Client-side location with a back stack.
///
/// Navigation initiated on the client (`navigate`, `go_back`) is reported to
/// the server. Locations pushed by the server are applied silently.
pub struct LocationAdapter {
    outbox: Outbox,
    origin: Url,
    current: Location,
    history: Vec<Location>,
}

impl LocationAdapter {
    /// `origin` is the server URL; its scheme and authority are reported as
    /// `protocol` and `host`, and every location must resolve within it.
    pub fn new(outbox: Outbox, origin: Url, initial: &str) -> Self {
        let current = Location::parse(initial).normalized();

        Self {
            outbox,
            origin,
            current,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> &Location {
        &self.current
    }

    pub fn can_go_back(&self) -> bool {
        !self.history.is_empty()
    }

    /// User navigation. Returns whether the location changed.
    pub fn navigate(&mut self, target: &str) -> Result<bool, LocationError> {
        self.push(Location::parse(target), true)
    }

    /// Returns whether there was a previous location to return to.
    pub fn go_back(&mut self) -> bool {
        let Some(previous) = self.history.pop() else {
            return false;
        };

        self.current = previous;
        self.outbox.enqueue_all(self.current.updates());
        true
    }

    fn push(&mut self, location: Location, report: bool) -> Result<bool, LocationError> {
        let location = location.normalized();
        if location == self.current {
            return Ok(false);
        }

        if let Err(err) = self.validate(&location) {
            tracing::warn!(error = %err, current = %self.current, "location change abandoned");
            return Err(err);
        }

        let previous = std::mem::replace(&mut self.current, location);
        self.history.push(previous);

        if report {
            self.outbox.enqueue_all(self.current.updates());
        }
        Ok(true)
    }

    fn validate(&self, location: &Location) -> Result<(), LocationError> {
        let raw = location.to_string();
        if !location.path.starts_with('/') || raw.chars().any(char::is_control) {
            return Err(LocationError::Invalid(raw));
        }

        // Non-special schemes have opaque origins, so compare the parts.
        match self.origin.join(&raw) {
            Ok(resolved)
                if resolved.scheme() == self.origin.scheme()
                    && resolved.host_str() == self.origin.host_str()
                    && resolved.port() == self.origin.port() =>
            {
                Ok(())
            }
            _ => Err(LocationError::Invalid(raw)),
        }
    }

    fn host(&self) -> String {
        match (self.origin.host_str(), self.origin.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        }
    }
}

impl EnvironmentAdapter for LocationAdapter {
    fn name(&self) -> &'static str {
        "location"
    }

    fn initial_updates(&self) -> Vec<Update> {
        let mut updates = vec![
            Update::new("location", "protocol", format!("{}:", self.origin.scheme())),
            Update::new("location", "host", self.host()),
        ];
        updates.extend(self.current.updates());
        updates
    }

    fn apply_server_state(&mut self, props: &Map<String, Value>) {
        let location = Location::from_props(props, &self.current);
        // Rejections are already logged; the prior location stays.
        let _ = self.push(location, false);
    }
}
