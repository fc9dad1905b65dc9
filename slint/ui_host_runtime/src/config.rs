use crate::channel::ChannelConfig;
use crate::env::ThemeMode;
use crate::error::ConfigError;
use crate::indicator::DEFAULT_UNSTABLE_GRACE;
use crate::protocol::SERVER_TO_CLIENT_CAP;
use std::time::Duration;
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "tcp://127.0.0.1:8988/ws";
pub const DEFAULT_BATCH_WAIT: Duration = Duration::from_millis(50);
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_millis(1000);
pub const DEFAULT_LOCATION: &str = "/";

/// Client settings read from `TETHER_*` environment variables. Numeric
/// values that are missing, unparsable, or zero fall back to the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub server_url: Url,
    pub batch_wait: Duration,
    pub reconnect_backoff: Duration,
    pub unstable_grace: Duration,
    pub initial_location: String,
    /// Inbound frames above this size are skipped.
    pub max_inbound_frame: usize,
    /// Theme mode the user picked in an earlier session.
    pub theme_mode: ThemeMode,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_url = lookup("TETHER_SERVER_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let server_url = Url::parse(&raw_url).map_err(|source| ConfigError::InvalidServerUrl {
            url: raw_url.clone(),
            source,
        })?;

        Ok(Self {
            server_url,
            batch_wait: parse_millis(&lookup, "TETHER_BATCH_WAIT_MS", DEFAULT_BATCH_WAIT),
            reconnect_backoff: parse_millis(
                &lookup,
                "TETHER_RECONNECT_BACKOFF_MS",
                DEFAULT_RECONNECT_BACKOFF,
            ),
            unstable_grace: parse_millis(&lookup, "TETHER_UNSTABLE_GRACE_MS", DEFAULT_UNSTABLE_GRACE),
            initial_location: lookup("TETHER_LOCATION")
                .filter(|location| !location.is_empty())
                .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            max_inbound_frame: lookup("TETHER_MAX_INBOUND_FRAME_BYTES")
                .and_then(|raw| raw.parse::<usize>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(SERVER_TO_CLIENT_CAP),
            theme_mode: parse_theme_mode(&lookup),
        })
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.server_url.clone(),
            batch_wait: self.batch_wait,
            reconnect_backoff: self.reconnect_backoff,
        }
    }
}

fn parse_theme_mode(lookup: &impl Fn(&str) -> Option<String>) -> ThemeMode {
    let Some(raw) = lookup("TETHER_THEME_MODE") else {
        return ThemeMode::default();
    };

    ThemeMode::parse(&raw).unwrap_or_else(|| {
        tracing::warn!(value = %raw, "unknown TETHER_THEME_MODE; following the system");
        ThemeMode::default()
    })
}

fn parse_millis(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: Duration) -> Duration {
    lookup(name)
        .and_then(|raw| raw.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_millis)
        .unwrap_or(default)
}
