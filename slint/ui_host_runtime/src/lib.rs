//! Client runtime for server-driven UIs.
//!
//! A remote process owns application state and describes the UI as a keyed
//! node tree. This crate keeps a persistent connection to it, materializes
//! that tree into host elements through a pluggable [`BehaviorTable`],
//! applies incremental diffs, and reports user interaction and environment
//! facts back as `(key, property, value)` updates.
//!
//! Everything runs on one thread: the session state lives in `Rc`/`RefCell`
//! and the channel is driven on a Tokio current-thread runtime (inside a
//! `LocalSet` when the host spawns local tasks).

pub mod batch;
pub mod behavior;
pub mod channel;
pub mod client;
pub mod commands;
pub mod config;
pub mod env;
pub mod error;
pub mod indicator;
pub mod protocol;
pub mod reconcile;
pub mod session;
pub mod style;
pub mod transport;
pub mod tree;

#[cfg(test)]
mod test_support;

pub use crate::batch::Outbox;
pub use crate::behavior::{BehaviorTable, EventBinding, NodeBehavior, UiEvent, bindings};
pub use crate::channel::{Channel, ChannelConfig, ConnectionState, StateHandle};
pub use crate::client::Client;
pub use crate::commands::{CommandExecutor, CommandTarget, LocalStorage};
pub use crate::config::ClientConfig;
pub use crate::env::{Environment, EnvironmentAdapter};
pub use crate::error::{
    BehaviorError, CommandError, ConfigError, LocationError, ProtocolError, ReconcileError,
    TransportError,
};
pub use crate::indicator::{ConnectionIndicator, IndicatorState};
pub use crate::protocol::{
    CLIENT_TO_SERVER_CAP, Command, DiffEntry, Node, RangeOp, SERVER_TO_CLIENT_CAP, ServerFrame,
    StyleMap, Update,
};
pub use crate::reconcile::{DiffOutcome, ElementCacheEntry, Reconciler};
pub use crate::session::{Session, SessionContext};
pub use crate::transport::{Connection, TcpTransport, Transport};
pub use crate::tree::{ElementId, ElementTree, LiveElement};
pub use serde_json;
