//! Persistent-reconnect message channel.
//!
//! One physical connection at a time. The drive loop cycles
//! `Disconnected → Connecting → Connected → Disconnected` for the lifetime of
//! the session, with a constant backoff between failed connects. Delivery is
//! best-effort: a batch sent in the window between the liveness check and the
//! link actually dying is lost without an error.

use crate::batch::Outbox;
use crate::protocol::{
    CLIENT_TO_SERVER_CAP, ServerFrame, Update, decode_server_frame, encode_update_frames,
};
use crate::transport::{Connection, Transport};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: Url,
    pub batch_wait: Duration,
    pub reconnect_backoff: Duration,
}

type MessageHandler = Box<dyn FnMut(&ServerFrame)>;
type ConnectionHandler = Box<dyn FnMut(bool)>;
type InitialUpdates = Box<dyn Fn() -> Vec<Update>>;

#[derive(Default)]
struct Observers {
    message: RefCell<Vec<MessageHandler>>,
    connection_change: RefCell<Vec<ConnectionHandler>>,
}

impl Observers {
    fn emit_message(&self, frame: &ServerFrame) {
        for handler in self.message.borrow_mut().iter_mut() {
            handler(frame);
        }
    }

    fn emit_connection_change(&self, connected: bool) {
        for handler in self.connection_change.borrow_mut().iter_mut() {
            handler(connected);
        }
    }
}

/// Read-only view of the channel state that stays valid after `run` takes
/// the channel.
#[derive(Debug, Clone)]
pub struct StateHandle(Rc<Cell<ConnectionState>>);

impl StateHandle {
    pub fn get(&self) -> ConnectionState {
        self.0.get()
    }
}

pub struct Channel<T: Transport> {
    transport: T,
    shared: Shared,
}

struct Shared {
    config: ChannelConfig,
    outbox: Outbox,
    state: Rc<Cell<ConnectionState>>,
    client_id: RefCell<Option<String>>,
    initial_updates: RefCell<InitialUpdates>,
    observers: Observers,
}

impl<T: Transport> Channel<T> {
    pub fn new(transport: T, config: ChannelConfig, outbox: Outbox) -> Self {
        Self {
            transport,
            shared: Shared {
                config,
                outbox,
                state: Rc::new(Cell::new(ConnectionState::Disconnected)),
                client_id: RefCell::new(None),
                initial_updates: RefCell::new(Box::new(Vec::new)),
                observers: Observers::default(),
            },
        }
    }

    pub fn state(&self) -> StateHandle {
        StateHandle(self.shared.state.clone())
    }

    /// Environment facts gathered at every connect and carried in the
    /// connection URL.
    pub fn set_initial_updates(&self, source: impl Fn() -> Vec<Update> + 'static) {
        *self.shared.initial_updates.borrow_mut() = Box::new(source);
    }

    pub fn on_message(&self, handler: impl FnMut(&ServerFrame) + 'static) {
        self.shared
            .observers
            .message
            .borrow_mut()
            .push(Box::new(handler));
    }

    pub fn on_connection_change(&self, handler: impl FnMut(bool) + 'static) {
        self.shared
            .observers
            .connection_change
            .borrow_mut()
            .push(Box::new(handler));
    }

    /// Always accepted, whatever the connection state.
    pub fn enqueue(&self, update: Update) {
        self.shared.outbox.enqueue(update);
    }

    /// Runs the connect → stream → reconnect cycle. Never returns.
    pub async fn run(self) {
        let Channel {
            mut transport,
            shared,
        } = self;
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<String>();

        let dispatch = async {
            while let Some(raw) = inbound_rx.recv().await {
                shared.dispatch_inbound(&raw);
            }
        };

        let drive = async {
            let mut stale: Option<T::Connection> = None;

            loop {
                shared.state.set(ConnectionState::Connecting);
                let mut connection = shared
                    .connect_with_retry(&mut transport, &mut stale, &inbound_tx)
                    .await;

                shared.state.set(ConnectionState::Connected);
                tracing::info!(url = %shared.config.url, "connected");
                shared.observers.emit_connection_change(true);

                shared.stream(&mut connection).await;

                stale = Some(connection);
                shared.state.set(ConnectionState::Disconnected);
                tracing::warn!(url = %shared.config.url, "connection closed; reconnecting");
                shared.observers.emit_connection_change(false);
            }
        };

        tokio::join!(drive, dispatch);
    }
}

impl Shared {
    async fn connect_with_retry<T: Transport>(
        &self,
        transport: &mut T,
        stale: &mut Option<T::Connection>,
        inbound: &UnboundedSender<String>,
    ) -> T::Connection {
        let mut attempt: u64 = 0;

        loop {
            // A previous socket can report open while its link is broken.
            if let Some(mut previous) = stale.take() {
                previous.close();
            }

            attempt += 1;
            let url = self.connection_url();

            match transport.connect(&url, inbound.clone()).await {
                Ok(connection) => return connection,
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        attempt,
                        backoff_ms = self.config.reconnect_backoff.as_millis() as u64,
                        "connect failed; retrying"
                    );
                    tokio::time::sleep(self.config.reconnect_backoff).await;
                }
            }
        }
    }

    async fn stream<C: Connection>(&self, connection: &mut C) {
        loop {
            self.outbox.wait_for_messages(self.config.batch_wait).await;

            if !connection.is_open() {
                return;
            }

            let updates = self.outbox.drain();
            if updates.is_empty() {
                continue;
            }

            let frames = match encode_update_frames(updates, CLIENT_TO_SERVER_CAP) {
                Ok(frames) => frames,
                Err(err) => {
                    tracing::error!(error = %err, "failed to encode outbound batch");
                    continue;
                }
            };

            for payload in frames {
                if let Err(err) = connection.send(payload) {
                    tracing::warn!(error = %err, "dropping outbound batch");
                    break;
                }
            }
        }
    }

    fn connection_url(&self) -> Url {
        let updates = (self.initial_updates.borrow())();
        connection_url(&self.config.url, self.client_id.borrow().as_deref(), &updates)
    }

    fn dispatch_inbound(&self, raw: &str) {
        match decode_server_frame(raw) {
            Ok(frame) => {
                if let Some(client_id) = &frame.client_id {
                    *self.client_id.borrow_mut() = Some(client_id.clone());
                }
                self.observers.emit_message(&frame);
            }
            Err(err) => tracing::warn!(error = %err, "dropping malformed server frame"),
        }
    }
}

/// Appends the session token and the serialized initial updates as query
/// parameters.
pub fn connection_url(base: &Url, client_id: Option<&str>, initial_updates: &[Update]) -> Url {
    let mut url = base.clone();

    {
        let mut params = url.query_pairs_mut();
        if let Some(client_id) = client_id {
            params.append_pair("clientId", client_id);
        }

        match serde_json::to_string(initial_updates) {
            Ok(encoded) => {
                params.append_pair("updates", &encoded);
            }
            Err(err) => tracing::warn!(error = %err, "failed to encode initial updates"),
        }
    }

    if url.query() == Some("") {
        url.set_query(None);
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::read_frame;
    use crate::test_support::{Script, ScriptedTransport};
    use crate::transport::TcpTransport;
    use serde_json::{Value, json};
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout};

    fn config() -> ChannelConfig {
        ChannelConfig {
            url: Url::parse("tcp://127.0.0.1:8988/ws").expect("url"),
            batch_wait: Duration::from_millis(50),
            reconnect_backoff: Duration::from_millis(1000),
        }
    }

    fn record_changes<T: Transport>(channel: &Channel<T>) -> Rc<RefCell<Vec<bool>>> {
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = changes.clone();
        channel.on_connection_change(move |connected| sink.borrow_mut().push(connected));
        changes
    }

    fn query_param(url: &Url, name: &str) -> Option<String> {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_two_failed_attempts() {
        let script = Rc::new(RefCell::new(Script {
            fail_first: 2,
            ..Script::default()
        }));
        let channel = Channel::new(ScriptedTransport(script.clone()), config(), Outbox::new());
        let changes = record_changes(&channel);
        let state = channel.state();

        let _ = timeout(Duration::from_secs(5), channel.run()).await;

        let script = script.borrow();
        assert_eq!(script.attempts.len(), 3);
        assert!(script.attempts[2].0 - script.attempts[1].0 >= Duration::from_millis(1000));
        assert_eq!(*changes.borrow(), vec![true]);
        assert_eq!(state.get(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_updates_leave_as_one_frame() {
        let script = Rc::new(RefCell::new(Script::default()));
        let outbox = Outbox::new();
        let channel = Channel::new(ScriptedTransport(script.clone()), config(), outbox.clone());

        // Enqueued while still disconnected.
        channel.enqueue(Update::new("btn", "clicked", true));
        outbox.enqueue(Update::new("location", "path", "/next"));

        let _ = timeout(Duration::from_millis(500), channel.run()).await;

        let sent = script.borrow().sent.borrow().clone();
        assert_eq!(sent.len(), 1);
        let frame: Value = serde_json::from_str(&sent[0]).expect("frame json");
        assert_eq!(
            frame,
            json!({"type": "update", "updates": [["btn", "clicked", true], ["location", "path", "/next"]]})
        );
    }

    #[tokio::test]
    async fn batch_larger_than_one_frame_reaches_a_tcp_server_intact() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            read_frame(&mut socket, CLIENT_TO_SERVER_CAP)
                .await
                .expect("request target");

            let mut received = Vec::new();
            while received.len() < 2 {
                let payload = read_frame(&mut socket, CLIENT_TO_SERVER_CAP)
                    .await
                    .expect("update frame");
                let frame: Value = serde_json::from_slice(&payload).expect("frame json");
                received.extend(frame["updates"].as_array().cloned().unwrap_or_default());
            }
            received
        });

        let outbox = Outbox::new();
        let text = "x".repeat(70_000);
        outbox.enqueue(Update::new("area", "value", text.as_str()));
        outbox.enqueue(Update::new("btn", "clicked", true));
        let config = ChannelConfig {
            url: Url::parse(&format!("tcp://{addr}/ws")).expect("url"),
            batch_wait: Duration::from_millis(50),
            reconnect_backoff: Duration::from_millis(100),
        };
        let channel = Channel::new(TcpTransport::default(), config, outbox.clone());

        let received = tokio::select! {
            () = channel.run() => panic!("channel stopped"),
            received = timeout(Duration::from_secs(5), server) => {
                received.expect("server in time").expect("server task")
            }
        };

        assert_eq!(
            received,
            vec![json!(["area", "value", text]), json!(["btn", "clicked", true])]
        );
        assert!(outbox.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_connection_triggers_reconnect() {
        let script = Rc::new(RefCell::new(Script::default()));
        let channel = Channel::new(ScriptedTransport(script.clone()), config(), Outbox::new());
        let changes = record_changes(&channel);

        let closer = {
            let script = script.clone();
            async move {
                sleep(Duration::from_millis(120)).await;
                script.borrow().close_current();
            }
        };

        let _ = tokio::join!(timeout(Duration::from_millis(600), channel.run()), closer);

        assert_eq!(script.borrow().attempts.len(), 2);
        assert_eq!(*changes.borrow(), vec![true, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn session_token_and_initial_updates_ride_on_the_url() {
        let script = Rc::new(RefCell::new(Script::default()));
        let channel = Channel::new(ScriptedTransport(script.clone()), config(), Outbox::new());
        channel.set_initial_updates(|| vec![Update::new("window", "width", 800)]);

        let messages = Rc::new(Cell::new(0));
        {
            let messages = messages.clone();
            channel.on_message(move |_frame| messages.set(messages.get() + 1));
        }

        let server = {
            let script = script.clone();
            async move {
                sleep(Duration::from_millis(10)).await;
                script.borrow().push_inbound("not json");
                script.borrow().push_inbound(r#"{"clientId":"c-42"}"#);
                sleep(Duration::from_millis(10)).await;
                script.borrow().close_current();
            }
        };

        let _ = tokio::join!(timeout(Duration::from_millis(300), channel.run()), server);

        let script = script.borrow();
        assert_eq!(messages.get(), 1);
        let first = &script.attempts[0].1;
        assert_eq!(query_param(first, "clientId"), None);
        assert_eq!(
            query_param(first, "updates").as_deref(),
            Some(r#"[["window","width",800]]"#)
        );
        let second = &script.attempts[1].1;
        assert_eq!(query_param(second, "clientId").as_deref(), Some("c-42"));
    }

    #[test]
    fn connection_url_percent_encodes_updates() {
        let base = Url::parse("tcp://127.0.0.1:8988/ws").expect("url");
        let url = connection_url(
            &base,
            Some("abc"),
            &[Update::new("location", "path", "/a b")],
        );

        assert!(url.as_str().starts_with("tcp://127.0.0.1:8988/ws?clientId=abc&updates="));
        assert!(!url.as_str().contains(' '));
        assert_eq!(
            query_param(&url, "updates").as_deref(),
            Some(r#"[["location","path","/a b"]]"#)
        );
    }
}
