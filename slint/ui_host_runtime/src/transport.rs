use crate::error::TransportError;
use crate::protocol::{CLIENT_TO_SERVER_CAP, SERVER_TO_CLIENT_CAP, read_frame_or_skip, write_frame};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use url::Url;

/// Opens physical connections. Inbound text frames are pushed to `inbound`
/// for as long as the connection lives.
#[async_trait(?Send)]
pub trait Transport {
    type Connection: Connection;

    async fn connect(
        &mut self,
        url: &Url,
        inbound: UnboundedSender<String>,
    ) -> Result<Self::Connection, TransportError>;
}

pub trait Connection {
    /// Readiness check polled by the send loop. There is no close callback.
    fn is_open(&self) -> bool;

    /// Fire-and-forget send.
    fn send(&mut self, frame: String) -> Result<(), TransportError>;

    fn close(&mut self);
}

/// Length-prefixed JSON frames over TCP.
///
/// The first frame written on a new connection is the request target of the
/// connection URL (`/path?query`), which is how the session token and the
/// initial updates reach the server. Inbound frames over the size limit
/// are skipped and the connection stays up.
#[derive(Debug, Clone, Copy)]
pub struct TcpTransport {
    max_inbound: usize,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self {
            max_inbound: SERVER_TO_CLIENT_CAP,
        }
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_inbound(mut self, max_inbound: usize) -> Self {
        self.max_inbound = max_inbound;
        self
    }
}

pub struct TcpConnection {
    open: Arc<AtomicBool>,
    outbound: UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

#[async_trait(?Send)]
impl Transport for TcpTransport {
    type Connection = TcpConnection;

    async fn connect(
        &mut self,
        url: &Url,
        inbound: UnboundedSender<String>,
    ) -> Result<TcpConnection, TransportError> {
        let host = url.host_str().ok_or_else(|| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| TransportError::InvalidUrl {
                url: url.to_string(),
                reason: "missing port".to_string(),
            })?;

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(TransportError::Connect)?;
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(error = %err, "failed to set TCP_NODELAY");
        }

        let (read_half, mut write_half) = stream.into_split();
        write_frame(
            &mut write_half,
            request_target(url).as_bytes(),
            CLIENT_TO_SERVER_CAP,
        )
        .await
        .map_err(TransportError::Connect)?;

        let open = Arc::new(AtomicBool::new(true));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(reader_loop(
            read_half,
            inbound,
            self.max_inbound,
            open.clone(),
        ));
        let writer = tokio::spawn(writer_loop(write_half, outbound_rx, open.clone()));

        Ok(TcpConnection {
            open,
            outbound,
            reader,
            writer,
        })
    }
}

impl Connection for TcpConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn send(&mut self, frame: String) -> Result<(), TransportError> {
        if frame.len() > CLIENT_TO_SERVER_CAP {
            return Err(TransportError::FrameTooLarge {
                len: frame.len(),
                cap: CLIENT_TO_SERVER_CAP,
            });
        }

        if !self.is_open() {
            return Err(TransportError::Closed);
        }

        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::Release);
        self.reader.abort();
        self.writer.abort();
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn request_target(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

async fn reader_loop(
    mut reader: OwnedReadHalf,
    inbound: UnboundedSender<String>,
    max_inbound: usize,
    open: Arc<AtomicBool>,
) {
    loop {
        match read_frame_or_skip(&mut reader, max_inbound).await {
            Ok(None) => {}
            Ok(Some(payload)) => match String::from_utf8(payload) {
                Ok(text) => {
                    if inbound.send(text).is_err() {
                        break;
                    }
                }
                Err(err) => tracing::warn!(error = %err, "dropping non-utf8 server frame"),
            },
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::debug!("server closed the connection");
                break;
            }
            Err(err) => {
                tracing::warn!(error = %err, "connection read failed");
                break;
            }
        }
    }

    open.store(false, Ordering::Release);
}

async fn writer_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: UnboundedReceiver<String>,
    open: Arc<AtomicBool>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(err) = write_frame(&mut writer, frame.as_bytes(), CLIENT_TO_SERVER_CAP).await {
            tracing::warn!(error = %err, "connection write failed");
            break;
        }
    }

    open.store(false, Ordering::Release);
}
