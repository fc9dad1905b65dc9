use crate::error::ProtocolError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest outbound frame. Bigger batches are split across several frames.
pub const CLIENT_TO_SERVER_CAP: usize = 16 * 1024 * 1024;

/// Default limit for one inbound frame. Larger frames are skipped.
pub const SERVER_TO_CLIENT_CAP: usize = 256 * 1024 * 1024;

/// One outbound `(key, property, value)` triple. Serializes as a JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update(pub String, pub String, pub Value);

impl Update {
    pub fn new(key: impl Into<String>, property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self(key.into(), property.into(), value.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }

    pub fn property(&self) -> &str {
        &self.1
    }

    pub fn value(&self) -> &Value {
        &self.2
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "update")]
    Update { updates: Vec<Update> },
}

/// Any subset of the fields may be present in one frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerFrame {
    #[serde(default)]
    pub dom: Option<Node>,

    #[serde(default)]
    pub diff: Option<Map<String, Value>>,

    #[serde(default)]
    pub singletons: Option<Map<String, Value>>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub commands: Vec<Command>,

    #[serde(default, rename = "clientId")]
    pub client_id: Option<String>,
}

/// Declarative description of one UI element and its subtree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Node {
    pub key: String,

    #[serde(default, alias = "name")]
    pub kind: String,

    #[serde(default)]
    pub tag: String,

    #[serde(default, alias = "props", deserialize_with = "null_as_default")]
    pub properties: Map<String, Value>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub children: Vec<Node>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub classes: Vec<String>,

    #[serde(default)]
    pub style: Option<StyleMap>,
}

/// Changes for one existing key. `style: None` (absent or `null`) means the
/// style is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DiffEntry {
    #[serde(default, alias = "props")]
    pub properties: Option<Map<String, Value>>,

    #[serde(default)]
    pub children: Option<Vec<RangeOp>>,

    #[serde(default)]
    pub style: Option<StyleMap>,
}

/// Child range operation. Indices refer to the live child list at the moment
/// the operation is applied.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "(String, usize, Value)")]
pub enum RangeOp {
    Insert { at: usize, nodes: Vec<Node> },
    Delete { at: usize, count: usize },
}

impl TryFrom<(String, usize, Value)> for RangeOp {
    type Error = String;

    fn try_from((op, at, payload): (String, usize, Value)) -> Result<Self, Self::Error> {
        match op.as_str() {
            "insert" => {
                let nodes = Vec::<Node>::deserialize(&payload)
                    .map_err(|err| format!("invalid insert payload: {err}"))?;
                Ok(RangeOp::Insert { at, nodes })
            }
            "delete" => {
                let count = payload
                    .as_u64()
                    .ok_or_else(|| format!("invalid delete count: {payload}"))?;
                Ok(RangeOp::Delete {
                    at,
                    count: count as usize,
                })
            }
            other => Err(format!("unknown range op `{other}`")),
        }
    }
}

/// Ordered selector → rule text map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct StyleMap(Vec<(String, String)>);

impl StyleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, selector: impl Into<String>, rule: impl Into<String>) {
        let selector = selector.into();
        let rule = rule.into();

        match self.0.iter_mut().find(|(existing, _)| *existing == selector) {
            Some((_, text)) => *text = rule,
            None => self.0.push((selector, rule)),
        }
    }

    pub fn get(&self, selector: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == selector)
            .map(|(_, text)| text.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(selector, text)| (selector.as_str(), text.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>, R: Into<String>> FromIterator<(S, R)> for StyleMap {
    fn from_iter<I: IntoIterator<Item = (S, R)>>(iter: I) -> Self {
        let mut map = StyleMap::new();
        for (selector, rule) in iter {
            map.insert(selector, rule);
        }
        map
    }
}

impl TryFrom<Map<String, Value>> for StyleMap {
    type Error = String;

    fn try_from(raw: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut map = StyleMap::new();

        for (selector, rule) in raw {
            match rule {
                Value::String(text) => map.insert(selector, text),
                // Selectors with no declarations are never installed.
                Value::Null => {}
                other => return Err(format!("rule for `{selector}` is not a string: {other}")),
            }
        }

        Ok(map)
    }
}

/// Side-effecting request routed to the command executor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub result_key: String,
    pub target: String,
    pub command: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn update_frame(updates: Vec<Update>) -> ClientFrame {
    ClientFrame::Update { updates }
}

pub fn encode_client_frame(frame: &ClientFrame) -> Result<String, ProtocolError> {
    serde_json::to_string(frame).map_err(ProtocolError::Encode)
}

/// Encodes `updates` as update frames of at most `max_payload` bytes each,
/// keeping their order. An update too large for a frame of its own is
/// logged and left out; the rest still go.
pub fn encode_update_frames(
    updates: Vec<Update>,
    max_payload: usize,
) -> Result<Vec<String>, ProtocolError> {
    let overhead = encode_client_frame(&update_frame(Vec::new()))?.len();
    let mut frames = Vec::new();
    let mut chunk: Vec<Update> = Vec::new();
    let mut chunk_len = overhead;

    for update in updates {
        let len = serde_json::to_string(&update)
            .map_err(ProtocolError::Encode)?
            .len();
        if overhead + len > max_payload {
            tracing::error!(
                key = update.key(),
                property = update.property(),
                len,
                max_payload,
                "update does not fit in a frame; dropped"
            );
            continue;
        }

        // Elements after the first are preceded by a comma.
        if chunk_len + usize::from(!chunk.is_empty()) + len > max_payload {
            frames.push(encode_client_frame(&update_frame(std::mem::take(&mut chunk)))?);
            chunk_len = overhead;
        }

        chunk_len += usize::from(!chunk.is_empty()) + len;
        chunk.push(update);
    }

    if !chunk.is_empty() {
        frames.push(encode_client_frame(&update_frame(chunk))?);
    }
    Ok(frames)
}

pub fn decode_server_frame(payload: &str) -> Result<ServerFrame, ProtocolError> {
    serde_json::from_str(payload).map_err(ProtocolError::Decode)
}

pub async fn read_frame<R>(reader: &mut R, max_payload: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = read_len(reader).await?;
    if len > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} > {max_payload}"),
        ));
    }

    read_payload(reader, len).await
}

/// Like [`read_frame`], but a frame over `max_payload` is consumed and
/// discarded so the stream stays usable. `Ok(None)` marks a skipped frame.
pub async fn read_frame_or_skip<R>(reader: &mut R, max_payload: usize) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let len = read_len(reader).await?;
    if len <= max_payload {
        return read_payload(reader, len).await.map(Some);
    }

    let expected = len as u64;
    let skipped = tokio::io::copy(&mut (&mut *reader).take(expected), &mut tokio::io::sink()).await?;
    if skipped < expected {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream ended inside an oversized frame",
        ));
    }

    tracing::warn!(len, max_payload, "skipped oversized frame");
    Ok(None)
}

async fn read_len<R>(reader: &mut R) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0_u8; 4];
    reader.read_exact(&mut len_buf).await?;
    Ok(u32::from_be_bytes(len_buf) as usize)
}

async fn read_payload<R>(reader: &mut R, len: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max_payload: usize) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} > {}", payload.len(), max_payload),
        ));
    }

    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "payload exceeds u32"))?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}
