use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to decode server frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode client frame: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid connection url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("connection is closed")]
    Closed,

    #[error("frame too large: {len} > {cap}")]
    FrameTooLarge { len: usize, cap: usize },
}

/// Failure reported by a node behavior callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BehaviorError {
    #[error("unknown property `{property}` for kind `{kind}`")]
    UnknownProperty { kind: String, property: String },

    #[error("{0}")]
    Failed(String),
}

/// Problems found while materializing a tree or applying a diff. None of these
/// abort the pass; they are logged and collected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("diff targets unknown key `{0}`")]
    UnknownKey(String),

    #[error("malformed diff entry for `{key}`: {reason}")]
    MalformedEntry { key: String, reason: String },

    #[error("no behavior for `{key}` (kind `{kind}`, tag `{tag}`)")]
    UnknownKind {
        key: String,
        kind: String,
        tag: String,
    },

    #[error("failed to create `{key}`: {source}")]
    Create { key: String, source: BehaviorError },

    #[error("property `{property}` on `{key}`: {source}")]
    Property {
        key: String,
        property: String,
        source: BehaviorError,
    },

    #[error("delete on `{key}` at {at} removed {removed} of {count} children")]
    ShortDelete {
        key: String,
        at: usize,
        count: usize,
        removed: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("could not find target {0}")]
    UnknownTarget(String),

    #[error("could not find command {target}.{command}")]
    UnknownCommand { target: String, command: String },

    #[error("missing argument {index} for {command}")]
    MissingArgument { command: String, index: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid server url {url:?}: {source}")]
    InvalidServerUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("invalid location: {0:?}")]
    Invalid(String),
}
