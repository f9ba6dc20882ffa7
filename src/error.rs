use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("vector buffer must be 3 (compressed) or 12 (exact) bytes, got {len}")]
    InvalidLength { len: usize },
}

#[derive(Error, Debug, PartialEq)]
pub enum FrameError {
    #[error("hand frame must be 0 or {expected} bytes, got {len}")]
    InvalidLength { len: usize, expected: usize },
    #[error("hand frame segment failed to decode")]
    Codec(#[from] CodecError),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to MQTT broker {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },
    #[error("failed to publish on {topic}: {reason}")]
    Publish { topic: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("malformed config file")]
    Json(#[from] serde_json::Error),
    #[error("tick rate must be positive, got {0}")]
    InvalidTickRate(f32),
}

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("malformed tracking message")]
    Json(#[from] serde_json::Error),
    #[error("tracking message has a zero-length rotation for {0}")]
    DegenerateRotation(String),
}
