/// Errors surfaced by the injected cross-device transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport offline: {message}")]
    Offline { message: String },

    #[error("unsupported protocol version {found} (expected {expected})")]
    UnsupportedVersion { expected: String, found: String },

    #[error("malformed envelope: {details}")]
    MalformedEnvelope { details: String },
}
