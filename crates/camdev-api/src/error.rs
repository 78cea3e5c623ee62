use thiserror::Error;

/// Top-level error type for the `camdev-api` crate.
///
/// Covers every failure mode across the wire protocols: transport,
/// authentication, ONVIF SOAP, Bosch RCP binary payloads, and the Axis
/// multipart stream. `camdev-core` maps these into driver-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Camera answered with an unexpected HTTP status.
    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    /// TLS setup error while building the HTTP client.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Authentication ──────────────────────────────────────────────
    /// The request could not be authenticated (unreplayable body, bad header).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Payload decoding ────────────────────────────────────────────
    /// Binary payload was truncated or malformed.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// XML body could not be parsed, with the raw body for debugging.
    #[error("XML error: {message}")]
    Xml { message: String, body: String },

    /// JSON serialization of a response failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── ONVIF ───────────────────────────────────────────────────────
    /// The camera answered with a SOAP fault.
    #[error("SOAP fault ({code}): {reason}")]
    SoapFault { code: String, reason: String },

    /// The camera exposes no media profiles.
    #[error("No ONVIF media profiles found")]
    NoProfilesFound,

    // ── Streaming ───────────────────────────────────────────────────
    /// The response was not a multipart stream.
    #[error("Not a multipart stream (content type {content_type:?})")]
    NotMultipart { content_type: String },

    /// Multipart framing error while reading the stream.
    #[error("Multipart stream error: {0}")]
    Multipart(#[from] multer::Error),

    /// The stream ended (EOF) while we were still listening.
    #[error("Stream ended")]
    StreamEnded,

    /// The listener was cancelled by its owner.
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` if this is the deliberate cancellation sentinel.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}
