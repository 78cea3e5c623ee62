// ── Core error types ──
//
// Errors surfaced to the host platform. The `From<camdev_api::Error>` impl
// folds wire-level failures into a few driver-facing variants; the
// unrecognized-command variants are expected outcomes for multi-protocol
// command tables, not crashes.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Device metadata ──────────────────────────────────────────────
    #[error("no {protocol} protocol properties for device")]
    MissingProtocol { protocol: String },

    #[error("no HTTP address in protocol properties")]
    MissingAddress,

    #[error("missing protocol property {property}")]
    MissingProperty { property: String },

    #[error("invalid protocol property {property}: {reason}")]
    InvalidProperty { property: String, reason: String },

    #[error("device not found: {name}")]
    DeviceNotFound { name: String },

    #[error("device profile not found: {name}")]
    ProfileNotFound { name: String },

    // ── Client routing ───────────────────────────────────────────────
    #[error("ONVIF client could not be initialized for {device}: {reason}")]
    OnvifUnavailable { device: String, reason: String },

    #[error("non-ONVIF command {command} for camera without secondary client")]
    NoSecondaryClient { command: String },

    #[error("{vendor}: unrecognized read command")]
    UnrecognizedRead { vendor: &'static str },

    #[error("{vendor}: unrecognized write command")]
    UnrecognizedWrite { vendor: &'static str },

    #[error("invalid parameter for {command}: {reason}")]
    InvalidParameter { command: String, reason: String },

    // ── Credentials ──────────────────────────────────────────────────
    #[error("unable to retrieve credentials at {path}: {message}")]
    Credentials { path: String, message: String },

    // ── Camera errors (wrapped from camdev-api) ──────────────────────
    #[error("cannot reach camera: {reason}")]
    ConnectionFailed { reason: String },

    #[error("camera request timed out")]
    Timeout,

    #[error("camera authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("camera returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("ONVIF fault ({code}): {reason}")]
    SoapFault { code: String, reason: String },

    #[error("no ONVIF profiles found")]
    NoProfilesFound,

    #[error("malformed camera response: {message}")]
    Decode { message: String },

    // ── Configuration / internal ─────────────────────────────────────
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

// ── Conversion from wire-level errors ───────────────────────────────

impl From<camdev_api::Error> for CoreError {
    fn from(err: camdev_api::Error) -> Self {
        use camdev_api::Error as Api;

        match err {
            Api::Transport(ref e) if e.is_timeout() => Self::Timeout,
            Api::Transport(e) => Self::ConnectionFailed {
                reason: e.to_string(),
            },
            Api::InvalidUrl(e) => Self::Config {
                message: format!("invalid camera URL: {e}"),
            },
            Api::Tls(message) => Self::Config { message },
            Api::Status { status, url } => Self::Status { status, url },
            Api::Authentication { message } => Self::AuthenticationFailed { message },
            Api::SoapFault { code, reason } => Self::SoapFault { code, reason },
            Api::NoProfilesFound => Self::NoProfilesFound,
            Api::Decode { message } | Api::Xml { message, .. } => Self::Decode { message },
            Api::Json(e) => Self::Internal(format!("JSON encoding failed: {e}")),
            Api::NotMultipart { content_type } => Self::Decode {
                message: format!("expected multipart stream, got {content_type:?}"),
            },
            Api::Multipart(e) => Self::Decode {
                message: e.to_string(),
            },
            Api::StreamEnded => Self::ConnectionFailed {
                reason: "stream ended".into(),
            },
            Api::Cancelled => Self::Internal("operation cancelled".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_map_to_driver_variants() {
        let err: CoreError = camdev_api::Error::NoProfilesFound.into();
        assert!(matches!(err, CoreError::NoProfilesFound));

        let err: CoreError = camdev_api::Error::Status {
            status: 401,
            url: "http://cam/snapshot".into(),
        }
        .into();
        assert_eq!(err.to_string(), "camera returned HTTP 401 for http://cam/snapshot");
    }

    #[test]
    fn unrecognized_commands_name_the_vendor() {
        let err = CoreError::UnrecognizedRead { vendor: "rcp" };
        assert_eq!(err.to_string(), "rcp: unrecognized read command");
    }
}
