// ── Domain model ──
//
// Host-side device metadata and the read/write command model shared by
// every vendor client.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use camdev_api::AuthMode;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Protocol name under which camera connection properties live.
pub const HTTP_PROTOCOL: &str = "HTTP";
/// Protocol property: camera address (`host` or `host:port`).
pub const ADDRESS: &str = "Address";
/// Protocol property: `none`, `basic` or `digest`.
pub const AUTH_METHOD: &str = "AuthMethod";
/// Protocol property: secret-store path of the camera credentials.
pub const CREDENTIAL_PATHS: &str = "CredentialPaths";

/// Resource attribute: Bosch alarm type (integer).
pub const ALARM_TYPE: &str = "alarm_type";
/// Resource attribute: Bosch IVA counter name.
pub const COUNTER_NAME: &str = "counter_name";
/// Resource attribute: Axis two-character alarm code.
pub const ALARM_CODE: &str = "alarm_code";

/// Protocol properties by protocol name, then key.
pub type Protocols = HashMap<String, HashMap<String, String>>;

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub profile_name: String,
    #[serde(default)]
    pub protocols: Protocols,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub resources: Vec<DeviceResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceResource {
    pub name: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl DeviceResource {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

// ── Camera connection info ───────────────────────────────────────────

/// Typed view over a device's `HTTP` protocol properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    pub address: String,
    pub auth_method: AuthMode,
    /// Present whenever `auth_method` needs credentials.
    pub credential_path: Option<String>,
}

impl CameraInfo {
    /// Map the `HTTP` protocol properties field by field.
    pub fn from_protocols(protocols: &Protocols) -> Result<Self, CoreError> {
        let props = protocols
            .get(HTTP_PROTOCOL)
            .ok_or_else(|| CoreError::MissingProtocol {
                protocol: HTTP_PROTOCOL.into(),
            })?;

        let address = props
            .get(ADDRESS)
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .ok_or(CoreError::MissingAddress)?
            .to_owned();

        let auth_method = match props.get(AUTH_METHOD) {
            Some(raw) => raw
                .parse::<AuthMode>()
                .map_err(|reason| CoreError::InvalidProperty {
                    property: AUTH_METHOD.into(),
                    reason,
                })?,
            None => AuthMode::None,
        };

        let credential_path = props
            .get(CREDENTIAL_PATHS)
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_owned);
        if auth_method.requires_credentials() && credential_path.is_none() {
            return Err(CoreError::MissingProperty {
                property: CREDENTIAL_PATHS.into(),
            });
        }

        Ok(Self {
            address,
            auth_method,
            credential_path,
        })
    }
}

/// The camera address alone, for teardown paths that need nothing else.
pub fn address_from_protocols(protocols: &Protocols) -> Result<String, CoreError> {
    protocols
        .get(HTTP_PROTOCOL)
        .ok_or_else(|| CoreError::MissingProtocol {
            protocol: HTTP_PROTOCOL.into(),
        })?
        .get(ADDRESS)
        .filter(|a| !a.trim().is_empty())
        .map(|a| a.trim().to_owned())
        .ok_or(CoreError::MissingAddress)
}

// ── Commands ─────────────────────────────────────────────────────────

/// A read or write request for one device resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRequest {
    pub resource_name: String,
    pub attributes: HashMap<String, String>,
}

impl CommandRequest {
    pub fn new(resource_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Typed payload of a command value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Uint32(u32),
    String(String),
    Binary(Bytes),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "Bool",
            Self::Uint32(_) => "Uint32",
            Self::String(_) => "String",
            Self::Binary(_) => "Binary",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Uint32(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
            Self::Binary(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// A reading (or write parameter) for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandValue {
    pub resource_name: String,
    pub value: Value,
    /// Milliseconds since the Unix epoch.
    pub origin: i64,
}

impl CommandValue {
    /// A value stamped with the current time.
    pub fn new(resource_name: impl Into<String>, value: Value) -> Self {
        Self {
            resource_name: resource_name.into(),
            value,
            origin: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self.value {
            Value::Uint32(n) => Some(n),
            _ => None,
        }
    }
}

/// A batch of values pushed asynchronously for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncValues {
    pub device_name: String,
    pub values: Vec<CommandValue>,
}
