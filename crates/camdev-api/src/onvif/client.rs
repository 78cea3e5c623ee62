// ONVIF SOAP client
//
// One client per camera. Construction performs a `GetCapabilities`
// handshake against the device service to discover the media service
// endpoint. Operation methods live in `device.rs` and `media.rs` as
// inherent impls, keeping this module to transport mechanics.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::soap::{self, Reply, UsernameToken};
use super::xml;
use crate::digest::DigestClient;
use crate::error::Error;
use crate::transport::TransportConfig;

const DEVICE_SERVICE_PATH: &str = "/onvif/device_service";

/// How plain HTTP requests to the camera are authenticated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    #[default]
    None,
    Basic,
    Digest,
}

impl AuthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Digest => "digest",
        }
    }

    /// Whether this mode needs a username and password.
    pub fn requires_credentials(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = String;

    /// Case-insensitive; an empty string means `None`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "digest" => Ok(Self::Digest),
            other => Err(format!("unknown auth method {other:?}")),
        }
    }
}

/// Client for one ONVIF camera.
pub struct OnvifClient {
    digest: DigestClient,
    address: String,
    username: String,
    password: SecretString,
    auth: AuthMode,
    device_url: Url,
    media_url: Url,
}

impl OnvifClient {
    /// Connect to the camera at `address` and run the capabilities handshake.
    ///
    /// Fails when the device service is unreachable or answers with a fault.
    pub async fn connect(
        address: &str,
        username: &str,
        password: SecretString,
        auth: AuthMode,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let device_url = Url::parse(&format!("http://{address}{DEVICE_SERVICE_PATH}"))?;
        let digest = DigestClient::new(http, username, password.clone());

        let mut client = Self {
            digest,
            address: address.to_owned(),
            username: username.to_owned(),
            password,
            auth,
            media_url: device_url.clone(),
            device_url,
        };

        let capabilities = client
            .call_device("<tds:GetCapabilities><tds:Category>All</tds:Category></tds:GetCapabilities>")
            .await?;
        match media_xaddr(&capabilities) {
            Some(url) => client.media_url = url,
            None => {
                warn!(address, "no media XAddr in capabilities, using device service");
            }
        }

        debug!(address, media = %client.media_url, auth = %auth, "ONVIF client connected");
        Ok(client)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Call a device-service operation and return the response payload.
    pub(crate) async fn call_device(&self, body: &str) -> Result<Value, Error> {
        self.call(self.device_url.clone(), body).await
    }

    /// Call a media-service operation and return the response payload.
    pub(crate) async fn call_media(&self, body: &str) -> Result<Value, Error> {
        self.call(self.media_url.clone(), body).await
    }

    async fn call(&self, url: Url, body: &str) -> Result<Value, Error> {
        debug!("POST {}", url);

        let security = (!self.username.is_empty()).then(|| {
            UsernameToken {
                username: &self.username,
                password: self.password.expose_secret(),
            }
            .header(Utc::now())
        });
        let envelope = soap::envelope(body, security.as_deref());

        let builder = self
            .http()
            .post(url.clone())
            .header(CONTENT_TYPE, soap::SOAP_CONTENT_TYPE)
            .body(envelope);
        let resp = self.send(builder).await?;
        let status = resp.status();
        let text = resp.text().await?;

        match soap::parse_reply(&text) {
            Ok(Reply::Fault { code, reason }) => Err(Error::SoapFault { code, reason }),
            _ if !status.is_success() => Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
            Ok(Reply::Body { value, .. }) => Ok(value),
            Err(e) => Err(e),
        }
    }

    /// Send a request with the camera's HTTP auth mode applied.
    pub(crate) async fn send(&self, builder: RequestBuilder) -> Result<Response, Error> {
        match self.auth {
            AuthMode::None => Ok(builder.send().await?),
            AuthMode::Basic => Ok(builder
                .basic_auth(&self.username, Some(self.password.expose_secret()))
                .send()
                .await?),
            AuthMode::Digest => self.digest.execute(builder.build()?).await,
        }
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        self.digest.http()
    }
}

fn media_xaddr(capabilities: &Value) -> Option<Url> {
    let raw = xml::lookup(capabilities, &["Capabilities", "Media", "XAddr"]).and_then(xml::text_of)?;
    Url::parse(raw.trim()).ok()
}
