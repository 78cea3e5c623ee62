// ONVIF media service operations
//
// Stream and snapshot URIs are resolved against the first media profile
// only. Cameras with several profiles expose the same sensor through each,
// so the rest are ignored.

use bytes::Bytes;
use quick_xml::escape::escape;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::client::OnvifClient;
use super::xml;
use crate::error::Error;

impl OnvifClient {
    async fn profiles(&self) -> Result<Value, Error> {
        self.call_media("<trt:GetProfiles/>").await
    }

    async fn first_profile_token(&self) -> Result<String, Error> {
        let profiles = self.profiles().await?;
        first_profile_token(&profiles).ok_or(Error::NoProfilesFound)
    }

    /// `GetProfiles`, serialized as JSON.
    pub async fn get_profile_information(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(&self.profiles().await?)?)
    }

    /// `GetStreamUri` (RTP unicast over RTSP) for the first profile, as JSON.
    pub async fn get_stream_uri(&self) -> Result<String, Error> {
        let token = self.first_profile_token().await?;
        let body = format!(
            concat!(
                "<trt:GetStreamUri>",
                "<trt:StreamSetup><tt:Stream>RTP-Unicast</tt:Stream>",
                "<tt:Transport><tt:Protocol>RTSP</tt:Protocol></tt:Transport></trt:StreamSetup>",
                "<trt:ProfileToken>{}</trt:ProfileToken>",
                "</trt:GetStreamUri>"
            ),
            escape(&token)
        );
        let value = self.call_media(&body).await?;
        Ok(serde_json::to_string(&value)?)
    }

    /// Resolve the first profile's snapshot URI.
    pub async fn get_snapshot_uri(&self) -> Result<Url, Error> {
        let token = self.first_profile_token().await?;
        let body = format!(
            "<trt:GetSnapshotUri><trt:ProfileToken>{}</trt:ProfileToken></trt:GetSnapshotUri>",
            escape(&token)
        );
        let value = self.call_media(&body).await?;
        let uri = xml::lookup(&value, &["MediaUri", "Uri"])
            .and_then(xml::text_of)
            .ok_or_else(|| Error::Xml {
                message: "GetSnapshotUri response has no MediaUri".into(),
                body: value.to_string(),
            })?;
        Ok(Url::parse(uri.trim())?)
    }

    /// Fetch a JPEG snapshot with the camera's HTTP auth mode.
    ///
    /// Anything but 200 is a status error.
    pub async fn get_snapshot(&self) -> Result<Bytes, Error> {
        let url = self.get_snapshot_uri().await?;
        debug!(address = self.address(), %url, "fetching snapshot");

        let resp = self.send(self.http().get(url.clone())).await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(Error::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.bytes().await?)
    }
}

/// The `token` attribute of the first `Profiles` entry.
fn first_profile_token(profiles: &Value) -> Option<String> {
    let profile = xml::lookup(profiles, &["Profiles"])?;
    xml::first(profile)
        .get("token")
        .and_then(Value::as_str)
        .map(str::to_owned)
}
