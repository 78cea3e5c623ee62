// ONVIF device service operations
//
// Read operations return the response payload serialized as a JSON string.

use chrono::{DateTime, Datelike, Timelike, Utc};
use quick_xml::escape::escape;
use tracing::debug;

use super::client::OnvifClient;
use crate::error::Error;

/// A user account to create on the camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    /// `Administrator`, `Operator`, `User`, `Anonymous` or `Extended`.
    pub user_level: String,
    pub extension: Option<String>,
}

impl OnvifClient {
    async fn device_json(&self, operation: &str) -> Result<String, Error> {
        debug!(address = self.address(), operation, "ONVIF device call");
        let value = self.call_device(&format!("<tds:{operation}/>")).await?;
        Ok(serde_json::to_string(&value)?)
    }

    /// `GetDeviceInformation`: manufacturer, model, firmware, serial, hardware id.
    pub async fn get_device_information(&self) -> Result<String, Error> {
        self.device_json("GetDeviceInformation").await
    }

    pub async fn get_system_date_and_time(&self) -> Result<String, Error> {
        self.device_json("GetSystemDateAndTime").await
    }

    pub async fn get_hostname(&self) -> Result<String, Error> {
        self.device_json("GetHostname").await
    }

    pub async fn get_dns(&self) -> Result<String, Error> {
        self.device_json("GetDNS").await
    }

    pub async fn get_network_interfaces(&self) -> Result<String, Error> {
        self.device_json("GetNetworkInterfaces").await
    }

    pub async fn get_network_protocols(&self) -> Result<String, Error> {
        self.device_json("GetNetworkProtocols").await
    }

    pub async fn get_network_default_gateway(&self) -> Result<String, Error> {
        self.device_json("GetNetworkDefaultGateway").await
    }

    pub async fn get_ntp(&self) -> Result<String, Error> {
        self.device_json("GetNTP").await
    }

    pub async fn get_users(&self) -> Result<String, Error> {
        self.device_json("GetUsers").await
    }

    /// `SystemReboot`. The camera answers with a message before restarting.
    pub async fn reboot(&self) -> Result<String, Error> {
        self.device_json("SystemReboot").await
    }

    // ── Writes ───────────────────────────────────────────────────────

    pub async fn set_hostname(&self, name: &str) -> Result<(), Error> {
        let body = format!(
            "<tds:SetHostname><tds:Name>{}</tds:Name></tds:SetHostname>",
            escape(name)
        );
        self.call_device(&body).await.map(|_| ())
    }

    pub async fn set_hostname_from_dhcp(&self) -> Result<(), Error> {
        self.call_device(
            "<tds:SetHostnameFromDHCP><tds:FromDHCP>true</tds:FromDHCP></tds:SetHostnameFromDHCP>",
        )
        .await
        .map(|_| ())
    }

    /// Set the camera clock manually to `at` (UTC, no daylight saving).
    pub async fn set_system_date_and_time(&self, at: DateTime<Utc>) -> Result<(), Error> {
        self.call_device(&set_date_time_body(at)).await.map(|_| ())
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<(), Error> {
        self.call_device(&create_user_body(user)).await.map(|_| ())
    }
}

fn set_date_time_body(at: DateTime<Utc>) -> String {
    format!(
        concat!(
            "<tds:SetSystemDateAndTime>",
            "<tds:DateTimeType>Manual</tds:DateTimeType>",
            "<tds:DaylightSavings>false</tds:DaylightSavings>",
            "<tds:UTCDateTime>",
            "<tt:Date><tt:Year>{}</tt:Year><tt:Month>{}</tt:Month><tt:Day>{}</tt:Day></tt:Date>",
            "<tt:Time><tt:Hour>{}</tt:Hour><tt:Minute>{}</tt:Minute><tt:Second>{}</tt:Second></tt:Time>",
            "</tds:UTCDateTime>",
            "</tds:SetSystemDateAndTime>"
        ),
        at.year(),
        at.month(),
        at.day(),
        at.hour(),
        at.minute(),
        at.second(),
    )
}

fn create_user_body(user: &NewUser) -> String {
    let extension = user
        .extension
        .as_deref()
        .map(|ext| format!("<tt:Extension>{}</tt:Extension>", escape(ext)))
        .unwrap_or_default();

    format!(
        "<tds:CreateUser><tds:User><tt:Username>{}</tt:Username><tt:Password>{}</tt:Password><tt:UserLevel>{}</tt:UserLevel>{extension}</tds:User></tds:CreateUser>",
        escape(&user.username),
        escape(&user.password),
        escape(&user.user_level),
    )
}
