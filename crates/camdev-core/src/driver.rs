// ── Driver ──
//
// Entry points the host platform calls: device lifecycle, read/write
// command handling and shutdown. ONVIF command names are handled here;
// every other resource goes to the camera's vendor client unchanged.

use std::sync::{Arc, Mutex, PoisonError};

use camdev_api::{NewUser, OnvifClient};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use strum::{AsRefStr, EnumString};
use tokio::sync::{OnceCell, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::DriverConfig;
use crate::error::CoreError;
use crate::host::{Credentials, DeviceHost, SecretProvider};
use crate::model::{
    AsyncValues, CameraInfo, CommandRequest, CommandValue, Protocols, Value, address_from_protocols,
};
use crate::registry::ClientRegistry;
use crate::vendor::{VendorClient, VendorContext, VendorKind};

// ── Command tables ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
enum OnvifRead {
    #[strum(serialize = "onvif_device_information")]
    DeviceInformation,
    #[strum(serialize = "onvif_profile_information")]
    ProfileInformation,
    #[strum(serialize = "OnvifDateTime")]
    DateTime,
    #[strum(serialize = "OnvifHostname")]
    Hostname,
    #[strum(serialize = "onvif_dns")]
    Dns,
    #[strum(serialize = "onvif_network_interfaces")]
    NetworkInterfaces,
    #[strum(serialize = "onvif_network_protocols")]
    NetworkProtocols,
    #[strum(serialize = "onvif_network_default_gateway")]
    NetworkDefaultGateway,
    #[strum(serialize = "onvif_ntp")]
    Ntp,
    #[strum(serialize = "onvif_system_reboot")]
    SystemReboot,
    #[strum(serialize = "onvif_users")]
    Users,
    #[strum(serialize = "onvif_snapshot")]
    Snapshot,
    #[strum(serialize = "OnvifStreamURI")]
    StreamUri,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
enum OnvifWrite {
    #[strum(serialize = "OnvifUser")]
    User,
    #[strum(serialize = "OnvifReboot")]
    Reboot,
    #[strum(serialize = "OnvifHostname")]
    Hostname,
    #[strum(serialize = "OnvifHostnameFromDHCP")]
    HostnameFromDhcp,
    #[strum(serialize = "OnvifDateTime")]
    DateTime,
}

/// `OnvifUser` write parameter.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserParam {
    username: String,
    password: String,
    user_level: String,
    #[serde(default)]
    extension: Option<String>,
}

impl From<UserParam> for NewUser {
    fn from(p: UserParam) -> Self {
        Self {
            username: p.username,
            password: p.password,
            user_level: p.user_level,
            extension: p.extension,
        }
    }
}

/// `OnvifDateTime` write parameter, in UTC.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DateTimeParam {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
}

impl DateTimeParam {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, self.day, self.hour, self.minute, self.second)
            .single()
    }
}

// ── Driver ───────────────────────────────────────────────────────────

/// The driver context. Cheaply cloneable; clones share clients and the
/// outbound event channel.
#[derive(Clone)]
pub struct Driver {
    inner: Arc<DriverInner>,
}

struct DriverInner {
    config: DriverConfig,
    host: Arc<dyn DeviceHost>,
    secrets: Arc<dyn SecretProvider>,
    registry: ClientRegistry,
    events: Mutex<Option<mpsc::Sender<AsyncValues>>>,
}

impl Driver {
    /// Create a driver and the receiving end of its async-value channel.
    /// No camera is contacted until [`initialize`](Self::initialize) or a
    /// command arrives.
    pub fn new(
        config: DriverConfig,
        host: Arc<dyn DeviceHost>,
        secrets: Arc<dyn SecretProvider>,
    ) -> (Self, mpsc::Receiver<AsyncValues>) {
        let (tx, rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let driver = Self {
            inner: Arc::new(DriverInner {
                config,
                host,
                secrets,
                registry: ClientRegistry::new(),
                events: Mutex::new(Some(tx)),
            }),
        };
        (driver, rx)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Create clients for every device the host already knows. A camera
    /// whose ONVIF or vendor client cannot be created is logged and skipped;
    /// bad protocol properties or unobtainable credentials abort.
    pub async fn initialize(&self) -> Result<(), CoreError> {
        let devices = self.inner.host.devices();
        info!(devices = devices.len(), "initializing camera driver");
        for device in devices {
            let name = device.name.as_str();
            let info = CameraInfo::from_protocols(&device.protocols)
                .inspect_err(|e| error!(device = name, error = %e, "failed to create camera info"))?;
            let creds = self
                .credentials(&info)
                .await
                .inspect_err(|e| error!(device = name, error = %e, "failed to get camera credentials"))?;
            let credentials = OnceCell::new_with(Some(creds));

            if let Err(e) = self.onvif_client(name, &info, &credentials).await {
                error!(device = name, error = %e, "ONVIF client could not be initialized");
            }
            if let Err(e) = self.vendor_client(name, &info, &credentials).await {
                error!(device = name, error = %e, "vendor client could not be initialized");
            }
        }
        Ok(())
    }

    pub async fn add_device(&self, device_name: &str, protocols: &Protocols) -> Result<(), CoreError> {
        self.clients(device_name, protocols)
            .await
            .inspect_err(|e| error!(device = device_name, error = %e, "error adding device"))?;
        debug!(device = device_name, "device added");
        Ok(())
    }

    /// Property changes take effect on the next command; nothing is rebuilt.
    pub fn update_device(&self, device_name: &str, protocols: &Protocols) -> Result<(), CoreError> {
        let address = address_from_protocols(protocols)?;
        let connected = self.inner.registry.onvif(&address).is_some();
        debug!(device = device_name, address, connected, "device updated");
        Ok(())
    }

    pub async fn remove_device(&self, device_name: &str, protocols: &Protocols) -> Result<(), CoreError> {
        self.shutdown_camera(device_name, protocols).await
    }

    pub async fn disconnect_device(&self, device_name: &str, protocols: &Protocols) -> Result<(), CoreError> {
        self.shutdown_camera(device_name, protocols).await
    }

    /// Release every vendor client and close the event channel once the
    /// released loops have dropped their senders.
    pub async fn stop(&self, force: bool) {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let clients = self.inner.registry.drain();
        info!(clients = clients.len(), force, "stopping camera driver");
        for client in clients {
            client.release(force).await;
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn handle_read_commands(
        &self,
        device_name: &str,
        protocols: &Protocols,
        reqs: &[CommandRequest],
    ) -> Result<Vec<CommandValue>, CoreError> {
        self.read_commands(device_name, protocols, reqs)
            .await
            .inspect_err(|e| error!(device = device_name, error = %e, "read command failed"))
    }

    /// `params[i]` is the value written to `reqs[i]`.
    pub async fn handle_write_commands(
        &self,
        device_name: &str,
        protocols: &Protocols,
        reqs: &[CommandRequest],
        params: &[CommandValue],
    ) -> Result<(), CoreError> {
        self.write_commands(device_name, protocols, reqs, params)
            .await
            .inspect_err(|e| error!(device = device_name, error = %e, "write command failed"))
    }

    async fn read_commands(
        &self,
        device_name: &str,
        protocols: &Protocols,
        reqs: &[CommandRequest],
    ) -> Result<Vec<CommandValue>, CoreError> {
        let (onvif, vendor) = self.clients(device_name, protocols).await?;

        let mut values = Vec::with_capacity(reqs.len());
        for req in reqs {
            let value = match req.resource_name.parse::<OnvifRead>() {
                Ok(cmd) => read_onvif(&onvif, cmd, &req.resource_name).await?,
                Err(_) => secondary(&vendor, &req.resource_name)?.handle_read(req)?,
            };
            values.push(value);
        }
        Ok(values)
    }

    async fn write_commands(
        &self,
        device_name: &str,
        protocols: &Protocols,
        reqs: &[CommandRequest],
        params: &[CommandValue],
    ) -> Result<(), CoreError> {
        let (onvif, vendor) = self.clients(device_name, protocols).await?;

        for (i, req) in reqs.iter().enumerate() {
            let param = params.get(i).ok_or_else(|| CoreError::InvalidParameter {
                command: req.resource_name.clone(),
                reason: "no value supplied".into(),
            })?;
            match req.resource_name.parse::<OnvifWrite>() {
                Ok(cmd) => write_onvif(&onvif, cmd, param).await?,
                Err(_) => secondary(&vendor, &req.resource_name)?.handle_write(req, param)?,
            }
        }
        Ok(())
    }

    // ── Clients ──────────────────────────────────────────────────────

    /// The camera's ONVIF and vendor clients, created on first use.
    async fn clients(
        &self,
        device_name: &str,
        protocols: &Protocols,
    ) -> Result<(Arc<OnvifClient>, Arc<VendorClient>), CoreError> {
        let info = CameraInfo::from_protocols(protocols)?;
        // Looked up at most once per call, and only if a client is built.
        let credentials = OnceCell::new();
        let onvif = self.onvif_client(device_name, &info, &credentials).await?;
        let vendor = self.vendor_client(device_name, &info, &credentials).await?;
        Ok((onvif, vendor))
    }

    async fn onvif_client(
        &self,
        device_name: &str,
        info: &CameraInfo,
        credentials: &OnceCell<Credentials>,
    ) -> Result<Arc<OnvifClient>, CoreError> {
        self.inner
            .registry
            .onvif_or_try_init(&info.address, || async move {
                let creds = credentials.get_or_try_init(|| self.credentials(info)).await?;
                OnvifClient::connect(
                    &info.address,
                    &creds.username,
                    creds.password.clone(),
                    info.auth_method,
                    &self.inner.config.transport(),
                )
                .await
                .map_err(|e| CoreError::OnvifUnavailable {
                    device: device_name.to_owned(),
                    reason: e.to_string(),
                })
            })
            .await
    }

    async fn vendor_client(
        &self,
        device_name: &str,
        info: &CameraInfo,
        credentials: &OnceCell<Credentials>,
    ) -> Result<Arc<VendorClient>, CoreError> {
        self.inner
            .registry
            .vendor_or_try_init(&info.address, || async move {
                let device = self
                    .inner
                    .host
                    .device(device_name)
                    .ok_or_else(|| CoreError::DeviceNotFound {
                        name: device_name.to_owned(),
                    })?;
                let profile = self
                    .inner
                    .host
                    .profile(&device.profile_name)
                    .ok_or_else(|| CoreError::ProfileNotFound {
                        name: device.profile_name.clone(),
                    })?;

                let kind = VendorKind::from_labels(profile.labels.as_slice());
                let creds = match kind {
                    VendorKind::Noop => Credentials::anonymous(),
                    _ => credentials
                        .get_or_try_init(|| self.credentials(info))
                        .await?
                        .clone(),
                };
                let events = self.events()?;
                VendorClient::start(
                    kind,
                    VendorContext {
                        device_name,
                        profile: &profile,
                        address: &info.address,
                        credentials: &creds,
                        config: &self.inner.config,
                        events,
                    },
                )
            })
            .await
    }

    /// Remove the camera's clients from the registry, then release the
    /// vendor client without waiting for its loop.
    async fn shutdown_camera(&self, device_name: &str, protocols: &Protocols) -> Result<(), CoreError> {
        let address = address_from_protocols(protocols)
            .inspect_err(|e| error!(device = device_name, error = %e, "no address found for device"))?;

        let vendor = self.inner.registry.remove_vendor(&address);
        self.inner.registry.remove_onvif(&address);
        if let Some(vendor) = vendor {
            vendor.release(true).await;
        }
        info!(device = device_name, address, "camera clients released");
        Ok(())
    }

    fn events(&self) -> Result<mpsc::Sender<AsyncValues>, CoreError> {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| CoreError::Internal("driver is stopped".into()))
    }

    /// Credentials for `info`, retried until `credentials_retry_time`
    /// elapses. Cameras without authentication get empty credentials.
    async fn credentials(&self, info: &CameraInfo) -> Result<Credentials, CoreError> {
        let path = match info.credential_path.as_deref() {
            Some(path) if info.auth_method.requires_credentials() => path,
            _ => return Ok(Credentials::anonymous()),
        };

        let config = &self.inner.config;
        let deadline = Instant::now() + config.credentials_retry_time;
        loop {
            match self.inner.secrets.credentials(path) {
                Ok(creds) => return Ok(creds),
                Err(e) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(e);
                    }
                    warn!(path, error = %e, retry_in = ?config.credentials_retry_wait, "unable to retrieve camera credentials");
                    tokio::time::sleep(config.credentials_retry_wait.min(left)).await;
                }
            }
        }
    }
}

fn secondary<'a>(vendor: &'a VendorClient, command: &str) -> Result<&'a VendorClient, CoreError> {
    match vendor {
        VendorClient::Noop => Err(CoreError::NoSecondaryClient {
            command: command.to_owned(),
        }),
        client => Ok(client),
    }
}

async fn read_onvif(onvif: &OnvifClient, cmd: OnvifRead, resource: &str) -> Result<CommandValue, CoreError> {
    let value = match cmd {
        OnvifRead::DeviceInformation => Value::String(onvif.get_device_information().await?),
        OnvifRead::ProfileInformation => Value::String(onvif.get_profile_information().await?),
        OnvifRead::DateTime => Value::String(onvif.get_system_date_and_time().await?),
        OnvifRead::Hostname => Value::String(onvif.get_hostname().await?),
        OnvifRead::Dns => Value::String(onvif.get_dns().await?),
        OnvifRead::NetworkInterfaces => Value::String(onvif.get_network_interfaces().await?),
        OnvifRead::NetworkProtocols => Value::String(onvif.get_network_protocols().await?),
        OnvifRead::NetworkDefaultGateway => Value::String(onvif.get_network_default_gateway().await?),
        OnvifRead::Ntp => Value::String(onvif.get_ntp().await?),
        OnvifRead::SystemReboot => Value::String(onvif.reboot().await?),
        OnvifRead::Users => Value::String(onvif.get_users().await?),
        OnvifRead::Snapshot => Value::Binary(onvif.get_snapshot().await?),
        OnvifRead::StreamUri => Value::String(onvif.get_stream_uri().await?),
    };
    Ok(CommandValue::new(resource, value))
}

async fn write_onvif(onvif: &OnvifClient, cmd: OnvifWrite, param: &CommandValue) -> Result<(), CoreError> {
    let invalid = |reason: String| CoreError::InvalidParameter {
        command: cmd.as_ref().to_owned(),
        reason,
    };
    let string_param = || {
        param
            .as_str()
            .ok_or_else(|| invalid(format!("expected a string, got {}", param.value.type_name())))
    };

    match cmd {
        OnvifWrite::User => {
            let user: UserParam =
                serde_json::from_str(string_param()?).map_err(|e| invalid(e.to_string()))?;
            onvif.create_user(&user.into()).await?;
        }
        OnvifWrite::Reboot => {
            let reboot = param
                .as_bool()
                .ok_or_else(|| invalid(format!("expected a bool, got {}", param.value.type_name())))?;
            if reboot {
                onvif.reboot().await?;
            }
        }
        OnvifWrite::Hostname => onvif.set_hostname(string_param()?).await?,
        OnvifWrite::HostnameFromDhcp => onvif.set_hostname_from_dhcp().await?,
        OnvifWrite::DateTime => {
            let fields: DateTimeParam =
                serde_json::from_str(string_param()?).map_err(|e| invalid(e.to_string()))?;
            let at = fields
                .to_utc()
                .ok_or_else(|| invalid(format!("{fields:?} is not a valid UTC date and time")))?;
            onvif.set_system_date_and_time(at).await?;
        }
    }
    Ok(())
}
