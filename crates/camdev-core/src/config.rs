// ── Runtime driver configuration ──
//
// Tuning for credential lookup, camera HTTP calls and the vendor
// background loops. The host (or `camdev-config`) builds a `DriverConfig`
// and hands it in; core never reads config files.

use std::time::Duration;

use camdev_api::{TlsMode, TransportConfig};

/// Bosch RCP polling loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcpSettings {
    /// Time between event polls.
    pub poll_interval: Duration,
    /// Consecutive failed polls before the loop gives up.
    pub error_budget: u32,
}

impl Default for RcpSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            error_budget: 60,
        }
    }
}

/// Axis VAPIX listen/retry loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VapixSettings {
    /// Delay before reopening a failed stream.
    pub retry_delay: Duration,
    /// Consecutive failed listen cycles before the loop gives up.
    pub error_budget: u32,
}

impl Default for VapixSettings {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            error_budget: 60,
        }
    }
}

/// Configuration for one driver instance.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Total time spent retrying a credential lookup.
    pub credentials_retry_time: Duration,
    /// Wait between credential lookup attempts.
    pub credentials_retry_wait: Duration,
    /// Timeout for request/response camera calls.
    pub request_timeout: Duration,
    /// TLS handling for HTTPS camera endpoints.
    pub tls: TlsMode,
    pub bosch: RcpSettings,
    pub axis: VapixSettings,
    /// Capacity of the outbound async-event channel.
    pub event_channel_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            credentials_retry_time: Duration::from_secs(30),
            credentials_retry_wait: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            tls: TlsMode::default(),
            bosch: RcpSettings::default(),
            axis: VapixSettings::default(),
            event_channel_capacity: 256,
        }
    }
}

impl DriverConfig {
    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.clone(),
            ..TransportConfig::with_timeout(self.request_timeout)
        }
    }
}
