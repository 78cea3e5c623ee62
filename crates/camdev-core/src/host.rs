// ── Host platform seams ──
//
// The host IoT platform owns device registration and secret storage. The
// driver reaches both through these traits and never caches their answers
// beyond a single operation.

use secrecy::SecretString;

use crate::error::CoreError;
use crate::model::{Device, DeviceProfile};

/// Read access to the host's device registry.
pub trait DeviceHost: Send + Sync {
    fn device(&self, name: &str) -> Option<Device>;

    fn profile(&self, name: &str) -> Option<DeviceProfile>;

    /// Every device currently assigned to this driver.
    fn devices(&self) -> Vec<Device>;
}

/// Username and password for one camera.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    /// Empty credentials, used for cameras without authentication.
    pub fn anonymous() -> Self {
        Self {
            username: String::new(),
            password: SecretString::from(String::new()),
        }
    }
}

/// Access to the host's secret store.
pub trait SecretProvider: Send + Sync {
    /// Look up the credentials stored at `path`.
    ///
    /// Implementations return `CoreError::Credentials` when the secret is
    /// missing or the store is unavailable; the driver retries.
    fn credentials(&self, path: &str) -> Result<Credentials, CoreError>;
}
