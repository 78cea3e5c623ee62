// camdev-core: Camera driver between the host IoT platform and camdev-api.

pub mod config;
pub mod driver;
pub mod error;
pub mod host;
pub mod model;
pub mod registry;
mod task;
pub mod vendor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DriverConfig, RcpSettings, VapixSettings};
pub use driver::Driver;
pub use error::CoreError;
pub use host::{Credentials, DeviceHost, SecretProvider};
pub use model::{
    AsyncValues, CameraInfo, CommandRequest, CommandValue, Device, DeviceProfile, DeviceResource,
    Protocols, Value,
};
pub use registry::ClientRegistry;
pub use vendor::{VendorClient, VendorKind};

pub use camdev_api::{AuthMode, TlsMode};
