// camdev-api: Async wire-level clients for IP cameras (ONVIF, Bosch RCP, Axis VAPIX)

pub mod digest;
pub mod error;
pub mod onvif;
pub mod packet;
pub mod rcp;
pub mod transport;
pub mod vapix;

pub use digest::DigestClient;
pub use error::Error;
pub use onvif::{AuthMode, NewUser, OnvifClient};
pub use rcp::RcpClient;
pub use transport::{TlsMode, TransportConfig};
pub use vapix::{FrameStream, Trigger, VapixClient};
