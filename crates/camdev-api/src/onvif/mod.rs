// ONVIF client modules
//
// Hand-written SOAP 1.2 client for the ONVIF device and media services.
// Requests carry a WS-Security UsernameToken when credentials are set;
// responses are converted generically from XML to JSON.

pub mod client;
pub mod device;
pub mod media;
pub mod soap;
pub mod xml;

pub use client::{AuthMode, OnvifClient};
pub use device::NewUser;
