#![allow(clippy::unwrap_used)]
// Integration tests for `Driver` against a wiremock camera.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use tokio::sync::mpsc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use camdev_core::model::{
    ADDRESS, ALARM_CODE, ALARM_TYPE, AUTH_METHOD, CREDENTIAL_PATHS, COUNTER_NAME, HTTP_PROTOCOL,
};
use camdev_core::{
    AsyncValues, CommandRequest, CommandValue, CoreError, Credentials, Device, DeviceHost,
    DeviceProfile, DeviceResource, Driver, DriverConfig, Protocols, RcpSettings, SecretProvider,
    Value, VapixSettings,
};

// ── Host fakes ──────────────────────────────────────────────────────

struct MemoryHost {
    devices: Vec<Device>,
    profiles: Vec<DeviceProfile>,
}

impl DeviceHost for MemoryHost {
    fn device(&self, name: &str) -> Option<Device> {
        self.devices.iter().find(|d| d.name == name).cloned()
    }

    fn profile(&self, name: &str) -> Option<DeviceProfile> {
        self.profiles.iter().find(|p| p.name == name).cloned()
    }

    fn devices(&self) -> Vec<Device> {
        self.devices.clone()
    }
}

/// Fails `failures` times, then hands out `admin`/`pw`.
struct FlakySecrets {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakySecrets {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SecretProvider for FlakySecrets {
    fn credentials(&self, path: &str) -> Result<Credentials, CoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(CoreError::Credentials {
                path: path.to_owned(),
                message: "secret store not ready".into(),
            });
        }
        Ok(Credentials {
            username: "admin".into(),
            password: SecretString::from("pw".to_owned()),
        })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

const DEVICE: &str = "front-door";

fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope" xmlns:tds="http://www.onvif.org/ver10/device/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema"><SOAP-ENV:Body>{body}</SOAP-ENV:Body></SOAP-ENV:Envelope>"#
    )
}

fn soap_ok(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(envelope(body), "application/soap+xml")
}

fn protocols_at(address: &str, auth: &[(&str, &str)]) -> Protocols {
    let mut http: HashMap<String, String> = auth
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    http.insert(ADDRESS.to_owned(), address.to_owned());
    HashMap::from([(HTTP_PROTOCOL.to_owned(), http)])
}

fn protocols(server: &MockServer, auth: &[(&str, &str)]) -> Protocols {
    protocols_at(&server.address().to_string(), auth)
}

fn device(name: &str, protocols: &Protocols) -> Device {
    Device {
        name: name.into(),
        profile_name: "camera".into(),
        protocols: protocols.clone(),
    }
}

fn profile(labels: &[&str], resources: Vec<DeviceResource>) -> DeviceProfile {
    DeviceProfile {
        name: "camera".into(),
        labels: labels.iter().map(|l| (*l).to_owned()).collect(),
        resources,
    }
}

fn resource(name: &str, attrs: &[(&str, &str)]) -> DeviceResource {
    DeviceResource {
        name: name.into(),
        attributes: attrs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect(),
    }
}

fn fast_config() -> DriverConfig {
    let mut config = DriverConfig {
        credentials_retry_time: Duration::from_millis(300),
        credentials_retry_wait: Duration::from_millis(10),
        request_timeout: Duration::from_secs(5),
        ..DriverConfig::default()
    };
    config.bosch.poll_interval = Duration::from_millis(50);
    config
}

async fn mount_capabilities(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/onvif/device_service"))
        .and(body_string_contains("GetCapabilities"))
        .respond_with(soap_ok(
            "<tds:GetCapabilitiesResponse><tds:Capabilities/></tds:GetCapabilitiesResponse>",
        ))
        .mount(server)
        .await;
}

async fn setup_with(
    labels: &[&str],
    resources: Vec<DeviceResource>,
    auth: &[(&str, &str)],
    secrets: Arc<FlakySecrets>,
) -> (MockServer, Driver, mpsc::Receiver<AsyncValues>, Protocols) {
    let server = MockServer::start().await;
    mount_capabilities(&server).await;

    let protocols = protocols(&server, auth);
    let host = MemoryHost {
        devices: vec![device(DEVICE, &protocols)],
        profiles: vec![profile(labels, resources)],
    };
    let (driver, rx) = Driver::new(fast_config(), Arc::new(host), secrets);
    (server, driver, rx, protocols)
}

/// A driver for one camera at `protocols`, without a mock server.
fn single_camera(
    protocols: &Protocols,
    labels: &[&str],
    resources: Vec<DeviceResource>,
    config: DriverConfig,
) -> (Driver, mpsc::Receiver<AsyncValues>) {
    let host = MemoryHost {
        devices: vec![device(DEVICE, protocols)],
        profiles: vec![profile(labels, resources)],
    };
    Driver::new(config, Arc::new(host), FlakySecrets::new(0))
}

async fn setup(labels: &[&str], resources: Vec<DeviceResource>) -> (MockServer, Driver, mpsc::Receiver<AsyncValues>, Protocols) {
    setup_with(labels, resources, &[], FlakySecrets::new(0)).await
}

async fn capability_calls(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| String::from_utf8_lossy(&r.body).contains("GetCapabilities"))
        .count()
}

async fn calls_to(server: &MockServer, url_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == url_path)
        .count()
}

fn rcp_messages(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!("<message_list>{body}</message_list>"))
}

/// A JPEG frame whose COM segment carries an Axis trigger string.
fn axis_frame(triggers: &str) -> Vec<u8> {
    let mut comment = vec![0x0a, 0x03];
    comment.extend_from_slice(triggers.as_bytes());
    let len = u16::try_from(comment.len() + 2).unwrap();

    let mut frame = vec![0xff, 0xd8, 0xff, 0xfe];
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&comment);
    frame.extend_from_slice(&[0xff, 0xd9]);
    frame
}

fn mjpeg_body(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut body = Vec::new();
    for frame in frames {
        body.extend_from_slice(b"--myboundary\r\nContent-Type: image/jpeg\r\n");
        body.extend_from_slice(format!("Content-Length: {}\r\n\r\n", frame.len()).as_bytes());
        body.extend_from_slice(frame);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(b"--myboundary--\r\n");
    body
}

// ── Routing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_onvif_read_is_handled_by_onvif_client() {
    let (server, driver, _rx, protocols) = setup(&["camera"], Vec::new()).await;

    Mock::given(method("POST"))
        .and(path("/onvif/device_service"))
        .and(body_string_contains("GetHostname"))
        .respond_with(soap_ok(
            "<tds:GetHostnameResponse><tds:HostnameInformation><tt:Name>cam-1</tt:Name></tds:HostnameInformation></tds:GetHostnameResponse>",
        ))
        .mount(&server)
        .await;

    let values = driver
        .handle_read_commands(DEVICE, &protocols, &[CommandRequest::new("OnvifHostname")])
        .await
        .unwrap();

    assert_eq!(values.len(), 1);
    assert_eq!(values[0].resource_name, "OnvifHostname");
    let json: serde_json::Value = serde_json::from_str(values[0].as_str().unwrap()).unwrap();
    assert_eq!(json["HostnameInformation"]["Name"], "cam-1");
}

#[tokio::test]
async fn test_non_onvif_read_without_vendor_fails() {
    let (_server, driver, _rx, protocols) = setup(&["hikvision"], Vec::new()).await;

    let err = driver
        .handle_read_commands(DEVICE, &protocols, &[CommandRequest::new("MotionDetected")])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NoSecondaryClient { ref command } if command == "MotionDetected"));
}

#[tokio::test]
async fn test_non_onvif_read_falls_through_to_vendor() {
    let (_server, driver, _rx, protocols) = setup(
        &["Bosch"],
        vec![
            resource("MotionDetected", &[(ALARM_TYPE, "6")]),
            resource("PeopleCount", &[(COUNTER_NAME, "Entrance")]),
        ],
    )
    .await;

    let values = driver
        .handle_read_commands(
            DEVICE,
            &protocols,
            &[
                CommandRequest::new("MotionDetected").with_attribute(ALARM_TYPE, "6"),
                CommandRequest::new("PeopleCount").with_attribute(COUNTER_NAME, "Entrance"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(values[0].value, Value::Bool(false));
    assert_eq!(values[1].value, Value::Uint32(0));

    // Vendor errors come back unchanged.
    let err = driver
        .handle_read_commands(DEVICE, &protocols, &[CommandRequest::new("Unknown")])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UnrecognizedRead { vendor: "rcp" }));

    driver.stop(true).await;
}

#[tokio::test]
async fn test_missing_address_is_rejected() {
    let (_server, driver, _rx, _protocols) = setup(&["camera"], Vec::new()).await;

    let err = driver
        .handle_read_commands(DEVICE, &HashMap::new(), &[CommandRequest::new("OnvifHostname")])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::MissingProtocol { .. }));
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_write_hostname_and_skip_false_reboot() {
    let (server, driver, _rx, protocols) = setup(&["camera"], Vec::new()).await;

    Mock::given(method("POST"))
        .and(path("/onvif/device_service"))
        .and(body_string_contains("<tds:Name>lobby</tds:Name>"))
        .respond_with(soap_ok("<tds:SetHostnameResponse/>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("SystemReboot"))
        .respond_with(soap_ok("<tds:SystemRebootResponse/>"))
        .expect(0)
        .mount(&server)
        .await;

    driver
        .handle_write_commands(
            DEVICE,
            &protocols,
            &[CommandRequest::new("OnvifHostname"), CommandRequest::new("OnvifReboot")],
            &[
                CommandValue::new("OnvifHostname", Value::String("lobby".into())),
                CommandValue::new("OnvifReboot", Value::Bool(false)),
            ],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_write_rejects_bad_parameters() {
    let (_server, driver, _rx, protocols) = setup(&["camera"], Vec::new()).await;

    let err = driver
        .handle_write_commands(
            DEVICE,
            &protocols,
            &[CommandRequest::new("OnvifReboot")],
            &[CommandValue::new("OnvifReboot", Value::String("yes".into()))],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidParameter { .. }));

    let err = driver
        .handle_write_commands(
            DEVICE,
            &protocols,
            &[CommandRequest::new("OnvifDateTime")],
            &[CommandValue::new(
                "OnvifDateTime",
                Value::String(r#"{"Year":2024,"Month":13,"Day":1,"Hour":0,"Minute":0,"Second":0}"#.into()),
            )],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidParameter { .. }));

    let err = driver
        .handle_write_commands(DEVICE, &protocols, &[CommandRequest::new("OnvifHostname")], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidParameter { .. }));
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_clients_are_reused_until_device_removed() {
    let (server, driver, _rx, protocols) = setup(&["camera"], Vec::new()).await;

    driver.add_device(DEVICE, &protocols).await.unwrap();
    driver.add_device(DEVICE, &protocols).await.unwrap();
    assert_eq!(capability_calls(&server).await, 1);

    driver.remove_device(DEVICE, &protocols).await.unwrap();
    driver.initialize().await.unwrap();
    assert_eq!(capability_calls(&server).await, 2);

    driver.update_device(DEVICE, &protocols).unwrap();
    driver.disconnect_device(DEVICE, &protocols).await.unwrap();
}

#[tokio::test]
async fn test_initialize_skips_unreachable_camera() {
    let online = MockServer::start().await;
    mount_capabilities(&online).await;
    Mock::given(method("GET"))
        .and(path("/rcp.xml"))
        .respond_with(rcp_messages(""))
        .mount(&online)
        .await;

    // Nothing listens on port 1; the ONVIF handshake is refused.
    let offline_protocols = protocols_at("127.0.0.1:1", &[]);
    let online_protocols = protocols(&online, &[]);
    let host = MemoryHost {
        devices: vec![
            device("offline", &offline_protocols),
            device("online", &online_protocols),
        ],
        profiles: vec![profile(&["bosch"], Vec::new())],
    };
    let (driver, _rx) = Driver::new(fast_config(), Arc::new(host), FlakySecrets::new(0));

    driver.initialize().await.unwrap();
    assert_eq!(capability_calls(&online).await, 1);

    // The online camera's clients were kept; no second handshake.
    driver.add_device("online", &online_protocols).await.unwrap();
    assert_eq!(capability_calls(&online).await, 1);

    // The offline camera still fails on demand.
    let err = driver.add_device("offline", &offline_protocols).await.unwrap_err();
    assert!(matches!(err, CoreError::OnvifUnavailable { ref device, .. } if device == "offline"));

    driver.stop(true).await;
}

#[tokio::test]
async fn test_initialize_aborts_on_bad_protocols() {
    let host = MemoryHost {
        devices: vec![device("no-address", &HashMap::new())],
        profiles: vec![profile(&["camera"], Vec::new())],
    };
    let (driver, _rx) = Driver::new(fast_config(), Arc::new(host), FlakySecrets::new(0));

    let err = driver.initialize().await.unwrap_err();
    assert!(matches!(err, CoreError::MissingProtocol { .. }));
}

#[tokio::test]
async fn test_bosch_polling_stops_when_error_budget_runs_out() {
    let server = MockServer::start().await;
    mount_capabilities(&server).await;
    Mock::given(method("GET"))
        .and(path("/rcp.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = fast_config();
    config.bosch = RcpSettings {
        poll_interval: Duration::from_millis(20),
        error_budget: 3,
    };
    let protocols = protocols(&server, &[]);
    let (driver, _rx) = single_camera(&protocols, &["bosch"], Vec::new(), config);

    driver.add_device(DEVICE, &protocols).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(calls_to(&server, "/rcp.xml").await, 3);

    driver.stop(false).await;
}

#[tokio::test]
async fn test_bosch_successful_poll_restores_error_budget() {
    let server = MockServer::start().await;
    mount_capabilities(&server).await;
    Mock::given(method("GET"))
        .and(path("/rcp.xml"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rcp.xml"))
        .respond_with(rcp_messages(""))
        .up_to_n_times(1)
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rcp.xml"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(3)
        .mount(&server)
        .await;

    let mut config = fast_config();
    config.bosch = RcpSettings {
        poll_interval: Duration::from_millis(20),
        error_budget: 3,
    };
    let protocols = protocols(&server, &[]);
    let (driver, _rx) = single_camera(&protocols, &["bosch"], Vec::new(), config);

    driver.add_device(DEVICE, &protocols).await.unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;

    // Two failures, one success, then a full budget of three failures.
    assert_eq!(calls_to(&server, "/rcp.xml").await, 6);

    driver.stop(false).await;
}

#[tokio::test]
async fn test_bosch_zero_poll_interval_is_clamped() {
    let server = MockServer::start().await;
    mount_capabilities(&server).await;
    Mock::given(method("GET"))
        .and(path("/rcp.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = fast_config();
    config.bosch = RcpSettings {
        poll_interval: Duration::ZERO,
        error_budget: 2,
    };
    let protocols = protocols(&server, &[]);
    let (driver, _rx) = single_camera(&protocols, &["bosch"], Vec::new(), config);

    driver.add_device(DEVICE, &protocols).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(calls_to(&server, "/rcp.xml").await, 2);

    driver.stop(false).await;
}

#[tokio::test]
async fn test_axis_trigger_is_pushed_once_across_reconnects() {
    let server = MockServer::start().await;
    mount_capabilities(&server).await;
    Mock::given(method("GET"))
        .and(path("/axis-cgi/mjpg/video.cgi"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            mjpeg_body(&[axis_frame("AA=1;BB=0"), axis_frame("AA=1")]),
            "multipart/x-mixed-replace; boundary=myboundary",
        ))
        .mount(&server)
        .await;

    let mut config = fast_config();
    config.axis = VapixSettings {
        retry_delay: Duration::from_millis(20),
        error_budget: 3,
    };
    let protocols = protocols(&server, &[]);
    let (driver, mut rx) = single_camera(
        &protocols,
        &["axis"],
        vec![resource("Door", &[(ALARM_CODE, "AA")])],
        config,
    );

    driver.add_device(DEVICE, &protocols).await.unwrap();

    let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.device_name, DEVICE);
    assert_eq!(batch.values.len(), 1);
    assert_eq!(batch.values[0].resource_name, "Door");
    assert_eq!(batch.values[0].value, Value::Bool(true));

    // Each stream ends after two frames and is reopened; the state is
    // unchanged, so nothing more is pushed.
    assert!(
        tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .is_err()
    );
    assert!(calls_to(&server, "/axis-cgi/mjpg/video.cgi").await >= 2);

    // A waiting stop joins the listener, which drops the last sender.
    driver.stop(false).await;
    let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_bosch_alarm_change_is_pushed_once() {
    let (server, driver, mut rx, protocols) =
        setup(&["bosch"], vec![resource("MotionDetected", &[(ALARM_TYPE, "6")])]).await;

    // One alarm overview entry: type 6, state and state-set flags raised.
    Mock::given(method("GET"))
        .and(path("/rcp.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<message_list><msg><command>0x0c38</command><num>1</num><cltid>0x0001</cltid>\
             <hex>0x000000000001000830000106</hex></msg></message_list>",
        ))
        .mount(&server)
        .await;

    driver.add_device(DEVICE, &protocols).await.unwrap();

    let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.device_name, DEVICE);
    assert_eq!(batch.values.len(), 1);
    assert_eq!(batch.values[0].resource_name, "MotionDetected");
    assert_eq!(batch.values[0].value, Value::Bool(true));

    // Later polls see the same state and push nothing.
    assert!(
        tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .is_err()
    );

    let values = driver
        .handle_read_commands(
            DEVICE,
            &protocols,
            &[CommandRequest::new("MotionDetected").with_attribute(ALARM_TYPE, "6")],
        )
        .await
        .unwrap();
    assert_eq!(values[0].value, Value::Bool(true));

    driver.stop(false).await;
    assert!(rx.recv().await.is_none());
}

// ── Credentials ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_credentials_are_retried() {
    let secrets = FlakySecrets::new(2);
    let (_server, driver, _rx, protocols) = setup_with(
        &["camera"],
        Vec::new(),
        &[(AUTH_METHOD, "digest"), (CREDENTIAL_PATHS, "front-door-creds")],
        Arc::clone(&secrets),
    )
    .await;

    driver.add_device(DEVICE, &protocols).await.unwrap();
    assert_eq!(secrets.calls(), 3);
}

#[tokio::test]
async fn test_credentials_give_up_after_retry_time() {
    let secrets = FlakySecrets::new(usize::MAX);
    let (_server, driver, _rx, protocols) = setup_with(
        &["camera"],
        Vec::new(),
        &[(AUTH_METHOD, "basic"), (CREDENTIAL_PATHS, "front-door-creds")],
        Arc::clone(&secrets),
    )
    .await;

    let err = driver.add_device(DEVICE, &protocols).await.unwrap_err();
    assert!(matches!(err, CoreError::Credentials { .. }));
    assert!(secrets.calls() > 1);
}

#[tokio::test]
async fn test_no_credentials_lookup_without_auth() {
    let secrets = FlakySecrets::new(0);
    let (_server, driver, _rx, protocols) =
        setup_with(&["camera"], Vec::new(), &[], Arc::clone(&secrets)).await;

    driver.add_device(DEVICE, &protocols).await.unwrap();
    assert_eq!(secrets.calls(), 0);
}
