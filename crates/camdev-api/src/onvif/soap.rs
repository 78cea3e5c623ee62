// SOAP 1.2 envelope construction and response unwrapping

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use rand::RngCore;
use serde_json::Value;
use sha1::{Digest, Sha1};

use super::xml;
use crate::error::Error;

pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
const PASSWORD_DIGEST: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
const BASE64_BINARY: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// WS-Security UsernameToken credentials.
pub struct UsernameToken<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

impl UsernameToken<'_> {
    /// Render the `<wsse:Security>` header with a fresh nonce.
    pub fn header(&self, created: DateTime<Utc>) -> String {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.header_with_nonce(&nonce, created)
    }

    fn header_with_nonce(&self, nonce: &[u8], created: DateTime<Utc>) -> String {
        let created = created.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let digest = password_digest(nonce, &created, self.password);

        format!(
            r#"<wsse:Security s:mustUnderstand="1" xmlns:wsse="{WSSE_NS}" xmlns:wsu="{WSU_NS}"><wsse:UsernameToken><wsse:Username>{username}</wsse:Username><wsse:Password Type="{PASSWORD_DIGEST}">{digest}</wsse:Password><wsse:Nonce EncodingType="{BASE64_BINARY}">{nonce}</wsse:Nonce><wsu:Created>{created}</wsu:Created></wsse:UsernameToken></wsse:Security>"#,
            username = escape(self.username),
            nonce = BASE64.encode(nonce),
        )
    }
}

/// Base64(SHA1(nonce + created + password))
pub fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Wrap an operation body in a SOAP 1.2 envelope.
pub fn envelope(body: &str, security: Option<&str>) -> String {
    let header = security
        .map(|s| format!("<s:Header>{s}</s:Header>"))
        .unwrap_or_default();

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope""#,
            r#" xmlns:tds="http://www.onvif.org/ver10/device/wsdl""#,
            r#" xmlns:trt="http://www.onvif.org/ver10/media/wsdl""#,
            r#" xmlns:tt="http://www.onvif.org/ver10/schema">"#,
            "{header}<s:Body>{body}</s:Body></s:Envelope>"
        ),
        header = header,
        body = body,
    )
}

/// A parsed SOAP response: either the body's payload or a fault.
#[derive(Debug)]
pub enum Reply {
    /// The single child of `<Body>` (e.g. `GetHostnameResponse`) as JSON.
    Body { name: String, value: Value },
    Fault { code: String, reason: String },
}

/// Parse a SOAP envelope and pick out the body payload or fault.
pub fn parse_reply(body: &str) -> Result<Reply, Error> {
    let json = xml::to_json(body)?;
    let soap_body = xml::lookup(&json, &["Envelope", "Body"]).ok_or_else(|| Error::Xml {
        message: "response has no SOAP body".into(),
        body: body.to_owned(),
    })?;

    if let Some(fault) = xml::lookup(soap_body, &["Fault"]) {
        return Ok(fault_reply(fault));
    }

    match xml::first(soap_body) {
        Value::Object(fields) => match fields.iter().next() {
            Some((name, value)) => Ok(Reply::Body {
                name: name.clone(),
                value: value.clone(),
            }),
            None => Ok(Reply::Body {
                name: String::new(),
                value: Value::Null,
            }),
        },
        _ => Ok(Reply::Body {
            name: String::new(),
            value: Value::Null,
        }),
    }
}

fn fault_reply(fault: &Value) -> Reply {
    // SOAP 1.2 nests the detailed code under Subcode; SOAP 1.1 uses faultcode.
    let code = xml::lookup(fault, &["Code", "Subcode", "Value"])
        .or_else(|| xml::lookup(fault, &["Code", "Value"]))
        .or_else(|| xml::lookup(fault, &["faultcode"]))
        .and_then(xml::text_of)
        .unwrap_or_default();
    let reason = xml::lookup(fault, &["Reason", "Text"])
        .or_else(|| xml::lookup(fault, &["faultstring"]))
        .and_then(xml::text_of)
        .unwrap_or_default();
    Reply::Fault { code, reason }
}
