// Bosch RCP (Remote Control Protocol) over HTTP
//
// The camera exposes `/rcp.xml`, which answers with a `message_list` of
// `msg` elements. Each `msg` carries a `0x`-prefixed hex payload whose
// binary layout depends on the RCP command. Two commands are decoded here:
// the alarm overview and the IVA counter values.

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::digest::DigestClient;
use crate::error::Error;
use crate::packet::Packet;

/// RCP command code for the alarm overview.
pub const CONF_ALARM_OVERVIEW: &str = "0x0c38";
/// RCP command code for the IVA counter values.
pub const CONF_IVA_COUNTER_VALUES: &str = "0x0b4a";

/// How long the camera collects messages before answering a poll.
pub const COLLECT_MS: &str = "5000";

const ALARM_ADD_FLAG: u8 = 0x80;
const ALARM_DELETE_FLAG: u8 = 0x40;
const ALARM_STATE_FLAG: u8 = 0x20;
const ALARM_STATE_SET_FLAG: u8 = 0x10;

const READOUT_FLAG: u8 = 0x80;

const ALARM_ENTRIES_OFFSET: usize = 4;
const ALARM_HEADER_LEN: usize = 8;

const COUNTER_RECORD_LEN: usize = 70;
const COUNTER_NAME_LEN: usize = 64;

// ── Wire types ───────────────────────────────────────────────────────

/// Body of an `/rcp.xml` response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename = "message_list")]
pub struct MessageList {
    #[serde(rename = "msg", default)]
    pub messages: Vec<RcpMessage>,
}

/// One `msg` element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RcpMessage {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub num: String,
    #[serde(default)]
    pub cltid: String,
    #[serde(default)]
    pub hex: String,
}

/// The RCP commands this crate knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcpCommand {
    AlarmOverview,
    IvaCounterValues,
}

impl RcpMessage {
    pub fn kind(&self) -> Option<RcpCommand> {
        if self.command.eq_ignore_ascii_case(CONF_ALARM_OVERVIEW) {
            Some(RcpCommand::AlarmOverview)
        } else if self.command.eq_ignore_ascii_case(CONF_IVA_COUNTER_VALUES) {
            Some(RcpCommand::IvaCounterValues)
        } else {
            None
        }
    }

    /// Hex-decode the payload, ignoring the `0x` prefix.
    pub fn payload(&self) -> Result<Vec<u8>, Error> {
        let raw = self.hex.trim();
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        hex::decode(digits).map_err(|e| Error::decode(format!("invalid RCP hex payload: {e}")))
    }
}

// ── Decoded records ──────────────────────────────────────────────────

/// One entry of the alarm overview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub entry_id: u16,
    pub entry_length: u16,
    pub flag_add: bool,
    pub flag_delete: bool,
    pub flag_state: bool,
    pub flag_state_set: bool,
    pub source: u8,
    pub alarm_type: u8,
    pub name: String,
}

impl Alarm {
    /// Boolean alarm value: set when the state and state-set flags agree.
    pub fn value(&self) -> bool {
        self.flag_state_set == self.flag_state
    }
}

/// One IVA counter record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterData {
    pub id: u8,
    pub counter_type: u8,
    pub name: String,
    pub value: u32,
}

/// Decode an alarm overview payload.
///
/// Bit 0x80 of byte 0 marks a readout; a readout reports only entries whose
/// state flag is set. Entries start at offset 4, and each entry declares its
/// own length, header included.
pub fn parse_alarms(payload: &[u8]) -> Result<Vec<Alarm>, Error> {
    let packet = Packet::new(payload);
    let readout = packet.u8(0)? & READOUT_FLAG != 0;

    let mut alarms = Vec::new();
    let mut i = ALARM_ENTRIES_OFFSET;
    while i < packet.len() {
        let entry_id = packet.u16(i)?;
        let entry_length = packet.u16(i + 2)?;
        let len = usize::from(entry_length);
        if len < ALARM_HEADER_LEN {
            return Err(Error::decode(format!(
                "alarm entry at offset {i} declares length {len}, shorter than its header"
            )));
        }

        let flags = packet.u8(i + 4)?;
        let alarm = Alarm {
            entry_id,
            entry_length,
            flag_add: flags & ALARM_ADD_FLAG != 0,
            flag_delete: flags & ALARM_DELETE_FLAG != 0,
            flag_state: flags & ALARM_STATE_FLAG != 0,
            flag_state_set: flags & ALARM_STATE_SET_FLAG != 0,
            source: packet.u8(i + 6)?,
            alarm_type: packet.u8(i + 7)?,
            name: packet.utf16_string(i + ALARM_HEADER_LEN, len - ALARM_HEADER_LEN)?,
        };
        i += len;

        if !readout || alarm.flag_state {
            alarms.push(alarm);
        }
    }
    Ok(alarms)
}

/// Decode an IVA counter payload: one header byte, then fixed 70-byte records.
pub fn parse_counters(payload: &[u8]) -> Result<Vec<CounterData>, Error> {
    let body = payload
        .get(1..)
        .ok_or_else(|| Error::decode("empty counter payload"))?;
    let packet = Packet::new(body);

    let mut counters = Vec::with_capacity(packet.len() / COUNTER_RECORD_LEN);
    let mut i = 0;
    while i < packet.len() {
        counters.push(CounterData {
            id: packet.u8(i)?,
            counter_type: packet.u8(i + 1)?,
            name: packet.utf16_string(i + 2, COUNTER_NAME_LEN)?,
            value: packet.u32(i + 2 + COUNTER_NAME_LEN)?,
        });
        i += COUNTER_RECORD_LEN;
    }
    Ok(counters)
}

// ── URLs ─────────────────────────────────────────────────────────────

/// Build `http://<address>/rcp.xml?<action>=<command>[&k=v...]`.
pub fn rcp_url(address: &str, action: &str, command: &str, params: &[(&str, &str)]) -> Result<Url, Error> {
    let mut raw = format!("http://{address}/rcp.xml?{action}={command}");
    for (key, value) in params {
        raw.push('&');
        raw.push_str(key);
        raw.push('=');
        raw.push_str(value);
    }
    Ok(Url::parse(&raw)?)
}

/// The poll URL requesting both alarm overview and counter values.
pub fn event_poll_url(address: &str) -> Result<Url, Error> {
    rcp_url(
        address,
        "message",
        &format!("{CONF_ALARM_OVERVIEW}${CONF_IVA_COUNTER_VALUES}"),
        &[("collectms", COLLECT_MS)],
    )
}

// ── Client ───────────────────────────────────────────────────────────

/// Fetches RCP message lists from one Bosch camera.
pub struct RcpClient {
    digest: DigestClient,
    address: String,
}

impl RcpClient {
    pub fn new(digest: DigestClient, address: impl Into<String>) -> Self {
        Self {
            digest,
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Issue one event poll and return the messages it carried.
    pub async fn poll_messages(&self) -> Result<Vec<RcpMessage>, Error> {
        let url = event_poll_url(&self.address)?;
        debug!(address = %self.address, %url, "polling RCP events");

        let resp = self.digest.get(url.clone()).await?;
        if !resp.status().is_success() {
            return Err(Error::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }

        let body = resp.text().await?;
        parse_message_list(&body)
    }
}

/// Parse an `/rcp.xml` response body.
pub fn parse_message_list(body: &str) -> Result<Vec<RcpMessage>, Error> {
    quick_xml::de::from_str::<MessageList>(body)
        .map(|list| list.messages)
        .map_err(|e| Error::Xml {
            message: e.to_string(),
            body: body.to_owned(),
        })
}
