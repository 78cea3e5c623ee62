// Axis VAPIX trigger stream
//
// Axis cameras embed I/O and motion trigger states in a JPEG comment (COM)
// segment of each MJPEG frame. The frames arrive as parts of a long-lived
// `multipart/x-mixed-replace` response.

use bytes::Bytes;
use futures_util::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

use crate::digest::DigestClient;
use crate::error::Error;
use crate::packet::Packet;

const COM_MARKER: [u8; 2] = [0xff, 0xfe];
const AXIS_TRIGGER_TAG: u16 = 0x0a03;

/// One alarm trigger parsed from a frame comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub alarm_code: String,
    pub state: bool,
}

/// Parse a `;`-separated trigger string such as `"AA=1;BB=0"`.
///
/// Each segment is `<2-char code>=<flag>`, and flag `'1'` means active.
/// Codes rejected by `is_registered` are skipped. A segment shorter than
/// four characters ends the scan. When several registered codes appear,
/// the last one wins.
pub fn triggers_from_str(triggers: &str, is_registered: impl Fn(&str) -> bool) -> Option<Trigger> {
    let mut found = None;
    for segment in triggers.split(';') {
        let bytes = segment.as_bytes();
        if bytes.len() < 4 {
            break;
        }
        let Some(code) = segment.get(..2) else {
            continue;
        };
        if is_registered(code) {
            found = Some(Trigger {
                alarm_code: code.to_owned(),
                state: bytes[3] == b'1',
            });
        }
    }
    found
}

/// Locate the Axis trigger string inside a JPEG frame.
///
/// Scans for COM segments; the first one whose payload starts with the
/// Axis tag `0x0a03` is returned, without the tag and trailing NULs.
/// Segments whose declared length runs past the frame are skipped.
pub fn find_trigger_comment(frame: &[u8]) -> Option<String> {
    let packet = Packet::new(frame);
    let mut i = 0;
    while i + 4 <= frame.len() {
        if frame[i..i + 2] != COM_MARKER {
            i += 1;
            continue;
        }
        // The segment length counts its own two bytes.
        let Ok(length) = packet.u16(i + 2) else {
            break;
        };
        let data_len = usize::from(length).saturating_sub(2);
        if let Ok(data) = packet.bytes(i + 4, data_len) {
            if data.len() >= 2 && u16::from_be_bytes([data[0], data[1]]) == AXIS_TRIGGER_TAG {
                let text = String::from_utf8_lossy(&data[2..]);
                return Some(text.trim_end_matches('\0').to_owned());
            }
        }
        i += 2;
    }
    None
}

/// Parse the trigger carried by one MJPEG frame, if any.
pub fn parse_triggers(frame: &[u8], is_registered: impl Fn(&str) -> bool) -> Option<Trigger> {
    find_trigger_comment(frame).and_then(|s| triggers_from_str(&s, is_registered))
}

/// `http://<address>/axis-cgi/mjpg/video.cgi?fps=1`
pub fn video_url(address: &str) -> Result<Url, Error> {
    Ok(Url::parse(&format!("http://{address}/axis-cgi/mjpg/video.cgi?fps=1"))?)
}

// ── Client ───────────────────────────────────────────────────────────

/// Opens trigger streams against one Axis camera.
pub struct VapixClient {
    digest: DigestClient,
    address: String,
}

impl VapixClient {
    /// `digest` should wrap a client built without a total request timeout.
    pub fn new(digest: DigestClient, address: impl Into<String>) -> Self {
        Self {
            digest,
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Open the MJPEG stream.
    ///
    /// Fails on a non-200 status or when the response is not `multipart/*`
    /// with a boundary parameter.
    pub async fn open_stream(&self) -> Result<FrameStream, Error> {
        let url = video_url(&self.address)?;
        debug!(address = %self.address, %url, "opening VAPIX stream");

        let resp = self.digest.get(url.clone()).await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(Error::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let boundary = multipart_boundary(&content_type)?;

        let body = resp.bytes_stream().map_err(std::io::Error::other);
        Ok(FrameStream {
            multipart: multer::Multipart::new(body, boundary),
        })
    }
}

/// Extract the boundary of a `multipart/*` content type.
pub fn multipart_boundary(content_type: &str) -> Result<String, Error> {
    let not_multipart = || Error::NotMultipart {
        content_type: content_type.to_owned(),
    };

    let mime: mime::Mime = content_type.parse().map_err(|_| not_multipart())?;
    if mime.type_() != mime::MULTIPART {
        return Err(not_multipart());
    }
    mime.get_param(mime::BOUNDARY)
        .map(|b| b.as_str().to_owned())
        .ok_or_else(not_multipart)
}

/// A live multipart MJPEG response, one frame per part.
pub struct FrameStream {
    multipart: multer::Multipart<'static>,
}

impl FrameStream {
    /// Read the next frame. The end of the stream is an error.
    pub async fn next_frame(&mut self) -> Result<Bytes, Error> {
        match self.multipart.next_field().await? {
            Some(field) => Ok(field.bytes().await?),
            None => Err(Error::StreamEnded),
        }
    }
}
