// Generic XML → JSON conversion for SOAP responses
//
// ONVIF responses are deeply nested and vary by vendor, so they are not
// mapped onto typed structs. Instead each element becomes a JSON value:
//
// - namespace prefixes are stripped from element and attribute names
// - `xmlns` declarations are dropped
// - attributes become keys of the element's object
// - a leaf element with no attributes becomes its text
// - text next to attributes or children is stored under `#text`
// - repeated sibling elements collapse into an array

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::error::Error;

/// Key used for element text that sits beside attributes or children.
pub const TEXT_KEY: &str = "#text";

struct Frame {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            fields: Map::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> Value {
        let text = self.text.trim();
        if self.fields.is_empty() {
            return Value::String(text.to_owned());
        }
        let mut fields = self.fields;
        if !text.is_empty() {
            fields.insert(TEXT_KEY.to_owned(), Value::String(text.to_owned()));
        }
        Value::Object(fields)
    }
}

/// Convert an XML document into a JSON object keyed by the root element.
pub fn to_json(body: &str) -> Result<Value, Error> {
    let xml_err = |message: String| Error::Xml {
        message,
        body: body.to_owned(),
    };

    let mut reader = Reader::from_str(body);
    let mut stack = vec![Frame::new(String::new())];

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push(open_frame(&start).map_err(xml_err)?);
            }
            Ok(Event::Empty(start)) => {
                let frame = open_frame(&start).map_err(xml_err)?;
                close_frame(&mut stack, frame);
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err(xml_err("unbalanced closing tag".into()));
                }
                if let Some(frame) = stack.pop() {
                    close_frame(&mut stack, frame);
                }
            }
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|e| xml_err(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(data)) => {
                let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&data);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml_err(e.to_string())),
        }
    }

    if stack.len() != 1 {
        return Err(xml_err("unexpected end of document".into()));
    }
    let root = stack.pop().map(|f| f.fields).unwrap_or_default();
    if root.is_empty() {
        return Err(xml_err("document has no root element".into()));
    }
    Ok(Value::Object(root))
}

fn open_frame(start: &BytesStart<'_>) -> Result<Frame, String> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut frame = Frame::new(name);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let local = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        frame.fields.insert(local, Value::String(value.into_owned()));
    }
    Ok(frame)
}

fn close_frame(stack: &mut [Frame], frame: Frame) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    let name = frame.name.clone();
    let value = frame.into_value();

    match parent.fields.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            parent.fields.insert(name, value);
        }
    }
}

// ── Lookup helpers ───────────────────────────────────────────────────

/// Follow a path of element names, taking the first item of any array.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| first(current).get(*key))
}

/// The first element of an array, or the value itself.
pub fn first(value: &Value) -> &Value {
    match value {
        Value::Array(items) => items.first().unwrap_or(value),
        other => other,
    }
}

/// Best-effort text of an element: a string, its `#text`, or the text of
/// its first child.
pub fn text_of(value: &Value) -> Option<String> {
    match first(value) {
        Value::String(s) => Some(s.clone()),
        Value::Object(fields) => fields
            .get(TEXT_KEY)
            .and_then(text_of)
            .or_else(|| fields.values().next().and_then(text_of)),
        _ => None,
    }
}
