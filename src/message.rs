use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A message as returned by the mail provider: opaque id, thread id, arrival
/// time, and a possibly-nested multipart payload tree. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: String,
    /// Arrival time in milliseconds since the epoch, as the provider sends it.
    #[serde(rename = "internalDate", default)]
    pub internal_date: String,
    #[serde(default)]
    pub payload: MessagePart,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

impl RawMessage {
    /// Arrival time; epoch if the provider sent nothing usable.
    pub fn received_at(&self) -> DateTime<Utc> {
        let ms: i64 = self.internal_date.parse().unwrap_or(0);
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// Plain-text view of a message: whitespace-normalized, zero-width-stripped.
/// Derived deterministically from a RawMessage and never mutated after.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEmail {
    pub subject: String,
    pub sender: String,
    pub body: String,
}

/// Decode a RawMessage into clean text. Total: malformed payloads degrade to
/// empty strings, never an error.
pub fn normalize(msg: &RawMessage) -> NormalizedEmail {
    let subject = clean_text(&header_value(&msg.payload.headers, "Subject"));
    let sender = clean_text(&header_value(&msg.payload.headers, "From"));

    let mut plain = Vec::new();
    let mut html = Vec::new();
    collect_text(&msg.payload, &mut plain, &mut html);

    // Plain text anywhere in the tree beats HTML; HTML is a whole-body
    // fallback, not merged alongside a plain equivalent.
    let body = if !plain.is_empty() {
        plain.join("\n")
    } else {
        html.iter().map(|h| strip_tags(h)).collect::<Vec<_>>().join("\n")
    };

    NormalizedEmail {
        subject,
        sender,
        body: clean_text(&body),
    }
}

fn header_value(headers: &[Header], name: &str) -> String {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
        .unwrap_or_default()
}

fn collect_text(part: &MessagePart, plain: &mut Vec<String>, html: &mut Vec<String>) {
    if !part.parts.is_empty() {
        for p in &part.parts {
            collect_text(p, plain, html);
        }
        return;
    }
    let Some(data) = part.body.data.as_deref() else {
        return;
    };
    if part.mime_type.starts_with("text/html") {
        html.push(decode_payload(data));
    } else {
        // Leaf sections without an explicit type are treated as plain text.
        plain.push(decode_payload(data));
    }
}

/// Decode provider payload data: URL-safe base64, possibly missing padding.
/// Invalid input decodes to an empty string; invalid UTF-8 is substituted.
pub fn decode_payload(data: &str) -> String {
    let mut data = data.to_string();
    let rem = data.len() % 4;
    if rem != 0 {
        data.push_str(&"=".repeat(4 - rem));
    }
    match URL_SAFE.decode(data.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}

fn strip_tags(html: &str) -> String {
    let document = Html::parse_document(html);
    document.root_element().text().collect::<Vec<_>>().join(" ")
}

/// Strip zero-width characters and collapse whitespace. Idempotent.
pub fn clean_text(s: &str) -> String {
    static HORIZONTAL: OnceLock<Regex> = OnceLock::new();
    static BEFORE_NEWLINE: OnceLock<Regex> = OnceLock::new();
    let horizontal = HORIZONTAL.get_or_init(|| Regex::new(r"[ \t]+").unwrap());
    let before_newline = BEFORE_NEWLINE.get_or_init(|| Regex::new(r" +\n").unwrap());

    let s: String = s
        .chars()
        .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
        .collect();
    let s = horizontal.replace_all(&s, " ");
    let s = before_newline.replace_all(&s, "\n");
    s.trim().to_string()
}
