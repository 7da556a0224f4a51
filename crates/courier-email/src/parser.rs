// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RFC 5322 parsing into a flat, storage-independent form.
//!
//! Threading headers are read from the raw header block so ids keep their
//! angle brackets exactly as sent. Everything else (encoded words, address
//! lists, dates, MIME bodies) goes through `mail-parser`.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use courier_core::{CourierError, MediaBlob};
use mail_parser::{Address, MessageParser, MessagePart, MimeHeaders, PartType};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::html::CidImage;

static MSG_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^<>\s]+>").unwrap());

/// A mailbox from an address header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAddress {
    /// Lowercased address.
    pub address: String,
    pub name: Option<String>,
}

/// Everything the ingestor needs from one email.
#[derive(Debug, Clone)]
pub struct ParsedEmail {
    pub message_id: String,
    pub in_reply_to: Option<String>,
    /// Oldest first, as written in the header.
    pub references: Vec<String>,
    pub subject: Option<String>,
    pub date: DateTime<Utc>,
    pub from: Option<MailAddress>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub text: String,
    pub html: Option<String>,
    /// Images referenced from the HTML by content id (without brackets).
    pub cid_images: HashMap<String, CidImage>,
    /// First attachment that is not referenced by content id.
    pub attachment: Option<MediaBlob>,
    /// Unfolded header block, first occurrence of each name.
    pub headers: serde_json::Map<String, serde_json::Value>,
}

impl ParsedEmail {
    /// Parent candidates, most specific first: In-Reply-To, then References newest to oldest.
    pub fn parent_candidates(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        if let Some(parent) = &self.in_reply_to {
            out.push(parent);
        }
        for id in self.references.iter().rev() {
            if !out.contains(&id.as_str()) && *id != self.message_id {
                out.push(id);
            }
        }
        out
    }
}

/// Parse raw RFC 5322 bytes.
///
/// Only input with no recognizable header block is rejected; malformed dates,
/// charsets or MIME parts fall back to defaults.
pub fn parse_email(raw: &[u8]) -> Result<ParsedEmail, CourierError> {
    let mut headers = raw_headers(raw);
    if headers.is_empty() {
        return Err(CourierError::Parse("no RFC 5322 header block".into()));
    }
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| CourierError::Parse("unparseable email".into()))?;

    let message_id = match header_ids(&headers, "Message-ID").into_iter().next() {
        Some(id) => id,
        None => {
            let id = format!("<{}@courier.local>", hex::encode(Sha256::digest(raw)));
            debug!(message_id = %id, "email has no Message-ID, synthesized one");
            headers.insert("Message-ID".into(), id.clone().into());
            id
        }
    };
    let in_reply_to = header_ids(&headers, "In-Reply-To").into_iter().next();
    let references = header_ids(&headers, "References");

    let date = message
        .date()
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    let from = message
        .from()
        .and_then(|a| a.iter().find_map(mail_address));

    let mut bodies = Bodies::default();
    for part in &message.parts {
        bodies.collect(part);
    }

    Ok(ParsedEmail {
        message_id,
        in_reply_to,
        references,
        subject: message.subject().map(str::to_string),
        date,
        from,
        to: addresses(message.to()),
        cc: addresses(message.cc()),
        bcc: addresses(message.bcc()),
        text: bodies.text.join("\n").trim().to_string(),
        html: Some(bodies.html.join("\n").trim().to_string()).filter(|h| !h.is_empty()),
        cid_images: bodies.cid_images,
        attachment: bodies.attachment,
        headers,
    })
}

fn mail_address(addr: &mail_parser::Addr<'_>) -> Option<MailAddress> {
    let address = addr.address()?.trim();
    if address.is_empty() {
        return None;
    }
    Some(MailAddress {
        address: address.to_lowercase(),
        name: addr
            .name()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string),
    })
}

fn addresses(header: Option<&Address<'_>>) -> Vec<String> {
    header
        .map(|a| a.iter().filter_map(mail_address).map(|m| m.address).collect())
        .unwrap_or_default()
}

#[derive(Default)]
struct Bodies {
    text: Vec<String>,
    html: Vec<String>,
    cid_images: HashMap<String, CidImage>,
    attachment: Option<MediaBlob>,
}

impl Bodies {
    fn collect(&mut self, part: &MessagePart<'_>) {
        let disposition = part.content_disposition().map(|d| d.ctype().to_ascii_lowercase());
        let is_attachment = disposition.as_deref() == Some("attachment");
        let content_type = part
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(sub) => format!("{}/{}", ct.ctype(), sub),
                None => ct.ctype().to_string(),
            })
            .unwrap_or_else(|| "application/octet-stream".to_string())
            .to_ascii_lowercase();

        match &part.body {
            PartType::Text(text) if !is_attachment => self.text.push(text.trim().to_string()),
            PartType::Html(html) if !is_attachment => self.html.push(html.trim().to_string()),
            PartType::Text(_) | PartType::Html(_) | PartType::Binary(_) | PartType::InlineBinary(_) => {
                let data = part.contents().to_vec();
                if let Some(cid) = part.content_id() {
                    let cid = cid.trim().trim_start_matches('<').trim_end_matches('>');
                    if content_type.starts_with("image/") {
                        self.cid_images.insert(
                            cid.to_string(),
                            CidImage {
                                content_type,
                                data,
                            },
                        );
                    }
                    return;
                }
                if self.attachment.is_none() && disposition.as_deref() != Some("inline") {
                    self.attachment = Some(MediaBlob {
                        filename: part
                            .attachment_name()
                            .unwrap_or("attachment")
                            .to_string(),
                        content_type,
                        data,
                    });
                }
            }
            PartType::Message(_) | PartType::Multipart(_) => {}
        }
    }
}

/// The header block, unfolded, as a JSON object.
fn raw_headers(raw: &[u8]) -> serde_json::Map<String, serde_json::Value> {
    let text = String::from_utf8_lossy(raw);
    let mut lines: Vec<String> = Vec::new();
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push(' ');
                last.push_str(line.trim());
            }
            continue;
        }
        lines.push(line.to_string());
    }

    let mut headers = serde_json::Map::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || name.contains(' ') {
            continue;
        }
        let exists = headers.keys().any(|k| k.eq_ignore_ascii_case(name));
        if !exists {
            headers.insert(name.to_string(), value.trim().to_string().into());
        }
    }
    headers
}

fn header_ids(headers: &serde_json::Map<String, serde_json::Value>, name: &str) -> Vec<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.as_str())
        .map(extract_ids)
        .unwrap_or_default()
}

/// Message ids in order of appearance, always in angle brackets.
///
/// Some senders omit the brackets. When a value has no bracketed id at all,
/// each whitespace or comma separated token containing `@` is taken as an
/// id and bracketed, so both spellings refer to the same message.
pub fn extract_ids(value: &str) -> Vec<String> {
    let bracketed: Vec<String> = MSG_ID
        .find_iter(value)
        .map(|m| m.as_str().to_string())
        .collect();
    if !bracketed.is_empty() {
        return bracketed;
    }
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| token.contains('@') && !token.contains(['<', '>', '(', ')']))
        .map(|token| format!("<{token}>"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_test_utils::RawEmail;

    #[test]
    fn threading_headers_keep_brackets() {
        let raw = RawEmail::new("<c@x>", "Carol <Carol@Example.com>", "bot@x")
            .reply_to("<b@x>", &["<a@x>", "<b@x>"])
            .text("hi")
            .build();
        let parsed = parse_email(&raw).unwrap();
        assert_eq!(parsed.message_id, "<c@x>");
        assert_eq!(parsed.in_reply_to.as_deref(), Some("<b@x>"));
        assert_eq!(parsed.references, ["<a@x>", "<b@x>"]);
        assert_eq!(parsed.parent_candidates(), ["<b@x>", "<a@x>"]);
        let from = parsed.from.unwrap();
        assert_eq!(from.address, "carol@example.com");
        assert_eq!(from.name.as_deref(), Some("Carol"));
    }

    #[test]
    fn bare_ids_are_bracketed() {
        assert_eq!(extract_ids("abc.123@mail.example"), ["<abc.123@mail.example>"]);
        assert_eq!(extract_ids(" a@x,  b@x "), ["<a@x>", "<b@x>"]);
        assert_eq!(extract_ids("<a@x> stray@x"), ["<a@x>"]);
        assert!(extract_ids("none").is_empty());
        assert!(extract_ids("").is_empty());

        let raw = RawEmail::new("c@x", "a@x", "bot@x")
            .reply_to("b@x", &["a@x", "b@x"])
            .text("hi")
            .build();
        let parsed = parse_email(&raw).unwrap();
        assert_eq!(parsed.message_id, "<c@x>");
        assert_eq!(parsed.in_reply_to.as_deref(), Some("<b@x>"));
        assert_eq!(parsed.references, ["<a@x>", "<b@x>"]);
    }

    #[test]
    fn missing_message_id_is_synthesized_stably() {
        let raw = RawEmail::new("<x@x>", "a@x", "b@x")
            .without_message_id()
            .text("body")
            .build();
        let first = parse_email(&raw).unwrap();
        let second = parse_email(&raw).unwrap();
        assert!(first.message_id.ends_with("@courier.local>"));
        assert_eq!(first.message_id, second.message_id);
        assert_eq!(
            first.headers["Message-ID"].as_str(),
            Some(first.message_id.as_str())
        );
    }

    #[test]
    fn bad_date_falls_back_to_now() {
        let raw = RawEmail::new("<d@x>", "a@x", "b@x")
            .date("not a date")
            .text("x")
            .build();
        let before = Utc::now() - chrono::Duration::seconds(5);
        let parsed = parse_email(&raw).unwrap();
        assert!(parsed.date >= before);
    }

    #[test]
    fn date_is_converted_to_utc() {
        let raw = RawEmail::new("<d@x>", "a@x", "b@x")
            .date("Tue, 14 Nov 2023 23:13:20 +0100")
            .text("x")
            .build();
        let parsed = parse_email(&raw).unwrap();
        assert_eq!(parsed.date.timestamp(), 1_700_000_000);
    }

    #[test]
    fn bodies_and_attachment_are_split() {
        let raw = RawEmail::new("<e@x>", "a@x", "b@x")
            .text("plain body")
            .html("<p>html body</p>")
            .attachment("report.pdf", "application/pdf", "JVBERi0xLjQK")
            .build();
        let parsed = parse_email(&raw).unwrap();
        assert_eq!(parsed.text, "plain body");
        assert_eq!(parsed.html.as_deref(), Some("<p>html body</p>"));
        let media = parsed.attachment.unwrap();
        assert_eq!(media.filename, "report.pdf");
        assert_eq!(media.content_type, "application/pdf");
        assert_eq!(media.data, b"%PDF-1.4\n");
    }

    #[test]
    fn folded_headers_are_unfolded() {
        let raw = b"Message-ID: <f@x>\r\nFrom: a@x\r\nReferences: <r1@x>\r\n <r2@x>\r\nSubject: hi\r\n\r\nbody";
        let parsed = parse_email(raw).unwrap();
        assert_eq!(parsed.references, ["<r1@x>", "<r2@x>"]);
        assert_eq!(parsed.headers["References"].as_str(), Some("<r1@x> <r2@x>"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(parse_email(b""), Err(CourierError::Parse(_))));
        assert!(matches!(
            parse_email(b"just some words\r\n"),
            Err(CourierError::Parse(_))
        ));
    }
}
