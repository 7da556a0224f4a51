// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTML helpers for stored email bodies.
//!
//! Plain-text extraction, `cid:` and `data:` image rewriting, and quoted
//! reply detection. All functions are pure string transforms.

use std::collections::HashMap;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").unwrap()
});
static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>|</li\s*>|</tr\s*>|</h[1-6]\s*>")
        .unwrap()
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n+").unwrap());
static CID_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)src\s*=\s*["']cid:([^"']+)["']"#).unwrap()
});
static DATA_URI_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)src\s*=\s*["'](data:(image/[a-z0-9.+-]+);base64,([a-z0-9+/=\s]+))["']"#)
        .unwrap()
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Plain text from HTML. Uses `html2text`; falls back to tag stripping.
pub fn html_to_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), 10_000) {
        Ok(text) => collapse_blank_lines(text.trim()),
        Err(_) => strip_tags(html),
    }
}

/// Regex-based tag stripper for markup `html2text` rejects.
pub fn strip_tags(html: &str) -> String {
    let without_code = SCRIPT_STYLE.replace_all(html, "");
    let with_breaks = BLOCK_BREAK.replace_all(&without_code, "\n");
    let text = TAG.replace_all(&with_breaks, "");
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let lines: Vec<&str> = decoded.lines().map(str::trim).collect();
    collapse_blank_lines(lines.join("\n").trim())
}

fn collapse_blank_lines(text: &str) -> String {
    BLANK_LINES.replace_all(text, "\n\n").into_owned()
}

/// An image embedded in a MIME part and referenced by `Content-ID`.
#[derive(Debug, Clone)]
pub struct CidImage {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Replace `src="cid:..."` references with `data:` URIs for known content ids.
///
/// Content ids are compared without angle brackets. Unknown ids are left alone.
pub fn inline_cid_images(html: &str, images: &HashMap<String, CidImage>) -> String {
    if images.is_empty() {
        return html.to_string();
    }
    CID_SRC
        .replace_all(html, |caps: &regex::Captures<'_>| {
            let cid = caps[1].trim_matches(|c| c == '<' || c == '>');
            match images.get(cid) {
                Some(image) => format!(
                    "src=\"data:{};base64,{}\"",
                    image.content_type,
                    STANDARD.encode(&image.data)
                ),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// A `data:` image found in HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUriImage {
    /// The full `data:...` value as it appears in the document.
    pub uri: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// All base64 `data:` images in `html`, in document order, without duplicates.
/// Payloads that fail to decode are skipped.
pub fn find_data_uri_images(html: &str) -> Vec<DataUriImage> {
    let mut found: Vec<DataUriImage> = Vec::new();
    for caps in DATA_URI_SRC.captures_iter(html) {
        let uri = caps[1].to_string();
        if found.iter().any(|f| f.uri == uri) {
            continue;
        }
        let payload: String = caps[3].chars().filter(|c| !c.is_whitespace()).collect();
        if let Ok(data) = STANDARD.decode(payload) {
            found.push(DataUriImage {
                uri,
                content_type: caps[2].to_ascii_lowercase(),
                data,
            });
        }
    }
    found
}

/// Swap each `data:` URI for its replacement link.
pub fn replace_data_uris(html: &str, replacements: &[(String, String)]) -> String {
    let mut out = html.to_string();
    for (uri, link) in replacements {
        out = out.replace(uri.as_str(), link);
    }
    out
}

const QUOTE_MARKERS: &[&str] = &[
    "<div class=\"gmail_quote",
    "<blockquote type=\"cite\"",
    "<div class=\"moz-cite-prefix\"",
    "<div id=\"appendonsend\"",
    "<div id=\"divRplyFwdMsg\"",
    "<blockquote",
];

/// Cut the quoted tail of a reply if it repeats one of `prior_texts`.
///
/// Returns `None` when no quote marker is found, the quote does not echo a
/// prior message, or cutting would leave nothing visible.
pub fn trim_quoted_reply(html: &str, prior_texts: &[String]) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let cut = QUOTE_MARKERS
        .iter()
        .filter_map(|marker| lower.find(&marker.to_ascii_lowercase()))
        .min()?;

    let quoted = normalize(&strip_tags(&html[cut..]));
    let echoes_prior = prior_texts.iter().any(|prior| {
        let prior = normalize(prior);
        let head: String = prior.chars().take(120).collect();
        !head.is_empty() && quoted.contains(&head)
    });
    if !echoes_prior {
        return None;
    }

    let kept = html[..cut].trim_end();
    if strip_tags(kept).trim().is_empty() {
        return None;
    }
    Some(kept.to_string())
}

fn normalize(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_keeps_line_structure() {
        let text = strip_tags("<style>p{}</style><p>Hello&nbsp;there</p><p>Second &amp; last</p>");
        assert_eq!(text, "Hello there\nSecond & last");
    }

    #[test]
    fn html_to_text_extracts_words() {
        let text = html_to_text("<html><body><h1>Title</h1><p>Some <b>bold</b> text</p></body></html>");
        assert!(text.contains("Title"));
        assert!(text.contains("bold"));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn cid_references_become_data_uris() {
        let mut images = HashMap::new();
        images.insert(
            "logo@x".to_string(),
            CidImage {
                content_type: "image/png".into(),
                data: vec![1, 2, 3],
            },
        );
        let html = r#"<img src="cid:logo@x"><img src="cid:other@x">"#;
        let out = inline_cid_images(html, &images);
        assert!(out.contains(r#"src="data:image/png;base64,AQID""#));
        assert!(out.contains("cid:other@x"));
    }

    #[test]
    fn data_uris_are_found_once_and_replaced() {
        let html = r#"<img src="data:image/png;base64,AQID"><img src='data:image/png;base64,AQID'>"#;
        let found = find_data_uri_images(html);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data, vec![1, 2, 3]);
        let out = replace_data_uris(html, &[(found[0].uri.clone(), "/i/abc".into())]);
        assert_eq!(out, r#"<img src="/i/abc"><img src='/i/abc'>"#);
    }

    #[test]
    fn quoted_tail_is_trimmed_only_when_it_echoes_history() {
        let html = "<div>Thanks, that works.</div>\
                    <div class=\"gmail_quote\">On Monday Bob wrote:<blockquote>Try restarting the router first.</blockquote></div>";
        let prior = vec!["Try restarting the router first.".to_string()];
        assert_eq!(
            trim_quoted_reply(html, &prior).as_deref(),
            Some("<div>Thanks, that works.</div>")
        );
        assert!(trim_quoted_reply(html, &["Unrelated".to_string()]).is_none());
        assert!(trim_quoted_reply("<p>No quote here</p>", &prior).is_none());
    }

    #[test]
    fn quote_only_message_is_kept() {
        let html = "<blockquote>Try restarting the router first.</blockquote>";
        let prior = vec!["Try restarting the router first.".to_string()];
        assert!(trim_quoted_reply(html, &prior).is_none());
    }
}
