// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config and message fixtures.

use courier_config::{
    ChannelConfig, EmailChannelConfig, MailServiceConfig, TelegramChannelConfig,
    WhatsAppChannelConfig,
};
use courier_core::Platform;

fn service(host: &str, port: u16) -> MailServiceConfig {
    MailServiceConfig {
        host: host.to_string(),
        port,
        use_ssl: true,
        username: None,
        password: None,
    }
}

/// An active email channel pointing at `imap.test` / `smtp.test`.
pub fn email_channel(id: &str, address: &str) -> ChannelConfig {
    ChannelConfig {
        id: id.to_string(),
        platform: Platform::Email,
        active: true,
        email: Some(EmailChannelConfig {
            email_address: address.to_string(),
            email_password: "secret".to_string(),
            imap: service("imap.test", 993),
            smtp: service("smtp.test", 465),
        }),
        telegram: None,
        whatsapp: None,
    }
}

pub fn telegram_channel(id: &str) -> ChannelConfig {
    ChannelConfig {
        id: id.to_string(),
        platform: Platform::Telegram,
        active: true,
        email: None,
        telegram: Some(TelegramChannelConfig {
            bot_token: "123:test-token".to_string(),
        }),
        whatsapp: None,
    }
}

/// WhatsApp channel whose Graph API base is `api_base` (point it at a wiremock server).
pub fn whatsapp_channel(id: &str, api_base: &str) -> ChannelConfig {
    ChannelConfig {
        id: id.to_string(),
        platform: Platform::WhatsApp,
        active: true,
        email: None,
        telegram: None,
        whatsapp: Some(WhatsAppChannelConfig {
            access_token: "wa-token".to_string(),
            phone_number_id: "1555000".to_string(),
            api_base: api_base.to_string(),
        }),
    }
}

/// A web-chat channel. Needs no platform settings.
pub fn webchat_channel(id: &str) -> ChannelConfig {
    ChannelConfig {
        id: id.to_string(),
        platform: Platform::WebChat,
        active: true,
        email: None,
        telegram: None,
        whatsapp: None,
    }
}

/// Builder for RFC 5322 test messages.
///
/// ```
/// use courier_test_utils::RawEmail;
/// let bytes = RawEmail::new("<a@x>", "alice@x", "bot@x").subject("Hi").text("hello").build();
/// assert!(String::from_utf8(bytes).unwrap().contains("Message-ID: <a@x>"));
/// ```
#[derive(Debug, Clone)]
pub struct RawEmail {
    message_id: Option<String>,
    from: String,
    to: Vec<String>,
    cc: Vec<String>,
    subject: String,
    date: String,
    in_reply_to: Option<String>,
    references: Vec<String>,
    text: Option<String>,
    html: Option<String>,
    attachment: Option<(String, String, String)>,
}

impl RawEmail {
    pub fn new(message_id: &str, from: &str, to: &str) -> Self {
        Self {
            message_id: Some(message_id.to_string()),
            from: from.to_string(),
            to: vec![to.to_string()],
            cc: Vec::new(),
            subject: "Test".to_string(),
            date: "Tue, 14 Nov 2023 22:13:20 +0000".to_string(),
            in_reply_to: None,
            references: Vec::new(),
            text: None,
            html: None,
            attachment: None,
        }
    }

    /// Drop the Message-ID header entirely.
    pub fn without_message_id(mut self) -> Self {
        self.message_id = None;
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    /// RFC 2822 date, e.g. `Tue, 14 Nov 2023 22:13:20 +0000`.
    pub fn date(mut self, date: &str) -> Self {
        self.date = date.to_string();
        self
    }

    pub fn cc(mut self, address: &str) -> Self {
        self.cc.push(address.to_string());
        self
    }

    /// Reply to `parent`, extending its reference chain.
    pub fn reply_to(mut self, parent: &str, references: &[&str]) -> Self {
        self.in_reply_to = Some(parent.to_string());
        self.references = references.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn html(mut self, html: &str) -> Self {
        self.html = Some(html.to_string());
        self
    }

    /// Attach a file; `base64_body` is inserted verbatim.
    pub fn attachment(mut self, filename: &str, content_type: &str, base64_body: &str) -> Self {
        self.attachment = Some((
            filename.to_string(),
            content_type.to_string(),
            base64_body.to_string(),
        ));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = String::new();
        if let Some(id) = &self.message_id {
            out.push_str(&format!("Message-ID: {id}\r\n"));
        }
        out.push_str(&format!("From: {}\r\n", self.from));
        out.push_str(&format!("To: {}\r\n", self.to.join(", ")));
        if !self.cc.is_empty() {
            out.push_str(&format!("Cc: {}\r\n", self.cc.join(", ")));
        }
        out.push_str(&format!("Subject: {}\r\n", self.subject));
        out.push_str(&format!("Date: {}\r\n", self.date));
        if let Some(parent) = &self.in_reply_to {
            out.push_str(&format!("In-Reply-To: {parent}\r\n"));
        }
        if !self.references.is_empty() {
            out.push_str(&format!("References: {}\r\n", self.references.join(" ")));
        }
        out.push_str("MIME-Version: 1.0\r\n");

        let boundary = "courier-test-boundary";
        let mut parts: Vec<String> = Vec::new();
        if let Some(text) = &self.text {
            parts.push(format!(
                "Content-Type: text/plain; charset=utf-8\r\n\r\n{text}\r\n"
            ));
        }
        if let Some(html) = &self.html {
            parts.push(format!("Content-Type: text/html; charset=utf-8\r\n\r\n{html}\r\n"));
        }
        if let Some((name, content_type, body)) = &self.attachment {
            parts.push(format!(
                "Content-Type: {content_type}; name=\"{name}\"\r\n\
                 Content-Disposition: attachment; filename=\"{name}\"\r\n\
                 Content-Transfer-Encoding: base64\r\n\r\n{body}\r\n"
            ));
        }

        match parts.len() {
            0 => out.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n\r\n"),
            1 => {
                out.push_str(&parts[0]);
            }
            _ => {
                out.push_str(&format!(
                    "Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\r\n"
                ));
                for part in &parts {
                    out.push_str(&format!("--{boundary}\r\n{part}"));
                }
                out.push_str(&format!("--{boundary}--\r\n"));
            }
        }
        out.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_headers_are_written() {
        let raw = RawEmail::new("<b@x>", "bob@x", "bot@x")
            .reply_to("<a@x>", &["<root@x>", "<a@x>"])
            .text("hi")
            .html("<p>hi</p>")
            .build();
        let raw = String::from_utf8(raw).unwrap();
        assert!(raw.contains("In-Reply-To: <a@x>\r\n"));
        assert!(raw.contains("References: <root@x> <a@x>\r\n"));
        assert!(raw.contains("multipart/mixed"));
    }

    #[test]
    fn channel_fixtures_are_consistent() {
        assert!(email_channel("support", "bot@x").email_settings().is_ok());
        assert!(telegram_channel("tg").telegram_settings().is_ok());
        assert!(whatsapp_channel("wa", "http://127.0.0.1:1").whatsapp_settings().is_ok());
    }
}
