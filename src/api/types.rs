//! Backend JSON payloads and derived display helpers.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_AUTHOR, DEFAULT_SUBJECT, MAX_MAILTO_BODY_CHARS};
use crate::thread::ThreadNode;

static RECIPIENT_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*").expect("recipient split pattern is valid"));

static ANGLE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(.+?)>").expect("address pattern is valid"));

static AUTHOR_ADDRESS_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*<.+>").expect("author pattern is valid"));

static SENDER_ADDRESS_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*<.+?>").expect("sender pattern is valid"));

static ARCHIVE_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{1,2}$").expect("month pattern is valid"));

/// A single email as returned by the backend email endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EmailRecord {
    pub mid: String,
    /// Set instead of (or alongside) `mid` in list payloads
    pub id: String,
    pub subject: String,
    pub from: String,
    pub body: String,
    pub epoch: i64,
    pub attachments: Vec<Attachment>,
    pub private: bool,
    pub list_raw: String,
    pub to: Option<String>,
    pub cc: Option<String>,
    #[serde(rename = "message-id")]
    pub message_id: Option<String>,
    #[serde(rename = "in-reply-to")]
    pub in_reply_to: Option<String>,
    pub gravatar: Option<String>,
    /// Human-readable date, as formatted by the backend
    pub date: Option<String>,
}

impl EmailRecord {
    /// `<dev.example.org>` becomes `dev@example.org`.
    pub fn list_name(&self) -> String {
        list_name(&self.list_raw)
    }

    pub fn display_subject(&self) -> &str {
        if self.subject.trim().is_empty() {
            DEFAULT_SUBJECT
        } else {
            &self.subject
        }
    }

    /// Address part of the `From:` header.
    pub fn author_address(&self) -> Option<&str> {
        ANGLE_ADDRESS
            .captures(&self.from)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Display name of the sender, falling back to the address.
    pub fn author_name(&self) -> String {
        let name = AUTHOR_ADDRESS_PART.replace(&self.from, "").replace('"', "");
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
        match self.author_address() {
            Some(address) => address.to_string(),
            None => DEFAULT_AUTHOR.to_string(),
        }
    }

    /// Other recipients from `To:` and `Cc:`, excluding the list itself.
    pub fn recipients(&self) -> Vec<String> {
        let list = self.list_name();
        [self.to.as_deref(), self.cc.as_deref()]
            .into_iter()
            .flatten()
            .flat_map(|header| RECIPIENT_SPLIT.split(header))
            .map(|entry| {
                ANGLE_ADDRESS
                    .captures(entry)
                    .and_then(|caps| caps.get(1))
                    .map_or(entry, |m| m.as_str())
                    .trim()
                    .to_string()
            })
            .filter(|address| address.len() > 5 && *address != list)
            .collect()
    }

    /// The identifier list payloads refer to this email by.
    pub fn key(&self) -> &str {
        if self.id.is_empty() {
            &self.mid
        } else {
            &self.id
        }
    }

    /// Body quoted for a reply, under an "On ... wrote:" attribution line.
    pub fn quoted_reply(&self) -> String {
        let date = self.date.clone().unwrap_or_else(|| {
            DateTime::<Utc>::from_timestamp(self.epoch, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default()
        });
        let sender = SENDER_ADDRESS_PART.replace(&self.from, "");
        let quoted: Vec<String> = self
            .body
            .split('\n')
            .map(|line| format!("> {}", line.strip_suffix('\r').unwrap_or(line)))
            .collect();
        format!("\n\nOn {} {} wrote:\n{}", date, sender, quoted.join("\n"))
    }

    /// `mailto:` link that replies to this email on its list.
    ///
    /// The quoted body is cut to [`MAX_MAILTO_BODY_CHARS`] characters; longer
    /// links break some mail clients.
    pub fn reply_mailto(&self) -> String {
        let mut body = self.quoted_reply();
        if body.chars().count() > MAX_MAILTO_BODY_CHARS {
            body = body.chars().take(MAX_MAILTO_BODY_CHARS).collect();
            body.push_str("\n[message truncated...]");
        }
        format!(
            "mailto:{}?subject={}&In-Reply-To={}&body={}",
            self.list_name(),
            urlencoding::encode(&format!("RE: {}", self.subject)),
            urlencoding::encode(self.message_id.as_deref().unwrap_or_default()),
            urlencoding::encode(&body)
        )
    }

    /// True when this email replies to something outside the fetched thread.
    pub fn is_reply(&self) -> bool {
        self.in_reply_to
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty())
    }
}

pub fn list_name(list_raw: &str) -> String {
    list_raw.replace(['<', '>'], "").replacen('.', "@", 1)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Attachment {
    pub filename: String,
    pub hash: String,
    pub size: u64,
    pub content_type: Option<String>,
}

impl Attachment {
    /// `N bytes`, `N KB` or `N.NN MB`.
    pub fn display_size(&self) -> String {
        format_size(self.size)
    }
}

pub fn format_size(size: u64) -> String {
    if size >= 1024 * 1024 {
        let hundredths = u128::from(size) * 100 / (1024 * 1024);
        let (whole, frac) = (hundredths / 100, hundredths % 100);
        match frac {
            0 => format!("{} MB", whole),
            f if f % 10 == 0 => format!("{}.{} MB", whole, f / 10),
            f => format!("{}.{:02} MB", whole, f),
        }
    } else if size >= 1024 {
        format!("{} KB", size / 1024)
    } else {
        format!("{} bytes", size)
    }
}

/// Payload of the thread endpoint: the reply tree plus every email in it.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadResponse {
    pub thread: ThreadNode,
    #[serde(default)]
    pub emails: Vec<EmailRecord>,
}

/// Which list (and optionally which month) to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub list: String,
    pub domain: String,
    /// Archive month as `YYYY-M`; the backend's default range when unset
    pub month: Option<String>,
}

impl ListQuery {
    /// Parse `dev@example.org`, rejecting addresses without both parts.
    pub fn parse(address: &str, month: Option<&str>) -> Option<Self> {
        let (list, domain) = address.trim().split_once('@')?;
        if list.is_empty() || domain.is_empty() {
            return None;
        }
        let month = match month.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) if ARCHIVE_MONTH.is_match(m) => Some(m.to_string()),
            Some(_) => return None,
            None => None,
        };
        Some(Self {
            list: list.to_string(),
            domain: domain.to_string(),
            month,
        })
    }

    pub fn address(&self) -> String {
        format!("{}@{}", self.list, self.domain)
    }

    /// True for `*` queries spanning several lists.
    pub fn is_wildcard(&self) -> bool {
        self.list.contains('*') || self.domain == "*"
    }
}

/// Payload of the list statistics endpoint: thread skeletons plus email summaries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub thread_struct: Vec<ThreadNode>,
    #[serde(default)]
    pub emails: Vec<EmailRecord>,
}

/// Error envelope the backend returns with a 2xx status.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub okay: Option<bool>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ErrorEnvelope {
    pub(crate) fn into_message(self) -> Option<String> {
        if let Some(error) = self.error {
            return Some(error);
        }
        if self.okay == Some(false) {
            return Some(
                self.message
                    .unwrap_or_else(|| "The backend reported an error".to_string()),
            );
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(json: &str) -> EmailRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_missing_fields_default() {
        let record = email(r#"{"mid": "abc"}"#);
        assert_eq!(record.mid, "abc");
        assert!(record.attachments.is_empty());
        assert_eq!(record.display_subject(), "(No subject)");
        assert!(!record.is_reply());
    }

    #[test]
    fn test_hyphenated_headers() {
        let record = email(r#"{"mid": "a", "message-id": "<x@y>", "in-reply-to": "<p@y>"}"#);
        assert_eq!(record.message_id.as_deref(), Some("<x@y>"));
        assert!(record.is_reply());
    }

    #[test]
    fn test_list_name() {
        assert_eq!(list_name("<dev.ponymail.apache.org>"), "dev@ponymail.apache.org");
        assert_eq!(list_name(""), "");
    }

    #[test]
    fn test_author_name() {
        let record = email(r#"{"from": "\"Jane Doe\" <jane@example.org>"}"#);
        assert_eq!(record.author_name(), "Jane Doe");
        assert_eq!(record.author_address(), Some("jane@example.org"));

        let bare = email(r#"{"from": "<jane@example.org>"}"#);
        assert_eq!(bare.author_name(), "jane@example.org");

        let empty = email(r#"{}"#);
        assert_eq!(empty.author_name(), "(No author?)");
    }

    #[test]
    fn test_recipients_exclude_list() {
        let record = email(
            r#"{
                "list_raw": "<dev.example.org>",
                "to": "dev@example.org, Bob <bob@example.org>",
                "cc": "a@b, carol@example.org"
            }"#,
        );
        assert_eq!(
            record.recipients(),
            vec!["bob@example.org".to_string(), "carol@example.org".to_string()]
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_size(1572864), "1.5 MB");
    }

    #[test]
    fn test_format_size_huge() {
        assert_eq!(format_size(u64::MAX), "17592186044415.99 MB");
    }

    #[test]
    fn test_reply_mailto() {
        let record = email(
            r#"{
                "mid": "m1",
                "subject": "Release plan",
                "from": "Ann Example <ann@example.org>",
                "list_raw": "<dev.example.org>",
                "message-id": "<m1@example.org>",
                "date": "2020-09-13 12:26",
                "body": "Ship it?\r\nYes"
            }"#,
        );
        assert_eq!(
            record.quoted_reply(),
            "\n\nOn 2020-09-13 12:26 Ann Example wrote:\n> Ship it?\n> Yes"
        );
        assert_eq!(
            record.reply_mailto(),
            "mailto:dev@example.org?subject=RE%3A%20Release%20plan\
             &In-Reply-To=%3Cm1%40example.org%3E\
             &body=%0A%0AOn%202020-09-13%2012%3A26%20Ann%20Example%20wrote%3A%0A%3E%20Ship%20it%3F%0A%3E%20Yes"
        );
    }

    #[test]
    fn test_reply_mailto_truncates_long_bodies() {
        let record = EmailRecord {
            body: "x".repeat(20_000),
            epoch: 0,
            ..Default::default()
        };
        let link = record.reply_mailto();
        let body = link.split("&body=").nth(1).unwrap();
        let decoded = urlencoding::decode(body).unwrap();
        assert!(decoded.ends_with("\n[message truncated...]"));
        assert_eq!(
            decoded.chars().count(),
            MAX_MAILTO_BODY_CHARS + "\n[message truncated...]".len()
        );
        assert!(decoded.starts_with("\n\nOn 1970-01-01 00:00  wrote:\n> x"));
    }

    #[test]
    fn test_list_query() {
        let query = ListQuery::parse("dev@example.org", Some("2024-3")).unwrap();
        assert_eq!(query.list, "dev");
        assert_eq!(query.domain, "example.org");
        assert_eq!(query.month.as_deref(), Some("2024-3"));
        assert_eq!(query.address(), "dev@example.org");
        assert!(!query.is_wildcard());

        assert!(ListQuery::parse("*@example.org", None).unwrap().is_wildcard());
        assert_eq!(ListQuery::parse("dev@example.org", Some("")).unwrap().month, None);
        assert!(ListQuery::parse("dev", None).is_none());
        assert!(ListQuery::parse("@example.org", None).is_none());
        assert!(ListQuery::parse("dev@example.org", Some("March")).is_none());
    }

    #[test]
    fn test_key_prefers_id() {
        assert_eq!(email(r#"{"mid": "m", "id": "i"}"#).key(), "i");
        assert_eq!(email(r#"{"mid": "m"}"#).key(), "m");
    }

    #[test]
    fn test_error_envelope() {
        let okay: ErrorEnvelope =
            serde_json::from_str(r#"{"okay": false, "message": "No such list"}"#).unwrap();
        assert_eq!(okay.into_message().as_deref(), Some("No such list"));

        let error: ErrorEnvelope = serde_json::from_str(r#"{"error": "denied"}"#).unwrap();
        assert_eq!(error.into_message().as_deref(), Some("denied"));

        let fine: ErrorEnvelope = serde_json::from_str(r#"{"mid": "x"}"#).unwrap();
        assert_eq!(fine.into_message(), None);
    }
}
