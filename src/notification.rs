//! Change notifications: message composition and delivery transports.

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde_json::json;
use unicode_normalization::UnicodeNormalization as _;
use unicode_normalization::char::is_combining_mark;

use crate::diff::{ADDED_HEADER, REMOVED_HEADER};

pub const SUBJECT_PREFIX: &str = "[pagewatch]";
pub const NO_ADDED_CHANGES: &str = "(no added changes)";
pub const NO_REMOVED_CHANGES: &str = "(no removed changes)";
pub const TEST_BODY: &str = "This is a test notification from pagewatch. Delivery is working.";

const SUMMARY_HEADER: &str = "Summary of changes:";
const NEW_LINK_LABEL: &str = "new link:";
const OLD_LINK_LABEL: &str = "old link:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub monitored_url: String,
    /// Resolved new-item link, or the monitored URL when nothing resolved.
    pub subject_link: String,
    pub previous_link: Option<String>,
    pub diff_text: String,
}

impl ChangeNotification {
    pub fn subject(&self) -> String {
        format!("{SUBJECT_PREFIX} Change detected: {}", self.subject_link)
    }

    pub fn body(&self) -> String {
        let parsed = ParsedDiff::parse(&self.diff_text);

        let mut lines: Vec<String> = vec![
            format!("Monitored page: {}", self.monitored_url),
            String::new(),
            SUMMARY_HEADER.to_owned(),
            ADDED_HEADER.to_owned(),
        ];

        if parsed.added.is_empty() {
            lines.push(NO_ADDED_CHANGES.to_owned());
        } else {
            lines.extend(parsed.added.iter().map(|line| prefix_once(line, '+')));
        }
        if self.subject_link != self.monitored_url {
            lines.push(format!("{NEW_LINK_LABEL} {}", self.subject_link));
        }

        lines.push(REMOVED_HEADER.to_owned());
        if parsed.removed.is_empty() {
            lines.push(NO_REMOVED_CHANGES.to_owned());
        } else {
            lines.extend(parsed.removed.iter().map(|line| prefix_once(line, '-')));
        }
        if let Some(previous) = self.previous_link.as_deref() {
            lines.push(format!("{OLD_LINK_LABEL} {previous}"));
        }

        lines.join("\n")
    }
}

/// A rendered diff split back into its added and removed entries.
#[derive(Debug, Default)]
struct ParsedDiff {
    added: Vec<String>,
    removed: Vec<String>,
}

impl ParsedDiff {
    fn parse(diff_text: &str) -> Self {
        let mut parsed = Self::default();
        let mut unprefixed: Vec<String> = Vec::new();

        for line in diff_text.lines() {
            let line = line.trim();
            if line.is_empty() || is_meta_line(line) {
                continue;
            }
            if line.starts_with('+') {
                parsed.added.push(line.to_owned());
            } else if line.starts_with('-') {
                parsed.removed.push(line.to_owned());
            } else {
                unprefixed.push(line.to_owned());
            }
        }

        // The cosmetic-change sentence and other bare text surface as additions.
        if parsed.added.is_empty() {
            parsed.added = unprefixed;
        }
        parsed
    }
}

fn is_meta_line(line: &str) -> bool {
    let folded = fold(line);
    folded == fold(ADDED_HEADER)
        || folded == fold(REMOVED_HEADER)
        || folded == fold(SUMMARY_HEADER)
        || folded.starts_with(NEW_LINK_LABEL)
        || folded.starts_with(OLD_LINK_LABEL)
}

/// Whitespace-collapsed, lowercased, diacritic-free form used for header matching.
fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn prefix_once(line: &str, prefix: char) -> String {
    if line.starts_with(prefix) {
        line.to_owned()
    } else {
        format!("{prefix} {line}")
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &ChangeNotification) -> anyhow::Result<()>;
    async fn deliver_test(&self) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &ChangeNotification) -> anyhow::Result<()> {
        tracing::info!(
            subject = %notification.subject(),
            body = %notification.body(),
            "change notification"
        );
        Ok(())
    }

    async fn deliver_test(&self) -> anyhow::Result<()> {
        tracing::info!(subject = %test_subject(), body = TEST_BODY, "test notification");
        Ok(())
    }
}

pub fn test_subject() -> String {
    format!("{SUBJECT_PREFIX} Test notification")
}

/// SendGrid v3 mail transport. Sends one message per recipient.
#[derive(Clone)]
pub struct SendGridNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
    recipients: Vec<String>,
}

impl std::fmt::Debug for SendGridNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendGridNotifier")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[redacted]")
            .field("from", &self.from)
            .field("recipients", &self.recipients)
            .finish()
    }
}

impl SendGridNotifier {
    pub fn new(
        base_url: &str,
        api_key: String,
        from: String,
        recipients: Vec<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build sendgrid http client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/v3/mail/send", base_url.trim_end_matches('/')),
            api_key,
            from,
            recipients,
        })
    }

    async fn send_all(&self, subject: &str, body: &str) -> anyhow::Result<()> {
        if self.recipients.is_empty() {
            tracing::warn!(subject, "no notification recipients configured; skipping send");
            return Ok(());
        }
        for recipient in &self.recipients {
            self.send_one(recipient, subject, body)
                .await
                .with_context(|| format!("send notification to {recipient}"))?;
        }
        Ok(())
    }

    async fn send_one(&self, recipient: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let payload = json!({
            "personalizations": [{ "to": [{ "email": recipient }] }],
            "from": { "email": self.from },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }],
            "tracking_settings": {
                "click_tracking": { "enable": false, "enable_text": false }
            }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("sendgrid rejected message ({status}): {text}");
        }
        tracing::info!(recipient, subject, "notification sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for SendGridNotifier {
    async fn deliver(&self, notification: &ChangeNotification) -> anyhow::Result<()> {
        self.send_all(&notification.subject(), &notification.body()).await
    }

    async fn deliver_test(&self) -> anyhow::Result<()> {
        self.send_all(&test_subject(), TEST_BODY).await
    }
}
