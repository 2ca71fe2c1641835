//! # notify — fire-and-forget operator notifications
//!
//! `Notifier::notify` never blocks and never fails: messages go onto an
//! unbounded channel and a background task delivers them to Telegram (HTML
//! parse mode). Delivery errors are only logged.

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::TelegramConfig;

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<String>,
}

impl Notifier {
    /// Starts the delivery task. Without a token/chat id, messages are only
    /// logged.
    pub fn spawn(config: &TelegramConfig, client: reqwest::Client) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = match (&config.token, &config.chat_id) {
            (Some(token), Some(chat_id)) => Sink::Telegram {
                client,
                url: format!("https://api.telegram.org/bot{token}/sendMessage"),
                chat_id: chat_id.clone(),
            },
            _ => {
                warn!("TELEGRAM_TOKEN / TELEGRAM_CHAT_ID not set — notifications are log-only");
                Sink::LogOnly
            }
        };
        tokio::spawn(deliver(rx, sink));
        Self { tx }
    }

    /// A notifier whose messages land on the returned receiver.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn notify(&self, message: impl Into<String>) {
        if self.tx.send(message.into()).is_err() {
            debug!("notifier closed — message dropped");
        }
    }
}

enum Sink {
    Telegram { client: reqwest::Client, url: String, chat_id: String },
    LogOnly,
}

async fn deliver(mut rx: mpsc::UnboundedReceiver<String>, sink: Sink) {
    while let Some(message) = rx.recv().await {
        info!(target: "martingrid::notify", "{message}");

        let Sink::Telegram { client, url, chat_id } = &sink else {
            continue;
        };

        if let Err(reason) = send_telegram(client, url, chat_id, &message).await {
            warn!(%reason, "Telegram send failed");
        }
    }
}

/// Posts one message. The error text never includes the request URL, which
/// carries the bot token.
async fn send_telegram(
    client: &reqwest::Client,
    url: &str,
    chat_id: &str,
    message: &str,
) -> Result<(), String> {
    let resp = client
        .post(url)
        .json(&json!({
            "chat_id":    chat_id,
            "text":       message,
            "parse_mode": "HTML",
        }))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .map_err(|e| e.without_url().to_string())?;

    if resp.status().is_success() {
        Ok(())
    } else {
        Err(format!("HTTP {}", resp.status()))
    }
}

/// Escapes text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detached_notifier_forwards_messages() {
        let (notifier, mut rx) = Notifier::detached();
        notifier.notify("hello");
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[test]
    fn notify_after_receiver_dropped_is_silent() {
        let (notifier, rx) = Notifier::detached();
        drop(rx);
        notifier.notify("nobody listening");
    }

    #[tokio::test]
    async fn send_failure_does_not_leak_token() {
        let client = reqwest::Client::new();
        let err = send_telegram(&client, "http://127.0.0.1:9/botSECRET_TOKEN/sendMessage", "1", "hi")
            .await
            .unwrap_err();
        assert!(!err.contains("SECRET_TOKEN"), "{err}");
    }

    #[test]
    fn escapes_html_specials() {
        assert_eq!(escape_html("a < b & c > d"), "a &lt; b &amp; c &gt; d");
    }
}
