//! Telegram Bot API notification sink. Delivery failures are reported to the
//! caller exactly once; the alert state machine never retries indefinitely.

use async_trait::async_trait;
use oi_delta::{NotificationSink, NotifyError};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

/// Minimal Bot API envelope: only success and the failure description matter.
#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    description: Option<String>,
}

pub struct Telegram {
    enabled: bool,
    client: Client,
    token: String,
    chat: String,
}

impl Telegram {
    /// Read `TELEGRAM_TOKEN`, `TELEGRAM_CHAT` and `TELEGRAM_DISABLED` from
    /// the environment. Missing credentials disable the sink rather than
    /// failing startup.
    pub fn from_env() -> Self {
        let token = std::env::var("TELEGRAM_TOKEN").unwrap_or_default();
        let chat = std::env::var("TELEGRAM_CHAT").unwrap_or_default();
        let disabled = std::env::var("TELEGRAM_DISABLED")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        let enabled = !disabled && !token.is_empty() && !chat.is_empty();
        if !enabled {
            tracing::info!("telegram notifications disabled");
        }
        Self {
            enabled,
            client: Client::new(),
            token,
            chat,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn method_url(&self, method: &str) -> Result<Url, NotifyError> {
        Url::parse(&format!(
            "https://api.telegram.org/bot{}/{method}",
            self.token
        ))
        .map_err(|err| NotifyError(format!("telegram url build failed: {err}")))
    }

    async fn call(&self, url: Url) -> Result<(), NotifyError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| NotifyError(format!("telegram request failed: {err}")))?;
        let payload: BotApiResponse = response
            .json()
            .await
            .map_err(|err| NotifyError(format!("telegram response parse failed: {err}")))?;
        if !payload.ok {
            return Err(NotifyError(format!(
                "telegram api error: {}",
                payload.description.unwrap_or_else(|| "unknown".to_string())
            )));
        }
        Ok(())
    }

    /// Startup connectivity check (`getMe`). A failure here is logged by the
    /// caller and does not prevent the tracker from running.
    pub async fn check_conn(&self) -> Result<(), NotifyError> {
        if !self.enabled {
            return Ok(());
        }
        self.call(self.method_url("getMe")?).await
    }
}

#[async_trait]
impl NotificationSink for Telegram {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        if !self.enabled {
            return Ok(());
        }
        let mut url = self.method_url("sendMessage")?;
        url.query_pairs_mut()
            .append_pair("chat_id", &self.chat)
            .append_pair("parse_mode", "Markdown")
            .append_pair("text", text);
        self.call(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(token: &str, chat: &str) -> Telegram {
        Telegram {
            enabled: !token.is_empty() && !chat.is_empty(),
            client: Client::new(),
            token: token.to_string(),
            chat: chat.to_string(),
        }
    }

    #[test]
    fn test_send_message_url_encodes_payload() {
        let telegram = sink("123:abc", "42");
        let mut url = telegram.method_url("sendMessage").unwrap();
        url.query_pairs_mut()
            .append_pair("chat_id", &telegram.chat)
            .append_pair("parse_mode", "Markdown")
            .append_pair("text", "*test* - oi: +6,000 in 30s");

        let rendered = url.as_str();
        assert!(rendered.starts_with("https://api.telegram.org/bot123:abc/sendMessage?"));
        assert!(rendered.contains("chat_id=42"));
        // Reserved characters from the message body are percent-encoded.
        assert!(!rendered.contains("+6,000 in"));
    }

    #[tokio::test]
    async fn test_disabled_sink_short_circuits() {
        let telegram = sink("", "");
        assert!(!telegram.enabled());
        assert_eq!(telegram.notify("anything").await, Ok(()));
        assert_eq!(telegram.check_conn().await, Ok(()));
    }

    #[test]
    fn test_api_error_surfaces_description() {
        let body = r#"{"ok":false,"description":"Bad Request: chat not found"}"#;
        let payload: BotApiResponse = serde_json::from_str(body).unwrap();
        assert!(!payload.ok);
        assert_eq!(payload.description.unwrap(), "Bad Request: chat not found");
    }
}
