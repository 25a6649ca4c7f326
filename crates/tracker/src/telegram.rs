//! Thin client for the Telegram Bot API methods the tracker uses:
//! sendMessage, getUpdates (long poll) and setMyCommands.
//!
//! The bot token is part of every method URL, so request URLs are
//! never logged; log lines carry the method name only.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    pub message: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub chat: TgChat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

pub struct TelegramClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl TelegramClient {
    /// `poll_timeout` is the getUpdates long-poll window; the HTTP
    /// timeout must outlast it or every idle poll errors out.
    pub fn new(
        api_url: &str,
        token: &str,
        poll_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(poll_timeout + request_timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// Send a Markdown message, optionally with one inline URL button.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        button: Option<(&str, &str)>,
    ) -> Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });
        if let Some((label, url)) = button {
            body["reply_markup"] = json!({
                "inline_keyboard": [[{"text": label, "url": url}]],
            });
        }
        self.call::<serde_json::Value>("sendMessage", &body).await?;
        Ok(())
    }

    /// Long-poll for updates past `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<TgUpdate>> {
        let body = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        let updates = self.call::<Vec<TgUpdate>>("getUpdates", &body).await?;
        Ok(updates.unwrap_or_default())
    }

    /// Register the command menu shown in the Telegram client.
    pub async fn set_my_commands(&self, commands: &[(&str, &str)]) -> Result<()> {
        let listed: Vec<_> = commands
            .iter()
            .map(|(cmd, desc)| json!({"command": cmd, "description": desc}))
            .collect();
        let body = json!({ "commands": listed });
        self.call::<bool>("setMyCommands", &body).await?;
        Ok(())
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &'static str,
        body: &serde_json::Value,
    ) -> Result<Option<T>> {
        debug!(method, "telegram call");

        let resp = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .with_context(|| format!("telegram {method} request failed"))?;

        let status = resp.status();
        let envelope: ApiEnvelope<T> = resp
            .json()
            .await
            .with_context(|| format!("telegram {method} returned undecodable body"))?;

        if !envelope.ok {
            let description = envelope.description.as_deref().unwrap_or("no description");
            bail!("telegram {method} failed (HTTP {status}): {description}");
        }
        Ok(envelope.result)
    }
}
