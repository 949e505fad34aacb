//! Telegram Bot API notifier (`sendMessage` only).

use super::{Notifier, TARGET_NOTIFIER};
use crate::config::TelegramConfig;
use crate::error::MonitorError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Telegram chat target: a numeric id or a public `@channel` name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatId {
    Id(i64),
    Username(String),
}

impl FromStr for ChatId {
    type Err = MonitorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if let Ok(id) = value.parse::<i64>() {
            return Ok(Self::Id(id));
        }
        if value.len() > 1 && value.starts_with('@') {
            return Ok(Self::Username(value.to_string()));
        }
        Err(MonitorError::Config(format!(
            "chat id must be numeric or start with '@', got {value:?}"
        )))
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Username(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: ChatId,
    parse_mode: Option<String>,
}

impl TelegramNotifier {
    pub fn from_config(cfg: &TelegramConfig) -> Result<Self, MonitorError> {
        if cfg.bot_token.trim().is_empty() {
            return Err(MonitorError::Config("telegram.bot_token is empty".to_string()));
        }
        let chat_id = cfg.chat_id.parse()?;
        Self::with_base_url(
            &cfg.bot_token,
            chat_id,
            &cfg.api_base_url,
            Duration::from_secs(cfg.timeout_secs),
            cfg.parse_mode.clone(),
        )
    }

    /// Client against a custom API base URL (tests, proxies).
    pub fn with_base_url(
        bot_token: &str,
        chat_id: ChatId,
        base_url: &str,
        timeout: Duration,
        parse_mode: Option<String>,
    ) -> Result<Self, MonitorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                base_url.trim_end_matches('/'),
                bot_token.trim()
            ),
            chat_id,
            parse_mode,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, text: &str) -> Result<(), MonitorError> {
        let mut body = match &self.chat_id {
            ChatId::Id(id) => json!({ "chat_id": id, "text": text }),
            ChatId::Username(name) => json!({ "chat_id": name, "text": text }),
        };
        if let Some(mode) = &self.parse_mode {
            body["parse_mode"] = json!(mode);
        }

        debug!(target: TARGET_NOTIFIER, chat_id = %self.chat_id, "sendMessage");

        let resp = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        let raw = resp.text().await?;
        let api_resp = serde_json::from_str::<ApiResponse>(&raw).ok();

        if status.is_success() && api_resp.as_ref().is_some_and(|r| r.ok) {
            return Ok(());
        }

        let description = api_resp
            .and_then(|r| r.description)
            .unwrap_or_else(|| raw.chars().take(200).collect());
        Err(MonitorError::NotifierRejected {
            status: status.as_u16(),
            description: match rejection_hint(status.as_u16()) {
                Some(hint) => format!("{description} ({hint})"),
                None => description,
            },
        })
    }
}

fn rejection_hint(status: u16) -> Option<&'static str> {
    match status {
        400 => Some("invalid chat id or bot is not a member of the chat"),
        401 | 404 => Some("invalid bot token"),
        _ => None,
    }
}
