//! Alert delivery.
//!
//! A [`Notifier`] sends one formatted alert. Delivery is at-most-once: no
//! retries happen here, and callers only log failures.

mod dispatch;
mod telegram;

pub use dispatch::{AlertDispatcher, DispatchStats};
pub use telegram::{ChatId, TelegramNotifier};

use crate::config::TelegramConfig;
use crate::error::MonitorError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

const TARGET_NOTIFIER: &str = "notifier";

/// Outbound notification capability
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    async fn send(&self, text: &str) -> Result<(), MonitorError>;
}

/// Writes alerts to the operational log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, text: &str) -> Result<(), MonitorError> {
        info!(target: TARGET_NOTIFIER, alert = %text, "Alert");
        Ok(())
    }
}

/// Telegram when enabled, otherwise the log-only notifier.
pub fn build_notifier(cfg: &TelegramConfig) -> Result<Arc<dyn Notifier>, MonitorError> {
    if cfg.enabled {
        Ok(Arc::new(TelegramNotifier::from_config(cfg)?))
    } else {
        Ok(Arc::new(LogNotifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_disabled_telegram_uses_log_notifier() {
        let cfg = AppConfig::default();
        let notifier = build_notifier(&cfg.telegram).unwrap();
        assert_eq!(notifier.name(), "log");
    }

    #[test]
    fn test_enabled_telegram_requires_valid_settings() {
        let mut cfg = AppConfig::default().telegram;
        cfg.enabled = true;
        cfg.bot_token = "123:abc".to_string();
        cfg.chat_id = "not-a-chat".to_string();
        assert!(matches!(build_notifier(&cfg), Err(MonitorError::Config(_))));

        cfg.chat_id = "-1001234567890".to_string();
        assert_eq!(build_notifier(&cfg).unwrap().name(), "telegram");
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        assert!(LogNotifier.send("hello").await.is_ok());
    }
}
