//! Configuration module
//!
//! Provides structured configuration for the RDP sentinel.
//! Configuration can be loaded from:
//! 1. Default values (hardcoded)
//! 2. config.toml file (optional)
//! 3. Environment variables with RDP__ prefix
//!
//! Example environment variable override:
//! RDP__LOGGING__LEVEL=debug
//! RDP__TELEGRAM__CHAT_ID=-1001234567890

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub telegram: TelegramConfig,
    pub logging: LogConfig,
    #[serde(default)]
    pub labels: LabelConfig,
}

/// Event selection, classification and dedup settings
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Audit log the events must come from ("Security")
    pub log_name: String,
    /// Successful-logon event code (4624)
    pub event_id: u32,
    /// Seconds between dedup eviction passes
    pub eviction_interval_secs: u64,
    /// Maximum age of a dedup entry in seconds
    pub retention_secs: u64,
    /// Entry count above which an eviction pass clears the whole cache
    pub max_entries: usize,
    /// Width of the time bucket in dedup keys, in seconds
    pub key_granularity_secs: u64,
    /// Capacity of the raw record queue between reader and pipeline
    pub queue_capacity: usize,
    /// Accounts never treated as human logins (case-insensitive)
    pub deny_users: Vec<String>,
    /// Treat accounts ending in `$` (computer accounts) as non-human
    pub deny_machine_accounts: bool,
    /// Send a banner message when monitoring starts
    pub notify_on_start: bool,
}

/// Telegram Bot API notifier settings
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// When false alerts are only written to the operational log
    pub enabled: bool,
    pub bot_token: String,
    /// Numeric chat id or `@channelname`
    pub chat_id: String,
    pub api_base_url: String,
    /// Optional Bot API parse mode ("Markdown", "HTML")
    pub parse_mode: Option<String>,
    pub timeout_secs: u64,
    /// Pending alert capacity before new alerts are dropped
    pub queue_capacity: usize,
}

/// Operational logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub directory: PathBuf,
    pub filename: String,
    pub console_output: bool,
    pub file_output: bool,
}

/// Labels recognised in rendered logon messages, per field.
///
/// Matching is case-insensitive and contains-based; adding a locale means
/// appending its labels here.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub subject_section: Vec<String>,
    pub target_section: Vec<String>,
    pub user_name: Vec<String>,
    pub domain: Vec<String>,
    pub logon_id: Vec<String>,
    pub logon_type: Vec<String>,
    pub workstation: Vec<String>,
    pub network_address: Vec<String>,
    pub source_port: Vec<String>,
    pub process_name: Vec<String>,
    pub process_id: Vec<String>,
    pub logon_process: Vec<String>,
    pub authentication_package: Vec<String>,
}

fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            subject_section: labels(&["Subject", "Субъект"]),
            target_section: labels(&["New Logon", "Новый вход"]),
            user_name: labels(&["Account Name", "User Name", "Имя учетной записи", "Пользователь"]),
            domain: labels(&["Account Domain", "Домен учетной записи"]),
            logon_id: labels(&["Logon ID", "Код входа"]),
            logon_type: labels(&["Logon Type", "Тип входа"]),
            workstation: labels(&["Workstation Name", "Имя рабочей станции"]),
            network_address: labels(&[
                "Source Network Address",
                "Network Address",
                "Сетевой адрес источника",
                "Адрес сети источника",
            ]),
            source_port: labels(&["Source Port", "Порт источника"]),
            process_name: labels(&["Process Name", "Имя процесса"]),
            process_id: labels(&["Process ID", "Идентификатор процесса"]),
            logon_process: labels(&["Logon Process", "Процесс входа"]),
            authentication_package: labels(&[
                "Authentication Package",
                "Пакет проверки подлинности",
            ]),
        }
    }
}

/// Upper bound for the retention horizon (ten years)
const MAX_RETENTION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

impl MonitorConfig {
    /// Dedup retention horizon
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retention_secs.min(MAX_RETENTION_SECS) as i64)
    }

    /// Period of the eviction timer, at least one second
    pub fn eviction_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.eviction_interval_secs.max(1))
    }
}

fn default_deny_users() -> Vec<String> {
    labels(&[
        "SYSTEM",
        "СИСТЕМА",
        "LOCAL SERVICE",
        "NETWORK SERVICE",
        "ANONYMOUS LOGON",
    ])
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        let s = config::Config::builder()
            // --- Defaults ---
            // Monitor
            .set_default("monitor.log_name", "Security")?
            .set_default("monitor.event_id", 4624)?
            .set_default("monitor.eviction_interval_secs", 300)?
            .set_default("monitor.retention_secs", 24 * 60 * 60)?
            .set_default("monitor.max_entries", 1000)?
            .set_default("monitor.key_granularity_secs", 60)?
            .set_default("monitor.queue_capacity", 1024)?
            .set_default("monitor.deny_users", default_deny_users())?
            .set_default("monitor.deny_machine_accounts", true)?
            .set_default("monitor.notify_on_start", true)?
            // Telegram
            .set_default("telegram.enabled", false)?
            .set_default("telegram.bot_token", "")?
            .set_default("telegram.chat_id", "")?
            .set_default("telegram.api_base_url", "https://api.telegram.org")?
            .set_default("telegram.timeout_secs", 10)?
            .set_default("telegram.queue_capacity", 128)?
            // Logging
            .set_default("logging.level", "info")?
            .set_default("logging.directory", "logs")?
            .set_default("logging.filename", "rdp-sentinel.log")?
            .set_default("logging.console_output", true)?
            .set_default("logging.file_output", true)?
            // --- Sources ---
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("RDP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig {
                log_name: "Security".to_string(),
                event_id: 4624,
                eviction_interval_secs: 300,
                retention_secs: 24 * 60 * 60,
                max_entries: 1000,
                key_granularity_secs: 60,
                queue_capacity: 1024,
                deny_users: default_deny_users(),
                deny_machine_accounts: true,
                notify_on_start: true,
            },
            telegram: TelegramConfig {
                enabled: false,
                bot_token: String::new(),
                chat_id: String::new(),
                api_base_url: "https://api.telegram.org".to_string(),
                parse_mode: None,
                timeout_secs: 10,
                queue_capacity: 128,
            },
            logging: LogConfig {
                level: "info".to_string(),
                directory: PathBuf::from("logs"),
                filename: "rdp-sentinel.log".to_string(),
                console_output: true,
                file_output: true,
            },
            labels: LabelConfig::default(),
        }
    }
}
