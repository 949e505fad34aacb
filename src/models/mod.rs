//! Data models module
//!
//! Defines the raw audit record shapes handed to the monitor, the normalized
//! `AuditRecord`, and the classification/outcome types the pipeline reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Event code given to structured records whose code is missing or unreadable.
/// No Windows event uses it, so such records never match the monitored target.
pub const UNKNOWN_EVENT_ID: u32 = 0;

/// Marker stored in every field the source did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

/// Returns true when a normalized field carries a real value.
pub fn is_available(value: &str) -> bool {
    value != NOT_AVAILABLE
}

/// Normalize a raw field value to the single "not available" sentinel.
///
/// Windows writes `-` for empty logon fields; that, empty and whitespace-only
/// values all collapse to [`NOT_AVAILABLE`].
pub fn normalize_value(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() && v != "-" => v.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Raw audit record as delivered by the audit-log subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawRecord {
    /// Event with positional insertion strings (WMI `Win32_NTLogEvent` shape)
    Structured(StructuredRecord),
    /// Event rendered as a multi-line human-readable message
    FreeText(FreeTextRecord),
}

/// Structured record: scalar header plus ordered insertion strings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredRecord {
    #[serde(default, alias = "EventCode", deserialize_with = "de_opt_u32")]
    pub event_code: Option<u32>,

    #[serde(default, alias = "Logfile", alias = "LogFile")]
    pub log_file: Option<String>,

    #[serde(default, alias = "SourceName")]
    pub source_name: Option<String>,

    /// RFC 3339, WMI CIM datetime or Unix seconds
    #[serde(default, alias = "TimeGenerated", deserialize_with = "de_opt_string")]
    pub time_generated: Option<String>,

    #[serde(default, alias = "ComputerName")]
    pub computer_name: Option<String>,

    /// Numeric slots keep their text, other non-string slots read as `None`
    #[serde(default, alias = "InsertionStrings", deserialize_with = "de_opt_strings")]
    pub insertion_strings: Option<Vec<Option<String>>>,
}

/// Free-text record: rendered message plus generation metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FreeTextRecord {
    #[serde(default, alias = "Message")]
    pub message: String,

    #[serde(default, alias = "TimeGenerated", deserialize_with = "de_opt_string")]
    pub time_generated: Option<String>,

    #[serde(default, alias = "MachineName")]
    pub computer_name: Option<String>,

    #[serde(default, alias = "EventCode", deserialize_with = "de_opt_u32")]
    pub event_code: Option<u32>,

    #[serde(default, alias = "Logfile", alias = "LogFile")]
    pub log_file: Option<String>,

    #[serde(default, alias = "SourceName")]
    pub source_name: Option<String>,
}

/// Normalized successful-logon event.
///
/// Every string field holds either a trimmed value or [`NOT_AVAILABLE`].
/// Built once by the normalizer and only ever passed on by shared reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub event_id: u32,
    pub time: DateTime<Utc>,
    pub log_name: String,
    pub source: String,
    pub computer: String,
    pub subject_user: String,
    pub subject_domain: String,
    pub target_user: String,
    pub target_domain: String,
    pub target_logon_id: String,
    pub logon_type: String,
    pub workstation_name: String,
    pub source_network_address: String,
    pub source_port: String,
    pub process_name: String,
    pub process_id: String,
    pub logon_process_name: String,
    pub authentication_package_name: String,
}

impl AuditRecord {
    /// A record where every optional field is the sentinel.
    pub fn unavailable(event_id: u32, time: DateTime<Utc>) -> Self {
        let na = || NOT_AVAILABLE.to_string();
        Self {
            event_id,
            time,
            log_name: na(),
            source: na(),
            computer: na(),
            subject_user: na(),
            subject_domain: na(),
            target_user: na(),
            target_domain: na(),
            target_logon_id: na(),
            logon_type: na(),
            workstation_name: na(),
            source_network_address: na(),
            source_port: na(),
            process_name: na(),
            process_id: na(),
            logon_process_name: na(),
            authentication_package_name: na(),
        }
    }
}

/// Three-way classifier verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Classification {
    /// System/service account or no usable target user
    NotAHumanLogin,
    /// Human account, but no remote-desktop evidence
    HumanButNotRemote,
    /// Remote-desktop login worth alerting on
    RemoteLogin,
}

/// Why the pipeline stopped processing a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DropReason {
    Malformed,
    /// Log name or event code differs from the monitored target
    Filtered,
    NotHuman,
    NotRemote,
    Duplicate,
    /// A panic escaped one event's pipeline
    Fault,
}

impl DropReason {
    /// Stable tag used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::Malformed => "malformed",
            DropReason::Filtered => "filtered",
            DropReason::NotHuman => "not-human",
            DropReason::NotRemote => "not-remote",
            DropReason::Duplicate => "duplicate",
            DropReason::Fault => "fault",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of one record in the monitor pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Alerted,
    Dropped(DropReason),
}

fn de_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => Ok(n.as_u64().and_then(|v| u32::try_from(v).ok())),
        Some(serde_json::Value::String(s)) => Ok(s.trim().parse().ok()),
        Some(_) => Ok(None),
    }
}

fn de_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Ok(None),
    }
}

/// Insertion list where each slot degrades on its own: numbers keep their
/// text form, anything else that is not a string becomes `None`.
fn de_opt_strings<'de, D>(deserializer: D) -> Result<Option<Vec<Option<String>>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Array(values)) => Ok(Some(
            values
                .into_iter()
                .map(|value| match value {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        )),
        _ => Ok(None),
    }
}
