//! Alert formatting.
//!
//! Renders an [`AuditRecord`] as a notification body or a one-line summary.
//! Formatting accepts any record, including one where every optional field
//! is the sentinel.

use crate::config::MonitorConfig;
use crate::models::{is_available, AuditRecord};
use crate::utils::now_timestamp_string;
use std::fmt::Write;

/// Output style for [`format_alert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStyle {
    /// Multi-line labeled body sent to the notifier
    Notification,
    /// Single-line summary for the operational log
    Console,
    /// Single line of the raw classifier inputs
    Debug,
}

const TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S UTC";
const SHORT_TIME_FORMAT: &str = "%H:%M:%S";

pub fn format_alert(record: &AuditRecord, style: AlertStyle) -> String {
    match style {
        AlertStyle::Notification => notification_body(record),
        AlertStyle::Console => console_line(record),
        AlertStyle::Debug => debug_line(record),
    }
}

fn notification_body(record: &AuditRecord) -> String {
    let mut body = String::from("RDP login detected\n\n");
    // Writing into a String cannot fail.
    let _ = writeln!(body, "Time: {}", record.time.format(TIME_FORMAT));
    let _ = writeln!(body, "User: {}", qualified_user(record));
    let _ = writeln!(body, "IP address: {}", record.source_network_address);
    let _ = writeln!(body, "Workstation: {}", record.workstation_name);
    let _ = writeln!(
        body,
        "Logon type: {} ({})",
        logon_type_description(&record.logon_type),
        record.logon_type
    );
    let _ = writeln!(body, "Logon ID: {}", record.target_logon_id);
    if is_available(&record.process_name) {
        let _ = writeln!(
            body,
            "Process: {} (PID: {})",
            record.process_name, record.process_id
        );
    }
    let _ = writeln!(
        body,
        "Authentication package: {}",
        record.authentication_package_name
    );
    let _ = writeln!(body, "Logon process: {}", record.logon_process_name);
    let _ = write!(body, "Computer: {}", record.computer);
    body
}

fn console_line(record: &AuditRecord) -> String {
    format!(
        "[{}] Event {} - User: {}, IP: {}, Workstation: {}, LogonType: {} ({})",
        record.time.format(SHORT_TIME_FORMAT),
        record.event_id,
        qualified_user(record),
        record.source_network_address,
        record.workstation_name,
        record.logon_type,
        logon_type_description(&record.logon_type)
    )
}

fn debug_line(record: &AuditRecord) -> String {
    format!(
        "[{}] LogonType: '{}', Workstation: '{}', IP: '{}', AuthPackage: '{}', LogonProcess: '{}', Process: '{}'",
        record.time.format(SHORT_TIME_FORMAT),
        record.logon_type,
        record.workstation_name,
        record.source_network_address,
        record.authentication_package_name,
        record.logon_process_name,
        record.process_name
    )
}

fn qualified_user(record: &AuditRecord) -> String {
    format!("{}\\{}", record.target_domain, record.target_user)
}

/// Human-readable name of a Windows logon type code
pub fn logon_type_description(logon_type: &str) -> &'static str {
    match logon_type.trim() {
        "2" => "Interactive",
        "3" => "Network",
        "4" => "Batch",
        "5" => "Service",
        "7" => "Unlock",
        "8" => "NetworkCleartext",
        "9" => "NewCredentials",
        "10" => "RemoteInteractive (RDP)",
        "11" => "CachedInteractive",
        "12" => "CachedRemoteInteractive",
        "13" => "CachedUnlock",
        _ => "Unknown",
    }
}

/// Banner sent once when monitoring starts
pub fn startup_message(monitor: &MonitorConfig) -> String {
    format!(
        "RDP monitoring started at {}\nLog: {}\nEvent ID: {}\nDeduplication: {}s window, {}s retention",
        now_timestamp_string(),
        monitor.log_name,
        monitor.event_id,
        monitor.key_granularity_secs,
        monitor.retention_secs
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use chrono::{TimeZone, Utc};

    fn rdp_record() -> AuditRecord {
        let time = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 12).unwrap();
        AuditRecord {
            target_user: "alice".to_string(),
            target_domain: "CORP".to_string(),
            target_logon_id: "0x1a2b3c".to_string(),
            logon_type: "10".to_string(),
            workstation_name: "DESKTOP-7Q1LM2K".to_string(),
            source_network_address: "203.0.113.5".to_string(),
            authentication_package_name: "Negotiate".to_string(),
            logon_process_name: "User32".to_string(),
            computer: "SRV01".to_string(),
            ..AuditRecord::unavailable(4624, time)
        }
    }

    #[test]
    fn test_notification_body_fields() {
        let body = format_alert(&rdp_record(), AlertStyle::Notification);
        assert!(body.contains("Time: 15.01.2024 14:30:12 UTC"));
        assert!(body.contains("User: CORP\\alice"));
        assert!(body.contains("IP address: 203.0.113.5"));
        assert!(body.contains("Logon type: RemoteInteractive (RDP) (10)"));
        assert!(body.contains("Computer: SRV01"));
        assert!(!body.ends_with('\n'));
    }

    #[test]
    fn test_process_line_only_when_available() {
        let body = format_alert(&rdp_record(), AlertStyle::Notification);
        assert!(!body.contains("Process:"));

        let record = AuditRecord {
            process_name: "C:\\Windows\\System32\\svchost.exe".to_string(),
            process_id: "0x2a4".to_string(),
            ..rdp_record()
        };
        let body = format_alert(&record, AlertStyle::Notification);
        assert!(body.contains("Process: C:\\Windows\\System32\\svchost.exe (PID: 0x2a4)"));
    }

    #[test]
    fn test_all_sentinel_record_formats() {
        let time = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let record = AuditRecord::unavailable(4624, time);
        for style in [AlertStyle::Notification, AlertStyle::Console, AlertStyle::Debug] {
            assert!(!format_alert(&record, style).is_empty());
        }
        let body = format_alert(&record, AlertStyle::Notification);
        assert!(body.contains("Logon type: Unknown (N/A)"));
    }

    #[test]
    fn test_console_line_is_single_line() {
        let line = format_alert(&rdp_record(), AlertStyle::Console);
        assert!(!line.contains('\n'));
        assert_eq!(
            line,
            "[14:30:12] Event 4624 - User: CORP\\alice, IP: 203.0.113.5, \
             Workstation: DESKTOP-7Q1LM2K, LogonType: 10 (RemoteInteractive (RDP))"
        );
    }

    #[test]
    fn test_logon_type_descriptions() {
        assert_eq!(logon_type_description("3"), "Network");
        assert_eq!(logon_type_description(" 10 "), "RemoteInteractive (RDP)");
        assert_eq!(logon_type_description("6"), "Unknown");
    }

    #[test]
    fn test_startup_message_mentions_target() {
        let cfg = AppConfig::default();
        let msg = startup_message(&cfg.monitor);
        assert!(msg.contains("Log: Security"));
        assert!(msg.contains("Event ID: 4624"));
    }
}
