//! Event normalizer module
//!
//! Turns either raw record shape (positional insertion strings or a rendered
//! message) into an [`AuditRecord`]. Extraction is deliberately permissive:
//! anything missing or unreadable degrades to the sentinel, and only a record
//! with no payload at all is rejected.

mod field_maps;
mod message;

pub use field_maps::{
    logon_success_offsets, LabelTable, LogonField, MessageField, OffsetMapping, Section,
};
pub use message::{first_ipv4, parse_message, MessageFields};

use crate::config::LabelConfig;
use crate::error::MonitorError;
use crate::models::{
    normalize_value, AuditRecord, FreeTextRecord, RawRecord, StructuredRecord, UNKNOWN_EVENT_ID,
};
use crate::utils::parse_event_time;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Target name for normalizer logs
const TARGET_NORMALIZER: &str = "normalizer";

/// Converts raw audit records into normalized [`AuditRecord`]s
pub struct Normalizer {
    labels: LabelTable,
    default_event_id: u32,
}

impl Normalizer {
    /// `default_event_id` is assigned to rendered messages that carry no code.
    /// Structured records without a readable code get [`UNKNOWN_EVENT_ID`].
    pub fn new(labels: &LabelConfig, default_event_id: u32) -> Self {
        Self {
            labels: LabelTable::new(labels),
            default_event_id,
        }
    }

    /// Normalize one raw record. `received_at` stands in for a missing or
    /// unparseable generation time.
    pub fn normalize(
        &self,
        raw: &RawRecord,
        received_at: DateTime<Utc>,
    ) -> Result<AuditRecord, MonitorError> {
        match raw {
            RawRecord::Structured(record) => self.normalize_structured(record, received_at),
            RawRecord::FreeText(record) => self.normalize_free_text(record, received_at),
        }
    }

    fn normalize_structured(
        &self,
        raw: &StructuredRecord,
        received_at: DateTime<Utc>,
    ) -> Result<AuditRecord, MonitorError> {
        if raw.event_code.is_none() && raw.insertion_strings.is_none() {
            return Err(MonitorError::malformed(
                "structured record has neither event code nor insertion strings",
            ));
        }

        let time = resolve_time(raw.time_generated.as_deref(), received_at);
        let strings = raw.insertion_strings.as_deref().unwrap_or_default();
        let offsets = logon_success_offsets();

        // Short lists are not trusted at all: a truncated layout would shift
        // every slot after the cut.
        let usable = strings.len() >= offsets.min_len();
        if !usable {
            debug!(
                target: TARGET_NORMALIZER,
                len = strings.len(),
                required = offsets.min_len(),
                "Insertion strings too short, fields left unavailable"
            );
        }
        let field = |f: LogonField| {
            let value = if usable {
                offsets
                    .offset(f)
                    .and_then(|i| strings.get(i))
                    .and_then(|v| v.as_deref())
            } else {
                None
            };
            normalize_value(value)
        };

        Ok(AuditRecord {
            event_id: raw.event_code.unwrap_or(UNKNOWN_EVENT_ID),
            time,
            log_name: normalize_value(raw.log_file.as_deref()),
            source: normalize_value(raw.source_name.as_deref()),
            computer: normalize_value(raw.computer_name.as_deref()),
            subject_user: field(LogonField::SubjectUser),
            subject_domain: field(LogonField::SubjectDomain),
            target_user: field(LogonField::TargetUser),
            target_domain: field(LogonField::TargetDomain),
            target_logon_id: field(LogonField::TargetLogonId),
            logon_type: field(LogonField::LogonType),
            workstation_name: field(LogonField::WorkstationName),
            source_network_address: field(LogonField::SourceNetworkAddress),
            source_port: field(LogonField::SourcePort),
            process_name: field(LogonField::ProcessName),
            process_id: field(LogonField::ProcessId),
            logon_process_name: field(LogonField::LogonProcessName),
            authentication_package_name: field(LogonField::AuthenticationPackageName),
        })
    }

    fn normalize_free_text(
        &self,
        raw: &FreeTextRecord,
        received_at: DateTime<Utc>,
    ) -> Result<AuditRecord, MonitorError> {
        if raw.message.trim().is_empty() {
            return Err(MonitorError::malformed("free-text record has an empty message"));
        }

        let time = resolve_time(raw.time_generated.as_deref(), received_at);
        let fields = parse_message(&raw.message, &self.labels);

        Ok(AuditRecord {
            event_id: raw.event_code.unwrap_or(self.default_event_id),
            time,
            log_name: normalize_value(raw.log_file.as_deref()),
            source: normalize_value(raw.source_name.as_deref()),
            computer: normalize_value(raw.computer_name.as_deref()),
            subject_user: normalize_value(fields.subject_user.as_deref()),
            subject_domain: normalize_value(fields.subject_domain.as_deref()),
            target_user: normalize_value(fields.target_user.as_deref()),
            target_domain: normalize_value(fields.target_domain.as_deref()),
            target_logon_id: normalize_value(fields.target_logon_id.as_deref()),
            logon_type: normalize_value(fields.logon_type.as_deref()),
            workstation_name: normalize_value(fields.workstation_name.as_deref()),
            source_network_address: normalize_value(fields.source_network_address.as_deref()),
            source_port: normalize_value(fields.source_port.as_deref()),
            process_name: normalize_value(fields.process_name.as_deref()),
            process_id: normalize_value(fields.process_id.as_deref()),
            logon_process_name: normalize_value(fields.logon_process_name.as_deref()),
            authentication_package_name: normalize_value(
                fields.authentication_package_name.as_deref(),
            ),
        })
    }
}

fn resolve_time(raw: Option<&str>, received_at: DateTime<Utc>) -> DateTime<Utc> {
    match raw {
        Some(value) => parse_event_time(value).unwrap_or_else(|| {
            debug!(
                target: TARGET_NORMALIZER,
                value = %value,
                "Unparseable event time, using arrival time"
            );
            received_at
        }),
        None => received_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NOT_AVAILABLE;
    use chrono::TimeZone;

    fn normalizer() -> Normalizer {
        Normalizer::new(&LabelConfig::default(), 4624)
    }

    fn arrival() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    fn insertion_strings() -> Vec<Option<String>> {
        [
            "S-1-5-18",
            "SRV01$",
            "CORP",
            "0x3e7",
            "S-1-5-21-1004336348-1177238915-682003330-1104",
            "alice",
            "CORP",
            "0x1a2b3c",
            "10",
            "User32 ",
            "Negotiate",
            "DESKTOP-7Q1LM2K",
            "{00000000-0000-0000-0000-000000000000}",
            "-",
            "-",
            "0",
            "0x2a4",
            "C:\\Windows\\System32\\svchost.exe",
            "203.0.113.5",
            "0",
            "%%1833",
        ]
        .iter()
        .map(|s| Some(s.to_string()))
        .collect()
    }

    #[test]
    fn test_structured_maps_fixed_offsets() {
        let raw = RawRecord::Structured(StructuredRecord {
            event_code: Some(4624),
            log_file: Some("Security".to_string()),
            source_name: Some("Microsoft-Windows-Security-Auditing".to_string()),
            time_generated: Some("20240115143012.000000+000".to_string()),
            computer_name: Some("SRV01".to_string()),
            insertion_strings: Some(insertion_strings()),
        });

        let record = normalizer().normalize(&raw, arrival()).unwrap();
        assert_eq!(record.event_id, 4624);
        assert_eq!(record.time.to_rfc3339(), "2024-01-15T14:30:12+00:00");
        assert_eq!(record.log_name, "Security");
        assert_eq!(record.subject_user, "SRV01$");
        assert_eq!(record.subject_domain, "CORP");
        assert_eq!(record.target_user, "alice");
        assert_eq!(record.target_domain, "CORP");
        assert_eq!(record.target_logon_id, "0x1a2b3c");
        assert_eq!(record.logon_type, "10");
        assert_eq!(record.logon_process_name, "User32");
        assert_eq!(record.authentication_package_name, "Negotiate");
        assert_eq!(record.workstation_name, "DESKTOP-7Q1LM2K");
        assert_eq!(record.process_id, "0x2a4");
        assert_eq!(record.process_name, "C:\\Windows\\System32\\svchost.exe");
        assert_eq!(record.source_network_address, "203.0.113.5");
        assert_eq!(record.source_port, "0");
        assert_eq!(record.computer, "SRV01");
    }

    #[test]
    fn test_short_insertion_list_degrades_every_field() {
        for len in [0usize, 1, 8, 19] {
            let strings = insertion_strings().into_iter().take(len).collect();
            let raw = RawRecord::Structured(StructuredRecord {
                event_code: Some(4624),
                insertion_strings: Some(strings),
                ..Default::default()
            });

            let record = normalizer().normalize(&raw, arrival()).unwrap();
            let expected = AuditRecord::unavailable(4624, arrival());
            assert_eq!(record, expected, "insertion list of length {len}");
        }
    }

    #[test]
    fn test_null_and_dash_slots_become_sentinel() {
        let mut strings = insertion_strings();
        strings[17] = None;
        strings[18] = Some("-".to_string());
        let raw = RawRecord::Structured(StructuredRecord {
            event_code: Some(4624),
            insertion_strings: Some(strings),
            ..Default::default()
        });

        let record = normalizer().normalize(&raw, arrival()).unwrap();
        assert_eq!(record.process_name, NOT_AVAILABLE);
        assert_eq!(record.source_network_address, NOT_AVAILABLE);
        assert_eq!(record.target_user, "alice");
    }

    #[test]
    fn test_numeric_slot_keeps_other_fields() {
        let mut strings = insertion_strings();
        strings.truncate(20);
        let json = serde_json::json!({
            "kind": "structured",
            "EventCode": 4624,
            "InsertionStrings": strings
                .iter()
                .enumerate()
                .map(|(i, s)| if i == 15 { serde_json::json!(0) } else { serde_json::json!(s) })
                .collect::<Vec<_>>(),
        });
        let raw: RawRecord = serde_json::from_value(json).unwrap();

        let record = normalizer().normalize(&raw, arrival()).unwrap();
        assert_eq!(record.target_user, "alice");
        assert_eq!(record.logon_type, "10");
        assert_eq!(record.source_network_address, "203.0.113.5");
        assert_eq!(record.process_id, "0x2a4");
    }

    #[test]
    fn test_structured_without_readable_code_gets_unknown_id() {
        for code in [serde_json::json!(4625.0), serde_json::json!("44x"), serde_json::Value::Null] {
            let json = serde_json::json!({
                "kind": "structured",
                "EventCode": code,
                "InsertionStrings": insertion_strings(),
            });
            let raw: RawRecord = serde_json::from_value(json).unwrap();
            let record = normalizer().normalize(&raw, arrival()).unwrap();
            assert_eq!(record.event_id, UNKNOWN_EVENT_ID, "event code {code}");
        }
    }

    #[test]
    fn test_missing_or_bad_time_uses_arrival() {
        let raw = RawRecord::Structured(StructuredRecord {
            event_code: Some(4624),
            time_generated: Some("not a time".to_string()),
            insertion_strings: Some(Vec::new()),
            ..Default::default()
        });
        let record = normalizer().normalize(&raw, arrival()).unwrap();
        assert_eq!(record.time, arrival());
    }

    #[test]
    fn test_empty_structured_payload_is_malformed() {
        let raw = RawRecord::Structured(StructuredRecord::default());
        let err = normalizer().normalize(&raw, arrival()).unwrap_err();
        assert!(matches!(err, MonitorError::MalformedRecord { .. }));
    }

    #[test]
    fn test_empty_message_is_malformed() {
        let raw = RawRecord::FreeText(FreeTextRecord {
            message: "   \n ".to_string(),
            ..Default::default()
        });
        let err = normalizer().normalize(&raw, arrival()).unwrap_err();
        assert!(matches!(err, MonitorError::MalformedRecord { .. }));
    }

    #[test]
    fn test_free_text_record() {
        let raw = RawRecord::FreeText(FreeTextRecord {
            message: "New Logon:\n\tAccount Name: bob\n\tAccount Domain: -\nLogon Type: 3\n\
                      Workstation Name: DESKTOP-1\nconnection from 198.51.100.7"
                .to_string(),
            time_generated: Some("2024-01-15T14:30:12Z".to_string()),
            computer_name: Some("SRV02".to_string()),
            ..Default::default()
        });

        let record = normalizer().normalize(&raw, arrival()).unwrap();
        assert_eq!(record.event_id, 4624);
        assert_eq!(record.target_user, "bob");
        assert_eq!(record.target_domain, NOT_AVAILABLE);
        assert_eq!(record.logon_type, "3");
        assert_eq!(record.workstation_name, "DESKTOP-1");
        assert_eq!(record.source_network_address, "198.51.100.7");
        assert_eq!(record.computer, "SRV02");
        assert_eq!(record.process_name, NOT_AVAILABLE);
        assert_eq!(record.log_name, NOT_AVAILABLE);
    }
}
