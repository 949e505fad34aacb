//! RDP classification engine
//!
//! Decides whether a normalized logon is a human login and, if so, whether it
//! is a Remote Desktop session. Logon type 10 is unambiguous; logon type 3
//! covers share access and service traffic as well as RDP's NTLM pre-session
//! negotiation, so it needs a combination of weaker signals. The heuristic is
//! best effort: both misses and false alarms are possible.

mod handler;

pub use handler::{HandlerStats, LoginEventHandler, TargetFilter};

use crate::models::{is_available, AuditRecord, Classification};

/// Remote-interactive logon (mstsc session start)
pub const LOGON_TYPE_REMOTE_INTERACTIVE: &str = "10";
/// Network logon (RDP NLA/NTLM authentication phase among others)
pub const LOGON_TYPE_NETWORK: &str = "3";

const LOOPBACK_ADDRESSES: &[&str] = &["127.0.0.1", "::1"];

/// Substring markers hinting at an RDP client
const WORKSTATION_CLIENT_MARKER: &str = "DESKTOP-";
const WORKSTATION_TERMSRV_MARKER: &str = "TERMSRV";
const AUTH_PACKAGE_NTLM_MARKER: &str = "NTLM";
const LOGON_PROCESS_NTLMSSP_MARKER: &str = "NtLmSsp";

/// Individual classifier inputs, kept for debug logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signals {
    pub valid_human_subject: bool,
    pub external_address_present: bool,
    pub protocol_indicators: bool,
}

/// Multi-signal RDP login classifier
#[derive(Debug, Clone)]
pub struct RdpClassifier {
    /// Upper-cased deny list
    deny_users: Vec<String>,
    deny_machine_accounts: bool,
}

impl RdpClassifier {
    pub fn new(deny_users: &[String], deny_machine_accounts: bool) -> Self {
        Self {
            deny_users: deny_users
                .iter()
                .map(|u| u.trim().to_uppercase())
                .filter(|u| !u.is_empty())
                .collect(),
            deny_machine_accounts,
        }
    }

    /// Classify a record. Pure: same record, same answer.
    pub fn classify(&self, record: &AuditRecord) -> Classification {
        if record.logon_type == LOGON_TYPE_REMOTE_INTERACTIVE {
            return Classification::RemoteLogin;
        }

        if !self.is_human_subject(record) {
            return Classification::NotAHumanLogin;
        }

        if record.logon_type == LOGON_TYPE_NETWORK
            && has_external_address(record)
            && has_protocol_indicators(record)
        {
            return Classification::RemoteLogin;
        }

        Classification::HumanButNotRemote
    }

    /// Evaluate the three logon-type-3 signals independently.
    pub fn evaluate(&self, record: &AuditRecord) -> Signals {
        Signals {
            valid_human_subject: self.is_human_subject(record),
            external_address_present: has_external_address(record),
            protocol_indicators: has_protocol_indicators(record),
        }
    }

    /// Target user is set and not a built-in or service account.
    pub fn is_human_subject(&self, record: &AuditRecord) -> bool {
        let user = record.target_user.trim();
        if user.is_empty() || !is_available(user) {
            return false;
        }
        if self.deny_machine_accounts && user.ends_with('$') {
            return false;
        }
        let upper = user.to_uppercase();
        !self.deny_users.iter().any(|denied| *denied == upper)
    }
}

fn has_external_address(record: &AuditRecord) -> bool {
    let address = record.source_network_address.trim();
    !address.is_empty() && is_available(address) && !LOOPBACK_ADDRESSES.contains(&address)
}

fn has_protocol_indicators(record: &AuditRecord) -> bool {
    record.workstation_name.contains(WORKSTATION_CLIENT_MARKER)
        || record.workstation_name.contains(WORKSTATION_TERMSRV_MARKER)
        || record.authentication_package_name.contains(AUTH_PACKAGE_NTLM_MARKER)
        || record.logon_process_name.contains(LOGON_PROCESS_NTLMSSP_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use chrono::{TimeZone, Utc};

    fn classifier() -> RdpClassifier {
        let cfg = AppConfig::default();
        RdpClassifier::new(&cfg.monitor.deny_users, cfg.monitor.deny_machine_accounts)
    }

    fn record(logon_type: &str, user: &str, address: &str) -> AuditRecord {
        let time = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 12).unwrap();
        AuditRecord {
            logon_type: logon_type.to_string(),
            target_user: user.to_string(),
            source_network_address: address.to_string(),
            ..AuditRecord::unavailable(4624, time)
        }
    }

    fn network_logon(user: &str, address: &str, workstation: &str) -> AuditRecord {
        AuditRecord {
            workstation_name: workstation.to_string(),
            ..record("3", user, address)
        }
    }

    #[test]
    fn test_type_10_is_always_remote() {
        let c = classifier();
        assert_eq!(
            c.classify(&record("10", "alice", "203.0.113.5")),
            Classification::RemoteLogin
        );
        // Even with every other field unavailable or a system account
        assert_eq!(c.classify(&record("10", "N/A", "N/A")), Classification::RemoteLogin);
        assert_eq!(
            c.classify(&record("10", "SYSTEM", "127.0.0.1")),
            Classification::RemoteLogin
        );
    }

    #[test]
    fn test_type_3_deny_listed_user_is_not_human() {
        let c = classifier();
        for user in [
            "SYSTEM",
            "system",
            "Local Service",
            "NETWORK SERVICE",
            "ANONYMOUS LOGON",
            "система",
        ] {
            let r = network_logon(user, "203.0.113.5", "DESKTOP-ABC");
            assert_eq!(c.classify(&r), Classification::NotAHumanLogin, "user {user}");
        }
    }

    #[test]
    fn test_type_3_missing_user_is_not_human() {
        let c = classifier();
        let r = network_logon("N/A", "203.0.113.5", "DESKTOP-ABC");
        assert_eq!(c.classify(&r), Classification::NotAHumanLogin);
    }

    #[test]
    fn test_machine_account_toggle() {
        let r = network_logon("SRV01$", "203.0.113.5", "DESKTOP-ABC");
        assert_eq!(classifier().classify(&r), Classification::NotAHumanLogin);

        let permissive = RdpClassifier::new(&[], false);
        assert_eq!(permissive.classify(&r), Classification::RemoteLogin);
    }

    #[test]
    fn test_type_3_loopback_is_human_but_not_remote() {
        let c = classifier();
        for address in ["127.0.0.1", "::1", "N/A"] {
            let r = network_logon("alice", address, "DESKTOP-ABC");
            assert_eq!(c.classify(&r), Classification::HumanButNotRemote, "address {address}");
        }
    }

    #[test]
    fn test_type_3_requires_protocol_indicator() {
        let c = classifier();
        let r = network_logon("alice", "203.0.113.5", "FILESRV");
        assert_eq!(c.classify(&r), Classification::HumanButNotRemote);

        let r = network_logon("alice", "203.0.113.5", "DESKTOP-7Q1LM2K");
        assert_eq!(c.classify(&r), Classification::RemoteLogin);

        let r = network_logon("alice", "203.0.113.5", "TERMSRV-GW");
        assert_eq!(c.classify(&r), Classification::RemoteLogin);

        let r = AuditRecord {
            authentication_package_name: "NTLM".to_string(),
            ..network_logon("alice", "203.0.113.5", "N/A")
        };
        assert_eq!(c.classify(&r), Classification::RemoteLogin);

        let r = AuditRecord {
            logon_process_name: "NtLmSsp".to_string(),
            ..network_logon("alice", "203.0.113.5", "N/A")
        };
        assert_eq!(c.classify(&r), Classification::RemoteLogin);
    }

    #[test]
    fn test_other_logon_types_split_on_subject() {
        let c = classifier();
        assert_eq!(
            c.classify(&record("2", "alice", "N/A")),
            Classification::HumanButNotRemote
        );
        assert_eq!(
            c.classify(&record("5", "SYSTEM", "N/A")),
            Classification::NotAHumanLogin
        );
        assert_eq!(
            c.classify(&record("N/A", "alice", "203.0.113.5")),
            Classification::HumanButNotRemote
        );
    }

    #[test]
    fn test_classify_is_deterministic() {
        let c = classifier();
        let r = network_logon("alice", "203.0.113.5", "DESKTOP-ABC");
        let first = c.classify(&r);
        for _ in 0..10 {
            assert_eq!(c.classify(&r), first);
        }
    }

    #[test]
    fn test_evaluate_reports_signals() {
        let c = classifier();
        let signals = c.evaluate(&network_logon("alice", "::1", "FILESRV"));
        assert_eq!(
            signals,
            Signals {
                valid_human_subject: true,
                external_address_present: false,
                protocol_indicators: false,
            }
        );
    }
}
