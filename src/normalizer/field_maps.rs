//! Logon event field tables
//!
//! Positional layout of Security event 4624 insertion strings, and the label
//! lists used to pick fields out of rendered messages. Both are plain data so
//! new layouts or message locales are additive.

use crate::config::LabelConfig;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Audit record fields that come from insertion strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogonField {
    SubjectUser,
    SubjectDomain,
    TargetUser,
    TargetDomain,
    TargetLogonId,
    LogonType,
    LogonProcessName,
    AuthenticationPackageName,
    WorkstationName,
    ProcessId,
    ProcessName,
    SourceNetworkAddress,
    SourcePort,
}

/// Offset table for one insertion-string layout
pub struct OffsetMapping {
    offsets: HashMap<LogonField, usize>,
    min_len: usize,
}

impl OffsetMapping {
    /// Create a mapping from (field, offset) pairs
    pub fn new(pairs: &[(LogonField, usize)]) -> Self {
        let min_len = pairs.iter().map(|(_, offset)| offset + 1).max().unwrap_or(0);
        Self {
            offsets: pairs.iter().copied().collect(),
            min_len,
        }
    }

    pub fn offset(&self, field: LogonField) -> Option<usize> {
        self.offsets.get(&field).copied()
    }

    /// Shortest insertion list the mapping can be applied to.
    pub fn min_len(&self) -> usize {
        self.min_len
    }
}

// Slots 0 and 4 are the subject/target SIDs and slot 3 the subject logon id;
// none of them feed the record.
static LOGON_SUCCESS_MAP: LazyLock<OffsetMapping> = LazyLock::new(|| {
    OffsetMapping::new(&[
        (LogonField::SubjectUser, 1),
        (LogonField::SubjectDomain, 2),
        (LogonField::TargetUser, 5),
        (LogonField::TargetDomain, 6),
        (LogonField::TargetLogonId, 7),
        (LogonField::LogonType, 8),
        (LogonField::LogonProcessName, 9),
        (LogonField::AuthenticationPackageName, 10),
        (LogonField::WorkstationName, 11),
        (LogonField::ProcessId, 16),
        (LogonField::ProcessName, 17),
        (LogonField::SourceNetworkAddress, 18),
        (LogonField::SourcePort, 19),
    ])
});

/// Layout of event 4624 ("An account was successfully logged on")
pub fn logon_success_offsets() -> &'static OffsetMapping {
    &LOGON_SUCCESS_MAP
}

/// Fields recognised in rendered messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageField {
    UserName,
    Domain,
    LogonId,
    LogonType,
    Workstation,
    NetworkAddress,
    SourcePort,
    ProcessName,
    ProcessId,
    LogonProcess,
    AuthenticationPackage,
}

/// Message block a user/domain/logon-id line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// No header seen yet; identity lines describe the target
    Unscoped,
    Subject,
    Target,
}

/// Lower-cased label lists compiled from configuration
pub struct LabelTable {
    fields: Vec<(MessageField, Vec<String>)>,
    subject_sections: Vec<String>,
    target_sections: Vec<String>,
}

impl LabelTable {
    pub fn new(cfg: &LabelConfig) -> Self {
        let fields = vec![
            (MessageField::UserName, lowercase_all(&cfg.user_name)),
            (MessageField::Domain, lowercase_all(&cfg.domain)),
            (MessageField::LogonId, lowercase_all(&cfg.logon_id)),
            (MessageField::LogonType, lowercase_all(&cfg.logon_type)),
            (MessageField::Workstation, lowercase_all(&cfg.workstation)),
            (MessageField::NetworkAddress, lowercase_all(&cfg.network_address)),
            (MessageField::SourcePort, lowercase_all(&cfg.source_port)),
            (MessageField::ProcessName, lowercase_all(&cfg.process_name)),
            (MessageField::ProcessId, lowercase_all(&cfg.process_id)),
            (MessageField::LogonProcess, lowercase_all(&cfg.logon_process)),
            (
                MessageField::AuthenticationPackage,
                lowercase_all(&cfg.authentication_package),
            ),
        ];

        Self {
            fields,
            subject_sections: lowercase_all(&cfg.subject_section),
            target_sections: lowercase_all(&cfg.target_section),
        }
    }

    /// Match a lower-cased line label against the field labels (contains-based).
    pub fn match_field(&self, label: &str) -> Option<MessageField> {
        self.fields
            .iter()
            .find(|(_, labels)| labels.iter().any(|l| label.contains(l.as_str())))
            .map(|(field, _)| *field)
    }

    /// Match a lower-cased header line ("Subject:", "New Logon:").
    pub fn match_section(&self, label: &str) -> Option<Section> {
        let hit = |labels: &[String]| labels.iter().any(|l| label.contains(l.as_str()));
        if hit(&self.target_sections) {
            Some(Section::Target)
        } else if hit(&self.subject_sections) {
            Some(Section::Subject)
        } else {
            None
        }
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new(&LabelConfig::default())
    }
}

fn lowercase_all(labels: &[String]) -> Vec<String> {
    labels
        .iter()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect()
}
