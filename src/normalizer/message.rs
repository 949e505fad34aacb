//! Rendered-message field scanner
//!
//! Reads "Label: value" lines out of a human-readable logon message. The
//! format is not contractually stable, so every field is optional and the
//! first occurrence of a field within its block wins.

use super::field_maps::{LabelTable, MessageField, Section};
use regex::Regex;
use std::sync::LazyLock;

/// Four dot-separated groups of 1-3 digits
static IPV4_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("IPV4_REGEX pattern is valid")
});

/// Raw (un-normalized) values found in a message
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MessageFields {
    pub subject_user: Option<String>,
    pub subject_domain: Option<String>,
    pub target_user: Option<String>,
    pub target_domain: Option<String>,
    pub target_logon_id: Option<String>,
    pub logon_type: Option<String>,
    pub workstation_name: Option<String>,
    pub source_network_address: Option<String>,
    pub source_port: Option<String>,
    pub process_name: Option<String>,
    pub process_id: Option<String>,
    pub logon_process_name: Option<String>,
    pub authentication_package_name: Option<String>,
}

impl MessageFields {
    fn slot(&mut self, field: MessageField, section: Section) -> Option<&mut Option<String>> {
        let slot = match (field, section) {
            (MessageField::UserName, Section::Subject) => &mut self.subject_user,
            (MessageField::UserName, _) => &mut self.target_user,
            (MessageField::Domain, Section::Subject) => &mut self.subject_domain,
            (MessageField::Domain, _) => &mut self.target_domain,
            // The subject logon id is not part of the record
            (MessageField::LogonId, Section::Subject) => return None,
            (MessageField::LogonId, _) => &mut self.target_logon_id,
            (MessageField::LogonType, _) => &mut self.logon_type,
            (MessageField::Workstation, _) => &mut self.workstation_name,
            (MessageField::NetworkAddress, _) => &mut self.source_network_address,
            (MessageField::SourcePort, _) => &mut self.source_port,
            (MessageField::ProcessName, _) => &mut self.process_name,
            (MessageField::ProcessId, _) => &mut self.process_id,
            (MessageField::LogonProcess, _) => &mut self.logon_process_name,
            (MessageField::AuthenticationPackage, _) => &mut self.authentication_package_name,
        };
        Some(slot)
    }
}

/// Scan a rendered message for labelled fields.
pub fn parse_message(message: &str, labels: &LabelTable) -> MessageFields {
    let mut fields = MessageFields::default();
    let mut section = Section::Unscoped;
    let mut address_label_seen = false;

    for line in message.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let label = label.trim().to_lowercase();
        let value = value.trim();

        if value.is_empty() {
            if let Some(next) = labels.match_section(&label) {
                section = next;
                continue;
            }
        }

        let Some(field) = labels.match_field(&label) else {
            continue;
        };
        if field == MessageField::NetworkAddress {
            address_label_seen = true;
        }
        if value.is_empty() {
            continue;
        }
        if let Some(slot) = fields.slot(field, section) {
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }
    }

    if !address_label_seen {
        fields.source_network_address = first_ipv4(message).map(str::to_string);
    }

    fields
}

/// First IPv4-shaped token in the text, skipping the unspecified address.
pub fn first_ipv4(text: &str) -> Option<&str> {
    IPV4_REGEX
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|candidate| *candidate != "0.0.0.0")
}
