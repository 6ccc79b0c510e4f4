//! Occurrence and triage types shared by extraction, the remote store and the panel.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Placeholder for any free-text field whose source element is missing.
pub const UNRESOLVED: &str = "Não encontrado";

/// Block letter used when the profile block cannot be read.
pub const UNKNOWN_BLOCK: char = 'Z';

/// Unit number used when the profile block cannot be read.
pub const UNKNOWN_UNIT: &str = "999";

/// Protocol number of an occurrence as read from the page.
///
/// Extraction never fails: text that does not start with digits is kept
/// verbatim as [`Protocol::Unparsed`] so callers can tell an incomplete
/// extraction apart from a real record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Protocol {
    Number(u64),
    Unparsed(String),
}

impl Protocol {
    /// Parse label text the way the portal renders it.
    ///
    /// Leading ASCII digits (after trimming) form the number, trailing
    /// garbage is ignored. Anything else is preserved as-is.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
        match trimmed[..digits].parse() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Unparsed(trimmed.to_string()),
        }
    }

    /// The protocol number, if it identifies a real record (numeric, non-zero).
    pub fn valid(&self) -> Option<u64> {
        match self {
            Self::Number(n) if *n != 0 => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Unparsed(raw) => f.write_str(raw),
        }
    }
}

/// Canonical view of one occurrence, rebuilt from the DOM on every extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccurrenceRecord {
    pub protocol: Protocol,
    /// `DD/MM/YYYY HH:MM:SS`, passed through untouched.
    pub opened_at: String,
    pub block: char,
    pub unit: String,
    pub status: String,
    pub detail_url: String,
    pub message_count: usize,
    /// Same format as `opened_at`, or [`UNRESOLVED`].
    pub last_message_at: String,
}

/// Who the operator holds responsible for an occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsibleParty {
    #[default]
    Unassigned,
    Deputy,
    Manager,
}

impl ResponsibleParty {
    /// Value used by the backend and by the panel's select options.
    ///
    /// Unassigned is the empty string on the wire.
    pub fn wire_value(self) -> &'static str {
        match self {
            Self::Unassigned => "",
            Self::Deputy => "sub",
            Self::Manager => "sindico",
        }
    }

    /// Inverse of [`wire_value`](Self::wire_value); unknown values are unassigned.
    pub fn from_wire(value: &str) -> Self {
        match value.trim() {
            "sub" => Self::Deputy,
            "sindico" => Self::Manager,
            _ => Self::Unassigned,
        }
    }
}

/// Operator-supplied classification of an occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TriageAnnotation {
    pub deputy_involved: bool,
    pub manager_involved: bool,
    pub admin_involved: bool,
    pub resolved: bool,
    pub responsible: ResponsibleParty,
}

/// The backend's stored triage state for one protocol.
///
/// Exists only for protocols that were submitted at least once.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteOccurrence {
    #[serde(rename = "id", default, deserialize_with = "lenient_u64")]
    pub protocol: u64,
    #[serde(rename = "sub", alias = "subsindico", default, deserialize_with = "flag")]
    pub deputy_involved: bool,
    #[serde(rename = "sindico", default, deserialize_with = "flag")]
    pub manager_involved: bool,
    #[serde(rename = "adm", default, deserialize_with = "flag")]
    pub admin_involved: bool,
    #[serde(rename = "resolvido", default, deserialize_with = "flag")]
    pub resolved: bool,
    #[serde(rename = "responsabilidade", default, deserialize_with = "party")]
    pub responsible: ResponsibleParty,
}

impl RemoteOccurrence {
    pub fn annotation(&self) -> TriageAnnotation {
        TriageAnnotation {
            deputy_involved: self.deputy_involved,
            manager_involved: self.manager_involved,
            admin_involved: self.admin_involved,
            resolved: self.resolved,
            responsible: self.responsible,
        }
    }
}

// ── Wire decoding ──
//
// The backend is PHP over MySQL: flags arrive as 0/1 numbers, sometimes as
// strings, and ids may be quoted.

fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => s.trim() == "1",
        _ => false,
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn party<'de, D: Deserializer<'de>>(d: D) -> Result<ResponsibleParty, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => ResponsibleParty::from_wire(&s),
        _ => ResponsibleParty::Unassigned,
    })
}
