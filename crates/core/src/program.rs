use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an advertising program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    Active,
    Pending,
    Paused,
    Rejected,
    Expired,
    Archived,
    /// Any status string this client does not know about yet.
    #[serde(other)]
    Unknown,
}

impl ProgramStatus {
    pub const ALL: [ProgramStatus; 6] = [
        Self::Active,
        Self::Pending,
        Self::Paused,
        Self::Rejected,
        Self::Expired,
        Self::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Paused => "paused",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Archived => "archived",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a status name, case-insensitively. Returns `None` for names outside
    /// the vocabulary.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
    }

    /// Statuses hidden from the "current" view.
    pub fn is_excluded_from_current(&self) -> bool {
        matches!(self, Self::Rejected | Self::Expired | Self::Archived)
    }
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business as referenced by a program. The same business can be known under
/// several identifier aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRef {
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl BusinessRef {
    pub fn new(aliases: &[&str], name: Option<&str>) -> Self {
        Self {
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            name: name.map(str::to_string),
        }
    }

    /// True if any alias equals `identifier`, ignoring ASCII case.
    pub fn matches(&self, identifier: &str) -> bool {
        let wanted = identifier.trim();
        self.aliases
            .iter()
            .any(|alias| alias.trim().eq_ignore_ascii_case(wanted))
    }
}

/// A third-party advertising program as returned by the programs API.
///
/// Fields this client does not interpret are preserved in `extra` so that a
/// record can be re-serialized without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: ProgramStatus,
    /// Program type code, e.g. "affiliate" or "cpc"
    #[serde(rename = "type", default)]
    pub program_type: String,
    #[serde(default)]
    pub businesses: Vec<BusinessRef>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Program {
    pub fn new(id: impl Into<String>, status: ProgramStatus, program_type: &str) -> Self {
        Self {
            id: id.into(),
            name: None,
            status,
            program_type: program_type.to_string(),
            businesses: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_business(mut self, business: BusinessRef) -> Self {
        self.businesses.push(business);
        self
    }

    pub fn references_business(&self, identifier: &str) -> bool {
        self.businesses.iter().any(|b| b.matches(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_deserializes_with_opaque_fields() {
        let json = r#"{
            "id": "p-1",
            "status": "active",
            "type": "affiliate",
            "businesses": [{"aliases": ["ACME", "acme-inc"], "name": "Acme"}],
            "commission": 0.12
        }"#;
        let program: Program = serde_json::from_str(json).unwrap();
        assert_eq!(program.status, ProgramStatus::Active);
        assert_eq!(program.program_type, "affiliate");
        assert_eq!(program.businesses[0].aliases.len(), 2);
        assert_eq!(program.extra["commission"], serde_json::json!(0.12));

        let back = serde_json::to_value(&program).unwrap();
        assert_eq!(back["type"], "affiliate");
        assert_eq!(back["commission"], serde_json::json!(0.12));
    }

    #[test]
    fn test_unknown_status_does_not_fail() {
        let json = r#"{"id": "p-2", "status": "on_hold", "type": "cpc"}"#;
        let program: Program = serde_json::from_str(json).unwrap();
        assert_eq!(program.status, ProgramStatus::Unknown);
        assert!(program.businesses.is_empty());
    }

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(ProgramStatus::parse("EXPIRED"), Some(ProgramStatus::Expired));
        assert_eq!(ProgramStatus::parse(" paused "), Some(ProgramStatus::Paused));
        assert_eq!(ProgramStatus::parse("current"), None);
    }

    #[test]
    fn test_business_alias_match_ignores_case() {
        let business = BusinessRef::new(&["Shop-42", "S42"], None);
        assert!(business.matches("shop-42"));
        assert!(business.matches("s42"));
        assert!(!business.matches("shop-4"));
    }
}
