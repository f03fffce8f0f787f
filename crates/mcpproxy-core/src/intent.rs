//! `IntentDeclaration` — the type half of intent validation's two-key model.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Read,
    Write,
    Destructive,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Destructive => "destructive",
        }
    }

    /// The built-in tool name that declares this operation type.
    pub fn tool_variant(self) -> &'static str {
        match self {
            Self::Read => "call_tool_read",
            Self::Write => "call_tool_write",
            Self::Destructive => "call_tool_destructive",
        }
    }

    /// Parses the tool variant name back into its declared operation
    /// type. Returns `None` for `retrieve_tools` or anything unknown.
    pub fn from_tool_variant(name: &str) -> Option<Self> {
        match name {
            "call_tool_read" => Some(Self::Read),
            "call_tool_write" => Some(Self::Write),
            "call_tool_destructive" => Some(Self::Destructive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSensitivity {
    Public,
    Internal,
    Private,
    Unknown,
}

/// Maximum length of `IntentDeclaration::reason`, 
pub const MAX_REASON_LEN: usize = 1000;

/// An agent's declared intent for a tool call. Immutable once attached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDeclaration {
    pub operation_type: Option<OperationType>,
    pub data_sensitivity: Option<DataSensitivity>,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_variant_round_trips() {
        for op in [OperationType::Read, OperationType::Write, OperationType::Destructive] {
            let variant = op.tool_variant();
            assert_eq!(OperationType::from_tool_variant(variant), Some(op));
        }
        assert_eq!(OperationType::from_tool_variant("retrieve_tools"), None);
    }
}
