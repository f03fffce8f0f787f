//! Tool catalogue types per MCP 2025-06-18.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tool-specific annotations advertised by an upstream server.
/// `read_only_hint` / `destructive_hint` are what intent validation
/// checks against.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ToolAnnotations {
    /// Display title, takes precedence over the tool name in UI contexts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// If true, the tool does not modify its environment.
    #[serde(rename = "readOnlyHint", skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    /// If true, the tool may perform destructive updates.
    #[serde(rename = "destructiveHint", skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    /// If true, calling the tool repeatedly with the same arguments has no
    /// additional effect.
    #[serde(rename = "idempotentHint", skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    /// If true, the tool may interact with an open world of external
    /// entities rather than a fixed, closed set.
    #[serde(rename = "openWorldHint", skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

/// JSON Schema object describing a tool's expected parameters.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ToolInputSchema {
    #[serde(rename = "type", default = "default_object_type")]
    pub schema_type: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,
}

fn default_object_type() -> String {
    "object".to_string()
}

/// A single tool exposed by an upstream MCP server, as returned by its
/// `tools/list` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: ToolInputSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

impl Tool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: ToolInputSchema::default(),
            annotations: None,
        }
    }

    /// `true` if the server annotated this tool as read-only.
    pub fn is_read_only(&self) -> bool {
        self.annotations
            .as_ref()
            .and_then(|a| a.read_only_hint)
            .unwrap_or(false)
    }

    /// `true` if the server annotated this tool as destructive.
    pub fn is_destructive(&self) -> bool {
        self.annotations
            .as_ref()
            .and_then(|a| a.destructive_hint)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let tool = Tool {
            name: "delete_repo".into(),
            description: Some("delete a repository".into()),
            input_schema: ToolInputSchema {
                schema_type: "object".into(),
                properties: HashMap::new(),
                required: vec!["repo".into()],
                additional_properties: Some(false),
            },
            annotations: Some(ToolAnnotations {
                destructive_hint: Some(true),
                ..Default::default()
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        let back: Tool = serde_json::from_str(&json).unwrap();
        assert_eq!(tool, back);
        assert!(back.is_destructive());
        assert!(!back.is_read_only());
    }

    #[test]
    fn defaults_are_conservative() {
        let tool = Tool::new("noop");
        assert!(!tool.is_read_only());
        assert!(!tool.is_destructive());
    }
}
