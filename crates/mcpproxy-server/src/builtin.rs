//! The four built-in downstream tools mcpproxy exposes in place of a raw
//! union of every upstream's tools. An MCP client
//! only ever sees these four; `retrieve_tools` is how it discovers the
//! real catalogue, and the three `call_tool_*` variants are how it
//! invokes a tool while declaring the intent that intent validation checks.

use mcpproxy_protocol::{Tool, ToolInputSchema};
use std::collections::HashMap;

fn schema(properties: &[(&str, serde_json::Value)], required: &[&str]) -> ToolInputSchema {
    ToolInputSchema {
        schema_type: "object".to_string(),
        properties: properties.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<HashMap<_, _>>(),
        required: required.iter().map(|s| s.to_string()).collect(),
        additional_properties: Some(false),
    }
}

fn intent_property() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "description": "Why this call is being made and what kind of operation it is. Required on every call_tool_* invocation.",
        "properties": {
            "operation_type": { "type": "string", "enum": ["read", "write", "destructive"] },
            "data_sensitivity": { "type": "string", "enum": ["public", "internal", "private", "unknown"] },
            "reason": { "type": "string", "maxLength": 1000 }
        },
        "required": ["operation_type"]
    })
}

/// Common `call_tool_*` input schema: `name`, and exactly one of
/// `args`/`args_json`, plus the required `intent`. `args`/`args_json` are
/// mutually exclusive, so
/// neither is listed in `required` — `dispatch::Dispatcher` enforces the
/// "exactly one" rule itself and returns `invalid_argument` otherwise.
fn call_tool_schema() -> ToolInputSchema {
    schema(
        &[
            ("name", serde_json::json!({
                "type": "string",
                "description": "The \"server:tool\" identifier returned by retrieve_tools."
            })),
            ("args", serde_json::json!({
                "type": "object",
                "description": "Arguments forwarded verbatim to the upstream tool. Mutually exclusive with args_json."
            })),
            ("args_json", serde_json::json!({
                "type": "string",
                "description": "Arguments as a JSON-encoded string, for clients that can't emit nested objects. Mutually exclusive with args."
            })),
            ("intent", intent_property()),
        ],
        &["name", "intent"],
    )
}

/// `retrieve_tools(query, limit?)`: BM25 search over the live tool
/// catalogue.
pub fn retrieve_tools() -> Tool {
    Tool {
        name: "retrieve_tools".to_string(),
        description: Some(
            "Search the catalogue of tools exposed by every connected upstream MCP server. \
             Returns qualifiedName, description, and the recommended call_tool_* variant for each match."
                 .to_string(),
        ),
        input_schema: schema(
            &[
                ("query", serde_json::json!({ "type": "string", "description": "Free-text search query." })),
                ("limit", serde_json::json!({ "type": "integer", "minimum": 1, "maximum": 50, "default": 10 })),
            ],
            &["query"],
        ),
        annotations: Some(mcpproxy_protocol::ToolAnnotations {
            title: Some("Retrieve tools".to_string()),
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
            open_world_hint: Some(false),
        }),
    }
}

/// `call_tool_read`: invokes a tool the caller has declared as
/// read-only, matching a server-annotated `readOnlyHint` tool.
pub fn call_tool_read() -> Tool {
    Tool {
        name: "call_tool_read".to_string(),
        description: Some("Call a read-only upstream tool. Requires intent.operation_type = \"read\".".to_string()),
        input_schema: call_tool_schema(),
        annotations: Some(mcpproxy_protocol::ToolAnnotations {
            title: Some("Call tool (read)".to_string()),
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: None,
            open_world_hint: Some(true),
        }),
    }
}

/// `call_tool_write`: invokes a tool that mutates state but isn't
/// flagged destructive.
pub fn call_tool_write() -> Tool {
    Tool {
        name: "call_tool_write".to_string(),
        description: Some("Call an upstream tool that writes or mutates state. Requires intent.operation_type = \"write\".".to_string()),
        input_schema: call_tool_schema(),
        annotations: Some(mcpproxy_protocol::ToolAnnotations {
            title: Some("Call tool (write)".to_string()),
            read_only_hint: Some(false),
            destructive_hint: Some(false),
            idempotent_hint: None,
            open_world_hint: Some(true),
        }),
    }
}

/// `call_tool_destructive`: invokes a tool the upstream server flags
/// `destructiveHint`. The most consequential of the three variants.
pub fn call_tool_destructive() -> Tool {
    Tool {
        name: "call_tool_destructive".to_string(),
        description: Some(
            "Call an upstream tool capable of destructive or irreversible changes. \
             Requires intent.operation_type = \"destructive\"; a reason is recommended but not enforced."
                 .to_string(),
        ),
        input_schema: call_tool_schema(),
        annotations: Some(mcpproxy_protocol::ToolAnnotations {
            title: Some("Call tool (destructive)".to_string()),
            read_only_hint: Some(false),
            destructive_hint: Some(true),
            idempotent_hint: Some(false),
            open_world_hint: Some(true),
        }),
    }
}

/// All four built-in tools, in the order `tools/list` should advertise
/// them.
pub fn all() -> Vec<Tool> {
    vec![retrieve_tools(), call_tool_read(), call_tool_write(), call_tool_destructive()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_four_builtin_tools_are_exposed() {
        assert_eq!(all().len(), 4);
        let names: Vec<&str> = all().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["retrieve_tools", "call_tool_read", "call_tool_write", "call_tool_destructive"]);
    }

    #[test]
    fn call_tool_variants_require_intent() {
        for tool in [call_tool_read(), call_tool_write(), call_tool_destructive()] {
            assert!(tool.input_schema.required.contains(&"intent".to_string()));
        }
    }
}
