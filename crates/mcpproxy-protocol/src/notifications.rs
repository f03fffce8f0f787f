//! The small set of upstream-initiated notifications mcpproxy reacts to.
//! names exactly one: `notifications/tools/list_changed`.
//! Capability negotiation (`capabilities.tools.listChanged`) lives next to
//! it so the managed layer can decide whether to subscribe or fall back to
//! periodic polling.

/// Method name of the tools-changed notification.
pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";

/// Whether an upstream's advertised capabilities include list-changed
/// notifications for tools.
pub fn supports_tools_list_changed(capabilities: &serde_json::Value) -> bool {
    capabilities
        .get("tools")
        .and_then(|t| t.get("listChanged"))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_list_changed_capability() {
        let caps = serde_json::json!({"tools": {"listChanged": true}});
        assert!(supports_tools_list_changed(&caps));

        let caps = serde_json::json!({"tools": {}});
        assert!(!supports_tools_list_changed(&caps));

        let caps = serde_json::json!({});
        assert!(!supports_tools_list_changed(&caps));
    }
}
