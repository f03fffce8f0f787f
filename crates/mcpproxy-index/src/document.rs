//! Helpers around `mcpproxy_core::domain::ToolDocument`: schema flattening
//! for the BM25 text field, and the content hash `apply_diff` uses to
//! decide whether an unchanged-name tool needs replacing.

use mcpproxy_core::domain::ToolDocument;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// Flattens a tool's `inputSchema` into whitespace-joined text so
/// property names and descriptions are searchable alongside the tool's
/// own name/description.
pub fn flatten_schema_text(schema: &serde_json::Value) -> String {
    let mut out = String::new();
    flatten_into(schema, &mut out);
    out
}

fn flatten_into(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                out.push_str(key);
                out.push(' ');
                flatten_into(val, out);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        serde_json::Value::String(s) => {
            out.push_str(s);
            out.push(' ');
        }
        _ => {}
    }
}

/// Content hash of the fields `apply_diff` treats as "the document
/// changed": description, input schema, and annotations. The
/// `qualifiedName` itself is the identity, not part of the hash.
pub fn content_hash(doc: &ToolDocument) -> u64 {
    let mut hasher = DefaultHasher::new();
    doc.description.hash(&mut hasher);
    // `serde_json::Value` doesn't implement `Hash`; hash its canonical
    // string form instead.
    doc.input_schema.to_string().hash(&mut hasher);
    serde_json::to_string(&doc.annotations)
        .unwrap_or_default()
        .hash(&mut hasher);
    hasher.finish()
}

/// Extracts the `qualifiedName` set a batch of tools would occupy under
/// `server`,.
pub fn qualified_names_in(server: &str, tools: &[mcpproxy_protocol::Tool]) -> HashSet<String> {
    tools
        .iter()
        .map(|t| ToolDocument::qualify(server, &t.name))
        .collect()
}

/// Summary of one `apply_diff` call, matching the set-difference steps in
///: what was added, replaced (same name, changed content),
/// and removed. Used to populate the SSE `tool_index_update` event.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DiffOutcome {
    pub server: String,
    pub added: Vec<String>,
    pub replaced: Vec<String>,
    pub removed: Vec<String>,
}

impl DiffOutcome {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.replaced.is_empty() && self.removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_schema_properties() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "repo": {"type": "string", "description": "repository slug"}
            },
            "required": ["repo"]
        });
        let text = flatten_schema_text(&schema);
        assert!(text.contains("repo"));
        assert!(text.contains("repository slug"));
    }

    #[test]
    fn content_hash_changes_with_description() {
        let mut doc = ToolDocument {
            qualified_name: "s:t".into(),
            server: "s".into(),
            tool_name: "t".into(),
            description: "a".into(),
            input_schema: serde_json::Value::Null,
            annotations: mcpproxy_protocol::ToolAnnotations::default(),
        };
        let h1 = content_hash(&doc);
        doc.description = "b".into();
        let h2 = content_hash(&doc);
        assert_ne!(h1, h2);
    }
}
