//! The seven-step intent validation chain. Checks
//! run in a fixed order so the first violation present in a request is
//! always the one reported, making client-side error handling
//! deterministic.

use mcpproxy_core::domain::ToolDocument;
use mcpproxy_core::error::{ErrorCode, ProxyError, ProxyResult};
use mcpproxy_core::intent::{DataSensitivity, IntentDeclaration, OperationType, MAX_REASON_LEN};
use serde_json::Value;
use tracing::warn;

fn invalid(code: ErrorCode, message: impl Into<String>) -> ProxyError {
    ProxyError::validation(code, message)
}

/// Validates `arguments.intent` against the `call_tool_*` variant that
/// was invoked and the target tool's own server-declared annotations.
/// Order: missing_intent → missing_operation_type →
/// invalid_operation_type → intent_mismatch → invalid_sensitivity →
/// reason_too_long → server_mismatch.
pub fn validate(
    tool_variant: &str,
    doc: &ToolDocument,
    arguments: &Value,
    strict_server_validation: bool,
) -> ProxyResult<IntentDeclaration> {
    let intent = arguments
        .get("intent")
        .filter(|v| v.is_object())
        .ok_or_else(|| invalid(ErrorCode::MissingIntent, "arguments.intent is required and must be an object"))?;

    let operation_type_raw = intent
        .get("operation_type")
        .ok_or_else(|| invalid(ErrorCode::MissingOperationType, "intent.operation_type is required"))?;

    let operation_type_str = operation_type_raw
        .as_str()
        .ok_or_else(|| invalid(ErrorCode::InvalidOperationType, "intent.operation_type must be a string"))?;

    let operation_type = match operation_type_str {
        "read" => OperationType::Read,
        "write" => OperationType::Write,
        "destructive" => OperationType::Destructive,
        other => {
            return Err(invalid(
                ErrorCode::InvalidOperationType,
                format!("intent.operation_type '{other}' is not one of read, write, destructive"),
            ))
        }
    };

    let expected = OperationType::from_tool_variant(tool_variant)
        .expect("validate is only called with a call_tool_* variant");
    if operation_type != expected {
        return Err(invalid(
            ErrorCode::IntentMismatch,
            format!(
                "intent.operation_type '{}' does not match the invoked tool '{tool_variant}'",
                operation_type.as_str()
            ),
        ));
    }

    let data_sensitivity = match intent.get("data_sensitivity") {
        None => None,
        Some(raw) => {
            let s = raw
                .as_str()
                .ok_or_else(|| invalid(ErrorCode::InvalidSensitivity, "intent.data_sensitivity must be a string"))?;
            Some(match s {
                "public" => DataSensitivity::Public,
                "internal" => DataSensitivity::Internal,
                "private" => DataSensitivity::Private,
                "unknown" => DataSensitivity::Unknown,
                other => {
                    return Err(invalid(
                        ErrorCode::InvalidSensitivity,
                        format!("intent.data_sensitivity '{other}' is not a recognized sensitivity level"),
                    ))
                }
            })
        }
    };

    let reason = match intent.get("reason") {
        None => None,
        Some(raw) => {
            let s = raw
                .as_str()
                .ok_or_else(|| invalid(ErrorCode::ReasonTooLong, "intent.reason must be a string"))?;
            if s.chars().count() > MAX_REASON_LEN {
                return Err(invalid(
                    ErrorCode::ReasonTooLong,
                    format!("intent.reason exceeds the {MAX_REASON_LEN} character limit"),
                ));
            }
            Some(s.to_string())
        }
    };

    // Step 7, SERVER_MISMATCH: two-key validation proper
    // ends above; this step cross-checks the *server's own* annotations,
    // and only when strict mode is on. `call_tool_destructive` is the
    // most-permissive variant and is never rejected by annotation. A tool
    // with no destructive annotation at all is trusted as-is.
    if strict_server_validation {
        let destructive = doc.annotations.destructive_hint.unwrap_or(false);
        let read_only = doc.annotations.read_only_hint.unwrap_or(false);
        match tool_variant {
            "call_tool_read" | "call_tool_write" if destructive => {
                return Err(invalid(
                    ErrorCode::ServerMismatch,
                    format!(
                        "'{}' is annotated destructive by its server; use call_tool_destructive instead of '{tool_variant}'",
                        doc.qualified_name
                    ),
                ));
            }
            "call_tool_write" if read_only => {
                warn!(
                    qualified_name = %doc.qualified_name,
                    tool_variant,
                    "call_tool_write invoked on a tool annotated read-only; allowing (warn, not reject)"
                );
            }
            _ => {}
        }
    }

    Ok(IntentDeclaration {
        operation_type: Some(operation_type),
        data_sensitivity,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(annotations: mcpproxy_protocol::ToolAnnotations) -> ToolDocument {
        ToolDocument {
            qualified_name: "github:delete_repo".into(),
            server: "github".into(),
            tool_name: "delete_repo".into(),
            description: String::new(),
            input_schema: Value::Null,
            annotations,
        }
    }

    fn destructive_doc() -> ToolDocument {
        doc(mcpproxy_protocol::ToolAnnotations {
            destructive_hint: Some(true),
            ..Default::default()
        })
    }

    fn plain_doc() -> ToolDocument {
        doc(mcpproxy_protocol::ToolAnnotations::default())
    }

    #[test]
    fn missing_intent_is_reported_first() {
        let err = validate("call_tool_destructive", &destructive_doc(), &serde_json::json!({}), true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingIntent);
    }

    #[test]
    fn missing_operation_type() {
        let args = serde_json::json!({ "intent": {} });
        let err = validate("call_tool_destructive", &destructive_doc(), &args, true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingOperationType);
    }

    #[test]
    fn invalid_operation_type_string() {
        let args = serde_json::json!({ "intent": { "operation_type": "delete_everything" } });
        let err = validate("call_tool_destructive", &destructive_doc(), &args, true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidOperationType);
    }

    #[test]
    fn intent_mismatch_against_invoked_variant() {
        let args = serde_json::json!({ "intent": { "operation_type": "read" } });
        let err = validate("call_tool_destructive", &destructive_doc(), &args, true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::IntentMismatch);
    }

    #[test]
    fn invalid_sensitivity_value() {
        let args = serde_json::json!({ "intent": { "operation_type": "destructive", "data_sensitivity": "top_secret" } });
        let err = validate("call_tool_destructive", &destructive_doc(), &args, true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSensitivity);
    }

    #[test]
    fn reason_too_long() {
        let args = serde_json::json!({
            "intent": { "operation_type": "destructive", "reason": "x".repeat(MAX_REASON_LEN + 1) }
        });
        let err = validate("call_tool_destructive", &destructive_doc(), &args, true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ReasonTooLong);
    }

    #[test]
    fn server_mismatch_rejects_read_or_write_on_destructive_tool() {
        let args = serde_json::json!({ "intent": { "operation_type": "write" } });
        let err = validate("call_tool_write", &destructive_doc(), &args, true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerMismatch);

        let args = serde_json::json!({ "intent": { "operation_type": "read" } });
        let err = validate("call_tool_read", &destructive_doc(), &args, true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerMismatch);
    }

    #[test]
    fn call_tool_destructive_is_never_rejected_by_annotation() {
        let args = serde_json::json!({ "intent": { "operation_type": "destructive" } });
        assert!(validate("call_tool_destructive", &destructive_doc(), &args, true).is_ok());
    }

    #[test]
    fn write_on_read_only_tool_warns_but_does_not_reject() {
        let read_only = doc(mcpproxy_protocol::ToolAnnotations {
            read_only_hint: Some(true),
            ..Default::default()
        });
        let args = serde_json::json!({ "intent": { "operation_type": "write" } });
        assert!(validate("call_tool_write", &read_only, &args, true).is_ok());
    }

    #[test]
    fn unannotated_tool_is_trusted_for_any_variant() {
        let args = serde_json::json!({ "intent": { "operation_type": "read" } });
        assert!(validate("call_tool_read", &plain_doc(), &args, true).is_ok());
        let args = serde_json::json!({ "intent": { "operation_type": "write" } });
        assert!(validate("call_tool_write", &plain_doc(), &args, true).is_ok());
    }

    #[test]
    fn strict_server_validation_disabled_skips_step_seven() {
        let args = serde_json::json!({ "intent": { "operation_type": "write" } });
        assert!(validate("call_tool_write", &destructive_doc(), &args, false).is_ok());
    }

    #[test]
    fn well_formed_destructive_call_validates() {
        let args = serde_json::json!({
            "intent": { "operation_type": "destructive", "data_sensitivity": "private", "reason": "cleanup" }
        });
        let decl = validate("call_tool_destructive", &destructive_doc(), &args, true).unwrap();
        assert_eq!(decl.operation_type, Some(OperationType::Destructive));
        assert_eq!(decl.reason.as_deref(), Some("cleanup"));
    }
}
