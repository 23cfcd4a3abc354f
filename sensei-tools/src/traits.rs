use crate::context::ToolContext;
use crate::error::{Result, ToolError};
use async_trait::async_trait;

/// Whether calling a tool can lead to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolEffect {
    Read,
    /// Enqueues a deferred command; the write only happens on approval.
    ProposeMutation,
}

pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
    pub effect: ToolEffect,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// Name of the agent whose governor wraps this tool, if any.
    fn governed_by(&self) -> Option<&str> {
        None
    }
}

pub fn to_llm_tool_def(tool: &dyn Tool) -> sensei_llm::ToolDefinition {
    let spec = tool.spec();
    sensei_llm::ToolDefinition {
        name: spec.name,
        description: spec.description,
        parameters: spec.parameters_schema,
    }
}

/// Structured validation failure returned to the agent instead of an error.
pub fn tool_error(message: &str) -> serde_json::Value {
    serde_json::json!({ "status": "error", "message": message })
}

pub(crate) fn optional_string(args: &serde_json::Value, key: &str) -> Result<Option<String>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            Ok(Some(trimmed.to_string()).filter(|s| !s.is_empty()))
        }
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

pub(crate) fn optional_i64(args: &serde_json::Value, key: &str) -> Result<Option<i64>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n.as_i64().map(Some).ok_or_else(|| {
            ToolError::InvalidArguments(format!("key {key} must be an integer, got {n}"))
        }),
        serde_json::Value::String(s) => s.trim().parse::<i64>().map(Some).map_err(|_| {
            ToolError::InvalidArguments(format!("key {key} must be an integer, got {s:?}"))
        }),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be an integer, got {other:?}"
        ))),
    }
}

pub(crate) fn optional_string_list(
    args: &serde_json::Value,
    key: &str,
) -> Result<Option<Vec<String>>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ToolError::InvalidArguments(format!("key {key} must contain only strings"))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be an array of strings, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_string_trims_and_drops_blank() {
        let args = json!({"a": "  Olmo ", "b": "   ", "c": null, "d": 3});
        assert_eq!(optional_string(&args, "a").expect("a").as_deref(), Some("Olmo"));
        assert_eq!(optional_string(&args, "b").expect("b"), None);
        assert_eq!(optional_string(&args, "c").expect("c"), None);
        assert_eq!(optional_string(&args, "missing").expect("missing"), None);
        assert!(optional_string(&args, "d").is_err());
    }

    #[test]
    fn optional_i64_accepts_numeric_strings() {
        let args = json!({"n": 4, "s": " 12 ", "bad": "x", "f": 1.5});
        assert_eq!(optional_i64(&args, "n").expect("n"), Some(4));
        assert_eq!(optional_i64(&args, "s").expect("s"), Some(12));
        assert!(optional_i64(&args, "bad").is_err());
        assert!(optional_i64(&args, "f").is_err());
    }

    #[test]
    fn optional_string_list_rejects_mixed_arrays() {
        let args = json!({"ok": ["a", "b"], "mixed": ["a", 1]});
        assert_eq!(
            optional_string_list(&args, "ok").expect("ok"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert!(optional_string_list(&args, "mixed").is_err());
    }
}
