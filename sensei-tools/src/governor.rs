//! Tool-call governor: bounds identical tool invocations within one turn.
//!
//! A governed tool derives a key from the owning agent, the tool name and a
//! content hash of the arguments. Each key may execute at most `limit` times
//! per turn; the next call fails with `ToolError::CallLimitExceeded` without
//! reaching the wrapped tool. Calls without a turn scope pass straight through.

use crate::context::ToolContext;
use crate::error::{Result, ToolError};
use crate::traits::{Tool, ToolEffect, ToolSpec};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const DEFAULT_IDENTICAL_CALL_LIMIT: u32 = 3;

pub struct GovernedTool {
    agent: String,
    limit: u32,
    inner: Arc<dyn Tool>,
}

/// Wrap `tool` with the default identical-call limit.
pub fn govern(agent_name: &str, tool: Arc<dyn Tool>) -> Arc<dyn Tool> {
    govern_with_limit(agent_name, DEFAULT_IDENTICAL_CALL_LIMIT, tool)
}

pub fn govern_with_limit(agent_name: &str, limit: u32, tool: Arc<dyn Tool>) -> Arc<dyn Tool> {
    Arc::new(GovernedTool {
        agent: agent_name.to_string(),
        limit,
        inner: tool,
    })
}

#[async_trait]
impl Tool for GovernedTool {
    fn spec(&self) -> ToolSpec {
        self.inner.spec()
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if let Some(turn) = ctx.turn() {
            let tool_name = self.inner.spec().name;
            let key = call_key(&self.agent, &tool_name, &arguments);
            match turn.try_acquire(&key, self.limit) {
                Ok(count) => {
                    tracing::debug!(
                        turn_id = %turn.id(),
                        agent = %self.agent,
                        tool_name = %tool_name,
                        count,
                        limit = self.limit,
                        "governed tool call admitted"
                    );
                }
                Err(count) => {
                    tracing::warn!(
                        turn_id = %turn.id(),
                        agent = %self.agent,
                        tool_name = %tool_name,
                        count,
                        limit = self.limit,
                        "governed tool call rejected: identical call limit reached"
                    );
                    return Err(ToolError::CallLimitExceeded { key });
                }
            }
        }
        self.inner.execute(ctx, arguments).await
    }

    fn governed_by(&self) -> Option<&str> {
        Some(&self.agent)
    }
}

/// `<agent>:<tool>:params:<sha256 of canonical arguments>`.
///
/// Object keys are sorted recursively before hashing, so argument order never
/// changes the key. The context is a separate parameter and never hashed.
pub fn call_key(agent_name: &str, tool_name: &str, arguments: &serde_json::Value) -> String {
    let mut canonical = String::new();
    write_canonical(arguments, &mut canonical);
    let digest = Sha256::digest(canonical.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{agent_name}:{tool_name}:params:{hex}")
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (i, (key, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Adapts a synchronous closure into a `Tool`, so blocking-free sync tools get
/// the same governor contract as async ones.
pub struct FnTool<F> {
    name: String,
    description: String,
    parameters_schema: serde_json::Value,
    effect: ToolEffect,
    f: F,
}

impl<F> FnTool<F>
where
    F: Fn(&ToolContext, serde_json::Value) -> Result<serde_json::Value> + Send + Sync,
{
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
        effect: ToolEffect,
        f: F,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            effect,
            f,
        }
    }
}

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(&ToolContext, serde_json::Value) -> Result<serde_json::Value> + Send + Sync,
{
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters_schema: self.parameters_schema.clone(),
            effect: self.effect,
        }
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value> {
        (self.f)(ctx, arguments)
    }
}
