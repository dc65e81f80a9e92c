//! 工具注册表与分发器
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / validate / execute），
//! 由 ToolRegistry 按名注册与分发：未注册名报 UnknownTool，参数校验在 handler
//! 执行之前完成（而不是交给 handler），执行加超时并输出结构化审计日志（JSON）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::ToolSchema;
use crate::turn::TimeAnchor;

/// 分发上下文：本次运行的时间锚点等策略输入
///
/// 时间策略是每次运行注入一次的管线输入，不是包在 handler 外面的装饰器。
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub anchor: TimeAnchor,
    /// 锚点与墙钟偏差的允许窗口（天）
    pub max_deviation_days: u32,
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、参数校验、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（通告给模型的 function 名）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供模型生成正确的参数格式）
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 参数校验：在 execute 之前由分发器调用，失败即 InvalidArguments
    fn validate(&self, _args: &Value) -> Result<(), String> {
        Ok(())
    }

    /// 执行工具（args 为 JSON 对象）
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，启动时注册，运行时分发
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            tools: HashMap::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 通告给模型的工具 schema 列表
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    /// 分发一次工具调用
    ///
    /// 顺序：查名（UnknownTool）→ 校验参数（InvalidArguments）→ 带超时执行
    /// （超时或失败映射为 Transport）。每次分发输出 JSON 审计日志。
    pub async fn dispatch(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<String, AgentError> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;

        tool.validate(&args)
            .map_err(AgentError::InvalidArguments)?;

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args, ctx)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::Transport(e)),
            Err(_) => Err(AgentError::Transport(format!("Tool timeout: {name}"))),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NopTool;

    #[async_trait]
    impl Tool for NopTool {
        fn name(&self) -> &str {
            "nop"
        }
        fn description(&self) -> &str {
            "does nothing"
        }
        fn validate(&self, args: &Value) -> Result<(), String> {
            if args.get("fail").is_some() {
                Err("bad args".to_string())
            } else {
                Ok(())
            }
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String, String> {
            Ok("done".to_string())
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            anchor: TimeAnchor::parse("2024-01-10 09:00:00").unwrap(),
            max_deviation_days: 3,
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let registry = ToolRegistry::new(5);
        let err = registry.dispatch("missing", json!({}), &ctx()).await;
        assert!(matches!(err, Err(AgentError::UnknownTool(name)) if name == "missing"));
    }

    #[tokio::test]
    async fn validation_runs_before_execute() {
        let mut registry = ToolRegistry::new(5);
        registry.register(NopTool);
        let err = registry.dispatch("nop", json!({"fail": 1}), &ctx()).await;
        assert!(matches!(err, Err(AgentError::InvalidArguments(_))));

        let ok = registry.dispatch("nop", json!({}), &ctx()).await.unwrap();
        assert_eq!(ok, "done");
    }

    #[test]
    fn schemas_cover_registered_tools() {
        let mut registry = ToolRegistry::new(5);
        registry.register(NopTool);
        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "nop");
    }
}
