//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：
//! chat（非流式，可携带工具 schema，用于工具调用判定）、
//! chat_stream（流式，返回增量 Delta 流，不携带工具）。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde_json::Value;

use crate::memory::{Message, ToolCallRequest};

/// 采样参数（来自配置，不写死在业务逻辑里）
#[derive(Clone, Debug)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
    /// 停止序列，可选
    pub stop: Option<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            stop: None,
        }
    }
}

/// 向模型通告的工具 schema
#[derive(Clone, Debug)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// 参数 JSON Schema
    pub parameters: Value,
}

/// 非流式调用的完整响应：思考内容、正文、以及可能的工具调用请求
#[derive(Clone, Debug, Default)]
pub struct ChatOutcome {
    pub reasoning: Option<String>,
    pub content: String,
    pub tool_call: Option<ToolCallRequest>,
}

/// 流式调用的单个增量：可能携带思考片段和/或正文片段，也可能都没有
#[derive(Clone, Debug, Default)]
pub struct ChatDelta {
    pub reasoning: Option<String>,
    pub content: Option<String>,
}

/// 增量 Delta 流
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<ChatDelta, String>> + Send>>;

/// LLM 客户端 trait：非流式完成与流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；tools 非空时通告工具 schema，响应可能包含工具调用请求
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        params: &SamplingParams,
    ) -> Result<ChatOutcome, String>;

    /// 流式完成，返回增量 Delta 流（不通告工具）
    async fn chat_stream(
        &self,
        messages: &[Message],
        params: &SamplingParams,
    ) -> Result<DeltaStream, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
