//! OpenAI 兼容 API 客户端
//!
//! 直接基于 reqwest 调用任意 OpenAI 兼容端点（可配置 base_url），支持 DeepSeek、OpenAI、自建代理等。
//! 流式响应按 SSE 解码（eventsource-stream），每个 chunk 的 delta 可携带
//! reasoning_content（DeepSeek 思考模式扩展字段）与 content 两路片段。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{ChatDelta, ChatOutcome, DeltaStream, LlmClient, SamplingParams, ToolSchema};
use crate::memory::{Message, Role, ToolCallRequest};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

// ---- 请求侧 wire 结构 ----

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

/// wire 上的 arguments 是 JSON 编码后的字符串，不是对象
#[derive(Serialize, Deserialize, Debug, Clone)]
struct WireFunction {
    name: String,
    arguments: String,
}

// ---- 响应侧 wire 结构 ----

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    /// DeepSeek 思考模式扩展字段
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct WireChunk {
    choices: Vec<WireStreamChoice>,
}

#[derive(Deserialize)]
struct WireStreamChoice {
    delta: WireDelta,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
}

/// OpenAI 兼容客户端：持有 reqwest Client 与 model 名，按 chat/completions 协议收发
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        // 只限制连接超时；整体超时会截断长流式响应
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key,
            usage: TokenUsage::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn to_wire_messages(&self, messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => WireMessage {
                    role: "system",
                    content: m.content.clone(),
                    tool_calls: None,
                    tool_call_id: None,
                },
                Role::User => WireMessage {
                    role: "user",
                    content: m.content.clone(),
                    tool_calls: None,
                    tool_call_id: None,
                },
                Role::Assistant => WireMessage {
                    role: "assistant",
                    content: m.content.clone(),
                    tool_calls: m.tool_call.as_ref().map(|c| {
                        vec![WireToolCall {
                            id: c.id.clone(),
                            kind: "function".to_string(),
                            function: WireFunction {
                                name: c.name.clone(),
                                arguments: c.arguments.to_string(),
                            },
                        }]
                    }),
                    tool_call_id: None,
                },
                Role::Tool => WireMessage {
                    role: "tool",
                    content: m.content.clone(),
                    tool_calls: None,
                    tool_call_id: m.tool_call_id.clone(),
                },
            })
            .collect()
    }

    fn to_wire_tools(tools: &[ToolSchema]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    async fn post(&self, body: &WireRequest<'_>) -> Result<reqwest::Response, String> {
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("Request failed: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {detail}"));
        }
        Ok(resp)
    }
}

/// 将 wire 工具调用解析为内部请求；arguments 字符串解析失败视为传输层错误
fn parse_tool_call(call: WireToolCall) -> Result<ToolCallRequest, String> {
    let arguments: Value = serde_json::from_str(&call.function.arguments)
        .map_err(|e| format!("Tool call arguments parse error: {e}"))?;
    Ok(ToolCallRequest {
        id: call.id,
        name: call.function.name,
        arguments,
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        params: &SamplingParams,
    ) -> Result<ChatOutcome, String> {
        let body = WireRequest {
            model: &self.model,
            messages: self.to_wire_messages(messages),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stop: params.stop.as_deref(),
            stream: false,
            tools: tools.map(Self::to_wire_tools),
            tool_choice: tools.map(|_| "auto"),
        };

        let resp = self.post(&body).await?;
        let parsed: WireResponse = resp
            .json()
            .await
            .map_err(|e| format!("Response decode error: {e}"))?;

        if let Some(usage) = &parsed.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| "Response contained no choices".to_string())?;

        let tool_call = message
            .tool_calls
            .and_then(|calls| calls.into_iter().next())
            .map(parse_tool_call)
            .transpose()?;

        Ok(ChatOutcome {
            reasoning: message.reasoning_content,
            content: message.content.unwrap_or_default(),
            tool_call,
        })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        params: &SamplingParams,
    ) -> Result<DeltaStream, String> {
        let body = WireRequest {
            model: &self.model,
            messages: self.to_wire_messages(messages),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stop: params.stop.as_deref(),
            stream: true,
            tools: None,
            tool_choice: None,
        };

        let resp = self.post(&body).await?;

        let stream = resp
            .bytes_stream()
            .eventsource()
            .map(|event| match event {
                Ok(ev) => {
                    if ev.data == "[DONE]" {
                        return None;
                    }
                    match serde_json::from_str::<WireChunk>(&ev.data) {
                        Ok(chunk) => {
                            let delta = chunk
                                .choices
                                .into_iter()
                                .next()
                                .map(|c| c.delta)
                                .unwrap_or_default();
                            Some(Ok(ChatDelta {
                                reasoning: delta.reasoning_content,
                                content: delta.content,
                            }))
                        }
                        Err(e) => Some(Err(format!("SSE chunk decode error: {e}"))),
                    }
                }
                Err(e) => Some(Err(format!("SSE stream error: {e}"))),
            })
            .take_while(|item| futures_util::future::ready(item.is_some()))
            .filter_map(futures_util::future::ready);

        Ok(Box::pin(stream))
    }
}
