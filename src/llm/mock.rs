//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 支持按脚本出牌：预先排入若干回合（非流式回复 / 流式增量序列 / 失败），
//! 并记录每次调用是否流式、是否通告了工具，便于断言编排协议。
//! 脚本为空时回显最后一条 user 消息，保证无 Key 也能本地跑通。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{ChatDelta, ChatOutcome, DeltaStream, LlmClient, SamplingParams, ToolSchema};
use crate::memory::{Message, Role};

/// 脚本中的一个回合
pub enum MockTurn {
    /// 非流式调用返回的完整响应
    Reply(ChatOutcome),
    /// 流式调用产出的增量序列
    Stream(Vec<Result<ChatDelta, String>>),
    /// 传输失败（两种调用均适用）
    Fail(String),
}

/// 记录的一次调用
#[derive(Clone, Debug)]
pub struct MockCall {
    pub streamed: bool,
    pub tools_advertised: bool,
    pub message_count: usize,
}

/// Mock 客户端：按脚本回放，记录调用
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<MockTurn>>,
    calls: Mutex<Vec<MockCall>>,
    latency: Option<std::time::Duration>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 排入一个回合（按排入顺序消费）
    pub fn push(&self, turn: MockTurn) {
        self.script.lock().unwrap().push_back(turn);
    }

    pub fn with_turn(self, turn: MockTurn) -> Self {
        self.push(turn);
        self
    }

    /// 每次调用前模拟网络延迟（用于在途互斥类测试）
    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn simulate_latency(&self) {
        if let Some(d) = self.latency {
            tokio::time::sleep(d).await;
        }
    }

    /// 已记录的调用快照
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, streamed: bool, tools: bool, count: usize) {
        self.calls.lock().unwrap().push(MockCall {
            streamed,
            tools_advertised: tools,
            message_count: count,
        });
    }

    fn echo(messages: &[Message]) -> String {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        format!("Echo from Mock: {last_user}")
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        _params: &SamplingParams,
    ) -> Result<ChatOutcome, String> {
        self.simulate_latency().await;
        self.record(false, tools.is_some(), messages.len());
        match self.script.lock().unwrap().pop_front() {
            Some(MockTurn::Reply(outcome)) => Ok(outcome),
            Some(MockTurn::Fail(msg)) => Err(msg),
            Some(MockTurn::Stream(_)) => Err("Mock script expected a stream call".to_string()),
            None => Ok(ChatOutcome {
                reasoning: None,
                content: Self::echo(messages),
                tool_call: None,
            }),
        }
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        _params: &SamplingParams,
    ) -> Result<DeltaStream, String> {
        self.simulate_latency().await;
        self.record(true, false, messages.len());
        match self.script.lock().unwrap().pop_front() {
            Some(MockTurn::Stream(deltas)) => Ok(Box::pin(stream::iter(deltas))),
            Some(MockTurn::Fail(msg)) => Err(msg),
            Some(MockTurn::Reply(_)) => Err("Mock script expected a non-stream call".to_string()),
            None => {
                let delta = ChatDelta {
                    reasoning: None,
                    content: Some(Self::echo(messages)),
                };
                Ok(Box::pin(stream::iter(vec![Ok(delta)])))
            }
        }
    }
}
