//! 会话编排端到端测试
//!
//! 用脚本化 Mock LLM 与计数搜索提供方走完整桥接路径：
//! 直答、工具路径、非法参数、传输失败、提交互斥与时间更正附注。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use sparrow::core::{create_session, SessionHandle};
use sparrow::llm::{ChatDelta, ChatOutcome, MockLlmClient, MockTurn, SamplingParams};
use sparrow::memory::{Role, ToolCallRequest};
use sparrow::tools::{Recency, SearchHit, SearchProvider, SearchTool, ToolRegistry};
use sparrow::turn::{AgentEvent, TimeGuard, TurnDeps};

const ANCHOR: &str = "2024-01-10 09:00:00";

/// 计数搜索提供方：记录请求次数，返回固定结果
#[derive(Default)]
struct CountingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl SearchProvider for CountingProvider {
    async fn search(
        &self,
        _query: &str,
        _recency: Recency,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..2.min(max_results))
            .map(|i| SearchHit {
                title: format!("标题 {i}"),
                url: format!("https://example.com/{i}"),
                snippet: "摘要".to_string(),
            })
            .collect())
    }
}

fn session_with(
    llm: Arc<MockLlmClient>,
    provider: Arc<CountingProvider>,
) -> (SessionHandle, UnboundedReceiver<AgentEvent>) {
    let mut tools = ToolRegistry::new(5);
    tools.register(SearchTool::new(provider, 5));
    create_session(TurnDeps {
        llm,
        tools: Arc::new(tools),
        guard: TimeGuard::default(),
        params: SamplingParams::default(),
    })
}

/// 收取一次运行的全部事件（到 Complete 为止）
async fn collect_run(rx: &mut UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut out = Vec::new();
    loop {
        let ev = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("run did not complete in time")
            .expect("event channel closed");
        let done = ev == AgentEvent::Complete;
        out.push(ev);
        if done {
            return out;
        }
    }
}

fn finals(events: &[AgentEvent]) -> Vec<&AgentEvent> {
    events
        .iter()
        .filter(|e| matches!(e, AgentEvent::Final { .. }))
        .collect()
}

fn errors(events: &[AgentEvent]) -> Vec<&AgentEvent> {
    events
        .iter()
        .filter(|e| matches!(e, AgentEvent::Error { .. }))
        .collect()
}

fn search_call(keywords: &[&str]) -> ToolCallRequest {
    ToolCallRequest {
        id: "call_1".to_string(),
        name: "search".to_string(),
        arguments: serde_json::json!({ "keywords": keywords }),
    }
}

#[tokio::test]
async fn scenario_a_direct_answer() {
    let llm = Arc::new(MockLlmClient::new().with_turn(MockTurn::Reply(ChatOutcome {
        reasoning: Some("不需要搜索".to_string()),
        content: format!("{ANCHOR} 今天晴。"),
        tool_call: None,
    })));
    let provider = Arc::new(CountingProvider::default());
    let (handle, mut rx) = session_with(llm.clone(), provider.clone());

    assert!(handle.submit("What is the weather?", Some(ANCHOR.to_string())));
    let events = collect_run(&mut rx).await;

    // 恰好一个 Final，且在 Complete 之前、所有内容事件之后
    assert_eq!(finals(&events).len(), 1);
    assert!(errors(&events).is_empty());
    assert!(matches!(events[events.len() - 2], AgentEvent::Final { .. }));

    // 没有第二次模型调用，没有搜索请求
    assert_eq!(llm.calls().len(), 1);
    assert!(llm.calls()[0].tools_advertised);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

    // 日志 = user + assistant
    let history = handle.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    // 时间戳与锚点一致，无更正附注
    assert!(!history[1].content.contains("[系统更正]"));
}

#[tokio::test]
async fn scenario_b_tool_path() {
    let llm = Arc::new(
        MockLlmClient::new()
            .with_turn(MockTurn::Reply(ChatOutcome {
                reasoning: None,
                content: String::new(),
                tool_call: Some(search_call(&["植物大战僵尸", "作者"])),
            }))
            .with_turn(MockTurn::Stream(vec![
                Ok(ChatDelta {
                    reasoning: Some("根据搜索结果".to_string()),
                    content: None,
                }),
                Ok(ChatDelta {
                    reasoning: None,
                    content: Some("作者是一位 B 站 UP 主".to_string()),
                }),
                Ok(ChatDelta {
                    reasoning: None,
                    content: Some("。".to_string()),
                }),
            ])),
    );
    let provider = Arc::new(CountingProvider::default());
    let (handle, mut rx) = session_with(llm.clone(), provider.clone());

    assert!(handle.submit("植物大战僵尸杂交版的作者是谁？", Some(ANCHOR.to_string())));
    let events = collect_run(&mut rx).await;

    // 恰好一次工具分发
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    // 第二次调用：流式、不通告工具、在含工具结果的日志之上（system + 4 条）
    let calls = llm.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].tools_advertised && !calls[0].streamed);
    assert!(!calls[1].tools_advertised && calls[1].streamed);
    assert_eq!(calls[1].message_count, 5);

    // 第二次调用恰好一个 Final，片段拼接等于 Final 字段
    let fin = finals(&events);
    assert_eq!(fin.len(), 1);
    if let AgentEvent::Final { reasoning, answer } = fin[0] {
        assert_eq!(reasoning, "根据搜索结果");
        assert_eq!(answer, "作者是一位 B 站 UP 主。");
    }

    // 日志 = user + assistant(tool_call) + tool + assistant(final)
    let history = handle.history().await;
    assert_eq!(history.len(), 4);
    assert_eq!(history[1].tool_call.as_ref().unwrap().name, "search");
    assert_eq!(history[2].role, Role::Tool);
    let hits: Vec<SearchHit> = serde_json::from_str(&history[2].content).unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn scenario_c_empty_keywords() {
    let llm = Arc::new(MockLlmClient::new().with_turn(MockTurn::Reply(ChatOutcome {
        reasoning: None,
        content: String::new(),
        tool_call: Some(search_call(&[])),
    })));
    let provider = Arc::new(CountingProvider::default());
    let (handle, mut rx) = session_with(llm.clone(), provider.clone());

    assert!(handle.submit("随便搜点什么", Some(ANCHOR.to_string())));
    let events = collect_run(&mut rx).await;

    // 参数非法：单个 Error，无 Final，零次搜索请求
    assert_eq!(errors(&events).len(), 1);
    assert!(finals(&events).is_empty());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

    // 分发失败不写回任何工具消息，日志只有 user
    let history = handle.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);

    // 终态后重新允许提交
    assert!(!handle.is_busy());
}

#[tokio::test]
async fn transport_failure_becomes_single_error_then_complete() {
    let llm = Arc::new(
        MockLlmClient::new().with_turn(MockTurn::Fail("connection refused".to_string())),
    );
    let provider = Arc::new(CountingProvider::default());
    let (handle, mut rx) = session_with(llm, provider);

    assert!(handle.submit("你好", Some(ANCHOR.to_string())));
    let events = collect_run(&mut rx).await;

    assert_eq!(errors(&events).len(), 1);
    assert!(finals(&events).is_empty());
    assert_eq!(events.last(), Some(&AgentEvent::Complete));
    assert!(!handle.is_busy());
}

#[tokio::test]
async fn stream_failure_keeps_partial_output_and_halts() {
    let llm = Arc::new(
        MockLlmClient::new()
            .with_turn(MockTurn::Reply(ChatOutcome {
                reasoning: None,
                content: String::new(),
                tool_call: Some(search_call(&["新闻"])),
            }))
            .with_turn(MockTurn::Stream(vec![
                Ok(ChatDelta {
                    reasoning: None,
                    content: Some("部分输出".to_string()),
                }),
                Err("connection reset".to_string()),
            ])),
    );
    let provider = Arc::new(CountingProvider::default());
    let (handle, mut rx) = session_with(llm, provider);

    assert!(handle.submit("今天有什么新闻？", Some(ANCHOR.to_string())));
    let events = collect_run(&mut rx).await;

    // 失败前的片段不丢，随后单个 Error，无 Final
    assert!(events.contains(&AgentEvent::Answer {
        text: "部分输出".to_string()
    }));
    assert_eq!(errors(&events).len(), 1);
    assert!(finals(&events).is_empty());

    // 工具调用与结果在失败前已入日志
    assert_eq!(handle.history().await.len(), 3);
}

#[tokio::test]
async fn correction_notice_on_mismatched_timestamp() {
    let llm = Arc::new(MockLlmClient::new().with_turn(MockTurn::Reply(ChatOutcome {
        reasoning: None,
        content: "现在是 2025-03-03 08:00:00，一切正常。".to_string(),
        tool_call: None,
    })));
    let provider = Arc::new(CountingProvider::default());
    let (handle, mut rx) = session_with(llm, provider);

    assert!(handle.submit("现在几点？", Some(ANCHOR.to_string())));
    let events = collect_run(&mut rx).await;

    let fin = finals(&events);
    assert_eq!(fin.len(), 1);
    if let AgentEvent::Final { answer, .. } = fin[0] {
        assert!(answer.contains("[系统更正]"));
        assert!(answer.contains(ANCHOR));
    }
    // 附注同样出现在日志里的最终 assistant 消息中
    let history = handle.history().await;
    assert!(history[1].content.contains(ANCHOR));
}

#[tokio::test]
async fn submission_is_exclusive_while_in_flight() {
    let llm = Arc::new(
        MockLlmClient::new()
            .with_latency(Duration::from_millis(200))
            .with_turn(MockTurn::Reply(ChatOutcome {
                reasoning: None,
                content: "好的。".to_string(),
                tool_call: None,
            })),
    );
    let provider = Arc::new(CountingProvider::default());
    let (handle, mut rx) = session_with(llm, provider);

    assert!(handle.submit("第一问", Some(ANCHOR.to_string())));
    assert!(handle.is_busy());
    // 在途期间的提交被拒绝，不产生副作用
    assert!(!handle.submit("第二问", Some(ANCHOR.to_string())));

    let events = collect_run(&mut rx).await;
    assert_eq!(events.last(), Some(&AgentEvent::Complete));
    assert!(!handle.is_busy());
    assert_eq!(handle.history().await.len(), 2);

    // Complete 之后可再次提交
    assert!(handle.submit("第三问", Some(ANCHOR.to_string())));
    let events = collect_run(&mut rx).await;
    assert_eq!(finals(&events).len(), 1);
}
