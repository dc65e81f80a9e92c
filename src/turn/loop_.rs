//! 单次提交的编排主循环
//!
//! 两阶段协议：带工具 schema 的首次模型调用（非流式，完整响应上判定工具调用）->
//! 若有工具调用则分发执行、把调用与结果写回消息日志，再发起不带工具的流式第二次调用 ->
//! 聚合器重分类增量 -> 时间守卫事后校验 -> 发出唯一的 Final。
//! 任何传输/工具失败向上返回 AgentError，由桥接层转为单个 Error 事件，本次提交不再发起模型调用。

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::{AgentError, RunPhase};
use crate::llm::{ChatDelta, LlmClient, SamplingParams};
use crate::memory::{Message, MessageLog};
use crate::tools::{ToolContext, ToolRegistry};
use crate::turn::{AgentEvent, StreamAggregator, TimeAnchor, TimeGuard};

/// 一次提交运行所需的依赖（会话创建时显式构造注入，无进程级单例）
pub struct TurnDeps {
    pub llm: Arc<dyn LlmClient>,
    pub tools: Arc<ToolRegistry>,
    pub guard: TimeGuard,
    pub params: SamplingParams,
}

/// 执行一次提交
///
/// anchor_override 为显式锚点文本（不可解析即 MissingTimeAnchor），None 时按墙钟捕获。
/// 事件按产生顺序送入 event_tx；成功路径以恰好一个 Final 结束。
pub async fn run_turn(
    deps: &TurnDeps,
    log: &mut MessageLog,
    question: &str,
    anchor_override: Option<&str>,
    event_tx: &mpsc::UnboundedSender<AgentEvent>,
) -> Result<(), AgentError> {
    let mut phase = RunPhase::Idle;
    let result = drive_turn(deps, log, question, anchor_override, event_tx, &mut phase).await;
    match &result {
        Ok(()) => phase.advance(RunPhase::Done),
        Err(e) => {
            tracing::warn!(error = %e, "turn failed");
            phase.advance(RunPhase::Error);
        }
    }
    result
}

async fn drive_turn(
    deps: &TurnDeps,
    log: &mut MessageLog,
    question: &str,
    anchor_override: Option<&str>,
    event_tx: &mpsc::UnboundedSender<AgentEvent>,
    phase: &mut RunPhase,
) -> Result<(), AgentError> {
    // 锚点先于一切模型调用确定，之后本轮不再重算
    let anchor = match anchor_override {
        Some(s) => TimeAnchor::parse(s)?,
        None => TimeAnchor::now(),
    };

    phase.advance(RunPhase::AwaitingFirstResponse);
    let system = Message::system(deps.guard.system_prompt(&anchor));
    log.append(Message::user(question));

    let schemas = deps.tools.schemas();
    let first = deps
        .llm
        .chat(&with_system(&system, log), Some(&schemas), &deps.params)
        .await
        .map_err(AgentError::Transport)?;

    let mut agg = StreamAggregator::new();

    match first.tool_call {
        Some(call) => {
            phase.advance(RunPhase::ToolDispatch);
            tracing::info!(tool = %call.name, "model requested tool call");

            let ctx = ToolContext {
                anchor,
                max_deviation_days: deps.guard.max_deviation_days,
            };
            let observation = deps
                .tools
                .dispatch(&call.name, call.arguments.clone(), &ctx)
                .await?;

            // 调用与结果先入日志，第二次调用在更新后的日志之上进行
            log.append(Message::assistant_tool_call(first.content, call.clone()));
            log.append(Message::tool(observation, &call.id));

            phase.advance(RunPhase::AwaitingFinalResponse);
            let stream = deps
                .llm
                .chat_stream(&with_system(&system, log), &deps.params)
                .await
                .map_err(AgentError::Transport)?;

            agg.drain(stream, &mut |ev| {
                let _ = event_tx.send(ev);
            })
            .await
            .map_err(AgentError::Transport)?;
        }
        None => {
            // 无工具调用：完整首响应按单个合成增量回放，事件契约与流式路径一致
            let delta = ChatDelta {
                reasoning: first.reasoning,
                content: Some(first.content),
            };
            for ev in agg.feed(&delta) {
                let _ = event_tx.send(ev);
            }
        }
    }

    phase.advance(RunPhase::Validating);
    if let Some(notice) = deps.guard.validate(agg.answer(), &anchor) {
        let _ = event_tx.send(AgentEvent::Answer {
            text: notice.clone(),
        });
        agg.append_answer(&notice);
    }

    log.append(Message::assistant(agg.answer().to_string()));
    let _ = event_tx.send(agg.finish());
    Ok(())
}

/// 系统提示词不入日志，每次调用时前置到快照之前
fn with_system(system: &Message, log: &MessageLog) -> Vec<Message> {
    let mut request = Vec::with_capacity(log.len() + 1);
    request.push(system.clone());
    request.extend_from_slice(log.snapshot());
    request
}
