//! 流聚合器
//!
//! 消费单次模型调用的原始增量（每个增量可携带思考片段、答案片段、两者或都没有），
//! 逐个重分类为 Reasoning / Answer 事件并累积进对应缓冲区；
//! 流耗尽后由 finish 产出恰好一个 Final(思考全文, 答案全文)。
//! 工具调用的判定不在这里 —— 那发生在编排器对完整首响应的检查上。

use futures_util::StreamExt;

use crate::llm::{ChatDelta, DeltaStream};
use crate::turn::AgentEvent;

/// 单次模型调用的聚合状态
#[derive(Debug, Default)]
pub struct StreamAggregator {
    reasoning: String,
    answer: String,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 重分类一个增量，返回 0~2 个事件（思考在前，与到达顺序一致）
    pub fn feed(&mut self, delta: &ChatDelta) -> Vec<AgentEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(fragment) = delta.reasoning.as_deref() {
            if !fragment.is_empty() {
                self.reasoning.push_str(fragment);
                events.push(AgentEvent::Reasoning {
                    text: fragment.to_string(),
                });
            }
        }
        if let Some(fragment) = delta.content.as_deref() {
            if !fragment.is_empty() {
                self.answer.push_str(fragment);
                events.push(AgentEvent::Answer {
                    text: fragment.to_string(),
                });
            }
        }
        events
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// 将更正附注并入最终答案（时间守卫的事后校验结果）
    pub fn append_answer(&mut self, text: &str) {
        self.answer.push_str(text);
    }

    /// 终结：产出本次调用唯一的 Final 事件
    pub fn finish(self) -> AgentEvent {
        AgentEvent::Final {
            reasoning: self.reasoning,
            answer: self.answer,
        }
    }

    /// 驱动整条增量流：每个增量产生的事件按序经 emit 送出；
    /// 传输失败时立即返回 Err（调用方负责发出 Error 事件，其后不再有 Final）。
    pub async fn drain(
        &mut self,
        mut stream: DeltaStream,
        emit: &mut (dyn FnMut(AgentEvent) + Send),
    ) -> Result<(), String> {
        while let Some(item) = stream.next().await {
            let delta = item?;
            for event in self.feed(&delta) {
                emit(event);
            }
        }
        Ok(())
    }
}
