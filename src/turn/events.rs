//! 运行事件：后台工作者经由桥接队列推送给消费端渲染
//!
//! 单次模型调用的事件序列有限、有序、不可重放，以恰好一个 Final 或 Error 结尾；
//! Started / Complete 是桥接层的控制事件，标记提交的受理与结束。

use serde::Serialize;

/// 单次运行的事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 提交被受理，输入禁用
    Started,
    /// 思考通道的一个片段（流式）
    Reasoning { text: String },
    /// 答案通道的一个片段（流式）
    Answer { text: String },
    /// 本次调用的完整聚合结果，恒为成功序列的最后一个事件
    Final { reasoning: String, answer: String },
    /// 终止性错误，之后不再有 Final
    Error { text: String },
    /// 运行结束，重新允许提交
    Complete,
}
