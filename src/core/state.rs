//! 运行阶段定义
//!
//! 一次提交在编排循环内的状态机阶段；Error 可从任意阶段到达，
//! Done / Error 均为终态并重新允许提交。

use serde::Serialize;

/// 单次提交的运行阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Idle,
    /// 首次模型调用进行中（携带工具 schema）
    AwaitingFirstResponse,
    /// 工具分发与执行
    ToolDispatch,
    /// 第二次模型调用（流式，不再携带工具）
    AwaitingFinalResponse,
    /// 最终答案的时间一致性校验
    Validating,
    Done,
    Error,
}

impl RunPhase {
    /// 阶段迁移并输出追踪日志
    pub fn advance(&mut self, next: RunPhase) {
        tracing::debug!(from = ?self, to = ?next, "run phase");
        *self = next;
    }
}
