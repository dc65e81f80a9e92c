//! 错误类型
//!
//! 单次提交内的终止性错误：缺失时间锚点、未知工具、参数非法、传输失败。
//! 时间戳校验不匹配不是错误 —— 它由 TimeGuard 以更正附注的方式就地恢复。

use thiserror::Error;

/// 一次提交运行中可能出现的终止性错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 提交缺少可解析的时间锚点
    #[error("Missing or unparsable time anchor: {0}")]
    MissingTimeAnchor(String),

    /// 模型请求了未注册的工具
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// 工具参数缺失或格式非法（在 handler 执行前校验）
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    /// 模型或搜索调用的传输层失败
    #[error("Transport failure: {0}")]
    Transport(String),
}
