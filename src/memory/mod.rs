//! 会话状态：消息日志与消息类型

pub mod conversation;

pub use conversation::{Message, MessageLog, Role, ToolCallRequest};
