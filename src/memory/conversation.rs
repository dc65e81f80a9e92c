//! 对话消息日志
//!
//! 单个会话内的有序对话状态（system/user/assistant/tool 四种角色），
//! 只增不改：append 追加，snapshot 取不可变视图供模型调用使用。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 模型发出的工具调用请求（用户永远不会构造它）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// 工具调用 ID（回传 tool 消息时需要）
    pub id: String,
    /// 工具名，必须已在 ToolRegistry 注册
    pub name: String,
    /// 参数（JSON 对象）
    pub arguments: Value,
}

/// 单条消息；追加进日志后不再修改
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// assistant 消息可携带工具调用请求
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRequest>,
    /// tool 消息需回填对应的调用 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_call: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call: None,
            tool_call_id: None,
        }
    }

    /// assistant 发起工具调用时的消息（content 可为空）
    pub fn assistant_tool_call(content: impl Into<String>, call: ToolCallRequest) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call: Some(call),
            tool_call_id: None,
        }
    }

    /// 工具执行结果回写为合成的 tool 消息
    pub fn tool(content: impl Into<String>, call_id: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// 消息日志：会话内单调增长，不剪枝、不持久化
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// O(1) 追加，保持顺序，不回改已有条目
    pub fn append(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// 不可变快照，用于构造模型请求
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_preserves_order() {
        let mut log = MessageLog::new();
        log.append(Message::user("第一条"));
        log.append(Message::assistant("第二条"));
        log.append(Message::user("第三条"));

        let snap = log.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].content, "第一条");
        assert_eq!(snap[1].role, Role::Assistant);
        assert_eq!(snap[2].content, "第三条");
    }

    #[test]
    fn tool_messages_carry_call_id() {
        let call = ToolCallRequest {
            id: "call_0".into(),
            name: "search".into(),
            arguments: json!({"keywords": ["rust"]}),
        };
        let assistant = Message::assistant_tool_call("", call.clone());
        assert_eq!(assistant.tool_call.as_ref().unwrap().name, "search");

        let tool = Message::tool("[]", &call.id);
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_0"));
    }

    #[test]
    fn snapshot_reflects_growth_only() {
        let mut log = MessageLog::new();
        assert!(log.is_empty());
        log.append(Message::user("你好"));
        assert_eq!(log.len(), 1);
        log.append(Message::assistant("你好！"));
        assert_eq!(log.len(), 2);
        // 已追加的条目内容不变
        assert_eq!(log.snapshot()[0].content, "你好");
    }
}
