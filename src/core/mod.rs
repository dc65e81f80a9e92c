//! 核心层：错误类型、运行阶段、会话编排（并发桥接）

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::AgentError;
pub use orchestrator::{
    create_llm_from_config, create_session, create_session_from_config, Command, SessionHandle,
};
pub use state::RunPhase;
