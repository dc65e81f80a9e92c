//! Sparrow - Rust 流式搜索问答引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、运行阶段、会话编排（并发桥接）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 会话内消息日志
//! - **tools**: 工具注册表与分发器、search 工具、搜索提供方
//! - **turn**: 单次提交协议（流聚合、时间守卫、编排主循环、事件）
//! - **ui**: 控制台消费循环

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod tools;
pub mod turn;
pub mod ui;
