//! 工具箱：注册表与分发器、search 工具、搜索提供方接口

pub mod provider;
pub mod registry;
pub mod search;

pub use provider::{DuckDuckGo, Recency, SearchHit, SearchProvider};
pub use registry::{Tool, ToolContext, ToolRegistry};
pub use search::SearchTool;
