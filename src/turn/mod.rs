//! 单次提交的协议层：事件、流聚合、时间守卫、编排主循环

pub mod aggregator;
pub mod events;
pub mod guard;
pub mod loop_;

pub use aggregator::StreamAggregator;
pub use events::AgentEvent;
pub use guard::{TimeAnchor, TimeGuard, ANCHOR_FORMAT};
pub use loop_::{run_turn, TurnDeps};
