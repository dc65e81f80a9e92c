//! 展示层：控制台消费循环（通道分离渲染，布局之外的事都不在这里做）

pub mod app;

pub use app::{coalesce, run_app};
