//! Sparrow - Rust 流式搜索问答引擎
//!
//! 入口：初始化日志、加载配置、创建会话并运行控制台主循环。

use std::time::Duration;

use anyhow::Context;
use sparrow::config::{load_config, AppConfig};
use sparrow::core::create_session_from_config;
use sparrow::ui::run_app;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with(fmt::layer())
        .init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let poll_interval = Duration::from_millis(cfg.ui.poll_interval_ms);

    // 创建会话：返回提交句柄与事件接收端
    let (handle, event_rx) = create_session_from_config(&cfg);

    // 控制台主循环（提交输入，轮询并渲染事件）
    run_app(handle, event_rx, poll_interval)
        .await
        .context("App run failed")?;

    Ok(())
}
