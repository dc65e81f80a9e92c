//! 控制台消费循环
//!
//! 读取用户输入并提交给编排器，然后按固定间隔轮询事件队列：
//! 一次取空当前可用事件，相邻同类的 Reasoning / Answer 合并为一次渲染（不改变顺序），
//! 思考通道灰显、答案通道正常、错误红显；观察到 Complete 后重新开放输入。

use std::io::Write as _;
use std::time::Duration;

use crossterm::style::Stylize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::core::SessionHandle;
use crate::turn::AgentEvent;

/// 将相邻的同类 Reasoning / Answer 事件合并为一个，减少渲染次数且不重排
pub fn coalesce(events: Vec<AgentEvent>) -> Vec<AgentEvent> {
    let mut out: Vec<AgentEvent> = Vec::with_capacity(events.len());
    for ev in events {
        match (out.last_mut(), &ev) {
            (Some(AgentEvent::Reasoning { text: acc }), AgentEvent::Reasoning { text }) => {
                acc.push_str(text);
            }
            (Some(AgentEvent::Answer { text: acc }), AgentEvent::Answer { text }) => {
                acc.push_str(text);
            }
            _ => out.push(ev),
        }
    }
    out
}

/// 渲染单个事件；返回是否观察到 Complete
fn render(ev: &AgentEvent) -> bool {
    match ev {
        AgentEvent::Started => {
            println!("{}", "sparrow:".bold());
        }
        AgentEvent::Reasoning { text } => {
            print!("{}", text.as_str().dark_grey());
        }
        AgentEvent::Answer { text } => {
            print!("{text}");
        }
        AgentEvent::Final { .. } => {
            // 内容已随 Answer 片段流式输出，这里只收尾换行
            println!();
        }
        AgentEvent::Error { text } => {
            println!("{}", format!("错误：{text}").red());
        }
        AgentEvent::Complete => {
            println!();
            return true;
        }
    }
    let _ = std::io::stdout().flush();
    false
}

async fn read_line(prompt: &str) -> anyhow::Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let line = tokio::task::spawn_blocking(|| {
        let mut buf = String::new();
        std::io::stdin().read_line(&mut buf).map(|_| buf)
    })
    .await??;
    Ok(line)
}

/// 运行控制台主循环：提交 -> 轮询渲染直到 Complete -> 再次开放输入
pub async fn run_app(
    handle: SessionHandle,
    mut event_rx: mpsc::UnboundedReceiver<AgentEvent>,
    poll_interval: Duration,
) -> anyhow::Result<()> {
    loop {
        let input = read_line("你: ").await?;
        let input = input.trim().to_string();
        if input.is_empty() {
            continue;
        }
        if matches!(
            input.to_lowercase().as_str(),
            "/exit" | "exit" | "/quit" | "quit"
        ) {
            handle.quit();
            break;
        }
        if !handle.submit(input, None) {
            println!("{}", "上一次请求仍在进行中".dark_yellow());
            continue;
        }

        let mut interval = tokio::time::interval(poll_interval);
        'run: loop {
            interval.tick().await;
            let mut batch = Vec::new();
            loop {
                match event_rx.try_recv() {
                    Ok(ev) => batch.push(ev),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return Ok(()),
                }
            }
            for ev in coalesce(batch) {
                if render(&ev) {
                    break 'run;
                }
            }
        }
    }
    Ok(())
}
