//! 会话编排器：并发桥接
//!
//! 负责：按配置创建 LLM/工具/守卫，建立 cmd/event 双通道，在后台任务中消费用户命令，
//! 每次提交在独立任务里驱动编排循环（阻塞性网络 I/O 都发生在那里），
//! 事件经单条 FIFO 队列按产生顺序交给消费端。
//! 保证：同一会话同时至多一次运行（in_flight 标志）；任何失败（含 panic）都被
//! 转为一个 Error 事件加一个 Complete 事件，绝不静默挂起。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::config::AppConfig;
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient, SamplingParams};
use crate::memory::{Message, MessageLog};
use crate::tools::{DuckDuckGo, SearchTool, ToolRegistry};
use crate::turn::{run_turn, AgentEvent, TimeGuard, TurnDeps};

/// 从消费端发往编排器的用户命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 提交用户输入，触发一次运行；anchor 为显式时间锚点文本（通常为 None，按墙钟捕获）
    Submit {
        question: String,
        anchor: Option<String>,
    },
    /// 退出会话
    Quit,
}

struct SessionState {
    log: Mutex<MessageLog>,
}

/// 会话句柄：提交入口与运行中标志
///
/// in_flight 是工作者与消费端共享的唯一可变状态；消息日志只由工作者写入，
/// 消费端仅在运行结束后读取展示。
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    in_flight: Arc<AtomicBool>,
    state: Arc<SessionState>,
}

impl SessionHandle {
    /// 当前是否有运行在途（在途期间提交被拒绝）
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// 提交一个问题；在途或会话已关闭时返回 false 且不产生任何副作用
    pub fn submit(&self, question: impl Into<String>, anchor: Option<String>) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let sent = self
            .cmd_tx
            .send(Command::Submit {
                question: question.into(),
                anchor,
            })
            .is_ok();
        if !sent {
            self.in_flight.store(false, Ordering::Release);
        }
        sent
    }

    pub fn quit(&self) {
        let _ = self.cmd_tx.send(Command::Quit);
    }

    /// 消息日志快照（运行结束后供展示/检查）
    pub async fn history(&self) -> Vec<Message> {
        self.state.log.lock().await.snapshot().to_vec()
    }
}

/// 创建会话：返回句柄与事件接收端；后台任务消费命令并按序推送事件
///
/// 依赖（LLM 客户端、工具、守卫、采样参数）由调用方显式构造注入，无进程级单例。
pub fn create_session(deps: TurnDeps) -> (SessionHandle, mpsc::UnboundedReceiver<AgentEvent>) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<AgentEvent>();

    let in_flight = Arc::new(AtomicBool::new(false));
    let state = Arc::new(SessionState {
        log: Mutex::new(MessageLog::new()),
    });

    let deps = Arc::new(deps);
    let worker_flag = in_flight.clone();
    let worker_state = state.clone();

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                Command::Submit { question, anchor } => {
                    let _ = event_tx.send(AgentEvent::Started);

                    let run_deps = deps.clone();
                    let state = worker_state.clone();
                    let tx = event_tx.clone();
                    // 单独任务承接本次运行，panic 被 JoinError 捕获
                    let run = tokio::spawn(async move {
                        let mut log = state.log.lock().await;
                        run_turn(&run_deps, &mut log, &question, anchor.as_deref(), &tx).await
                    });

                    match run.await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            let _ = event_tx.send(AgentEvent::Error {
                                text: e.to_string(),
                            });
                        }
                        Err(join_err) => {
                            tracing::error!(error = %join_err, "worker run crashed");
                            let _ = event_tx.send(AgentEvent::Error {
                                text: format!("内部错误：{join_err}"),
                            });
                        }
                    }

                    let (prompt, completion, total) = deps.llm.token_usage();
                    tracing::debug!(prompt, completion, total, "cumulative token usage");

                    let _ = event_tx.send(AgentEvent::Complete);
                    worker_flag.store(false, Ordering::Release);
                }
                Command::Quit => break,
            }
        }
    });

    (
        SessionHandle {
            cmd_tx,
            in_flight,
            state,
        },
        event_rx,
    )
}

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        tracing::info!("Using DeepSeek LLM ({})", cfg.llm.model);
        Arc::new(create_deepseek_client(Some(&cfg.llm.model)))
    } else if use_openai {
        tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    }
}

/// 按配置组装全套依赖并创建会话
pub fn create_session_from_config(
    cfg: &AppConfig,
) -> (SessionHandle, mpsc::UnboundedReceiver<AgentEvent>) {
    let llm = create_llm_from_config(cfg);

    let provider = Arc::new(DuckDuckGo::new(
        cfg.tools.search.region.clone(),
        cfg.tools.search.safesearch,
        cfg.tools.search.timeout_secs,
    ));
    let mut tools = ToolRegistry::new(cfg.tools.tool_timeout_secs);
    tools.register(SearchTool::new(provider, cfg.tools.search.max_results));

    let deps = TurnDeps {
        llm,
        tools: Arc::new(tools),
        guard: TimeGuard::new(cfg.guard.max_deviation_days),
        params: SamplingParams {
            temperature: cfg.llm.temperature,
            max_tokens: cfg.llm.max_tokens,
            stop: cfg.llm.stop.clone(),
        },
    };
    create_session(deps)
}
