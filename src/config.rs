//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SPARROW__*` 覆盖
//! （双下划线表示嵌套，如 `SPARROW__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub guard: GuardSection,
    #[serde(default)]
    pub ui: UiSection,
}

/// [llm] 段：后端选择与采样参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// 停止序列，可选
    pub stop: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            temperature: 0.7,
            max_tokens: 2048,
            stop: None,
        }
    }
}

/// [tools] 段：工具超时与 search 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub search: SearchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            search: SearchSection::default(),
        }
    }
}

/// [tools.search] 段：搜索地区、安全等级、结果上限与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub region: String,
    pub safesearch: bool,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            region: "cn-zh".to_string(),
            safesearch: true,
            max_results: 5,
            timeout_secs: 15,
        }
    }
}

/// [guard] 段：时间一致性守卫
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardSection {
    /// 允许的最大时间偏差（天）
    pub max_deviation_days: u32,
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            max_deviation_days: 3,
        }
    }
}

/// [ui] 段：消费端轮询节奏
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiSection {
    pub poll_interval_ms: u64,
}

impl Default for UiSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SPARROW__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SPARROW__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SPARROW")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
