//! search 工具：模型可调用的网络搜索
//!
//! 参数为关键词列表（必填且非空）；handler 将关键词拼成查询串，
//! 按时间锚点决定时效过滤（锚点贴近墙钟用「一天内」，否则「一周内」并追加日期下界），
//! 向搜索提供方请求有限条数的结果，按固定形状序列化为 JSON 返回。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::provider::{Recency, SearchProvider};
use crate::tools::{Tool, ToolContext};

/// search 工具：持有提供方与结果上限
pub struct SearchTool {
    provider: Arc<dyn SearchProvider>,
    max_results: usize,
}

impl SearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>, max_results: usize) -> Self {
        Self {
            provider,
            max_results,
        }
    }

    fn keywords(args: &Value) -> Result<Vec<String>, String> {
        let list = args
            .get("keywords")
            .and_then(|v| v.as_array())
            .ok_or_else(|| "keywords must be an array of strings".to_string())?;

        let keywords: Vec<String> = list
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if keywords.len() != list.len() || keywords.is_empty() {
            // 空列表或含非字符串/空白项：绝不拿空查询去搜索
            return Err("keywords must be a non-empty array of non-empty strings".to_string());
        }
        Ok(keywords)
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "使用搜索引擎查询信息。可以搜索最新新闻、文章、博客等内容。"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "keywords": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "搜索的关键词列表。例如：['Python', '机器学习', '最新进展']。"
                }
            },
            "required": ["keywords"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        Self::keywords(args).map(|_| ())
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, String> {
        let keywords = Self::keywords(&args)?;
        let mut query = keywords.join(" ");

        // 锚点贴近墙钟时要最新结果；锚点偏旧时放宽到一周并给出日期下界
        let deviation = ctx.anchor.deviation_days(chrono::Local::now().naive_local());
        let recency = if deviation <= i64::from(ctx.max_deviation_days) {
            Recency::Day
        } else {
            query.push_str(&format!(" after:{}", ctx.anchor.date_string()));
            Recency::Week
        };

        tracing::info!(query = %query, recency = recency.as_param(), "search tool dispatch");

        let hits = self
            .provider
            .search(&query, recency, self.max_results)
            .await?;

        serde_json::to_string(&hits).map_err(|e| format!("Serialize results: {e}"))
    }
}
