//! 搜索提供方
//!
//! SearchProvider 是对外部搜索服务的接口边界：查询串 + 时效过滤 + 结果上限，
//! 返回固定形状的 {title, url, snippet} 列表。
//! DuckDuckGo 实现走 HTML 端点（无需 API Key），用正则抽取结果并去除标签；
//! 地区与安全等级在构造时确定。

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// 时效过滤窗口（映射到 DuckDuckGo 的 df 参数）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recency {
    Day,
    Week,
}

impl Recency {
    pub fn as_param(&self) -> &'static str {
        match self {
            Recency::Day => "d",
            Recency::Week => "w",
        }
    }
}

/// 单条搜索结果
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// 搜索服务接口（具体提供方在此边界之外）
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        recency: Recency,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, String>;
}

/// DuckDuckGo HTML 端点客户端
pub struct DuckDuckGo {
    client: reqwest::Client,
    region: String,
    safesearch: bool,
}

const DDG_HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

fn result_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#).unwrap()
    })
}

fn result_snippet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#).unwrap()
    })
}

/// 去除 HTML 标签并折叠空白
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    decode_entities(&out)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 还原结果文本中常见的 HTML 实体
fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// DDG 结果链接是 //duckduckgo.com/l/?uddg=<编码后真实地址> 形式的跳转，解出真实 URL
fn resolve_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    if let Ok(url) = reqwest::Url::parse(&absolute) {
        if let Some((_, real)) = url.query_pairs().find(|(k, _)| k == "uddg") {
            return real.into_owned();
        }
    }
    absolute
}

impl DuckDuckGo {
    pub fn new(region: impl Into<String>, safesearch: bool, timeout_secs: u64) -> Self {
        // 使用现代浏览器 UA，避免被端点识别为爬虫
        const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            region: region.into(),
            safesearch,
        }
    }

    fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
        let snippets: Vec<String> = result_snippet_re()
            .captures_iter(html)
            .map(|c| strip_html_tags(&c[1]))
            .collect();

        result_link_re()
            .captures_iter(html)
            .enumerate()
            .take(max_results)
            .map(|(i, c)| SearchHit {
                title: strip_html_tags(&c[2]),
                url: resolve_redirect(&c[1]),
                snippet: snippets.get(i).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGo {
    async fn search(
        &self,
        query: &str,
        recency: Recency,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, String> {
        let kp = if self.safesearch { "1" } else { "-2" };
        let resp = self
            .client
            .get(DDG_HTML_ENDPOINT)
            .query(&[
                ("q", query),
                ("kl", self.region.as_str()),
                ("kp", kp),
                ("df", recency.as_param()),
            ])
            .send()
            .await
            .map_err(|e| format!("Search request failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("Search HTTP {}", resp.status()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| format!("Search read body: {e}"))?;

        Ok(Self::parse_results(&body, max_results))
    }
}
