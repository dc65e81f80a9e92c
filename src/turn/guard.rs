//! 时间一致性守卫
//!
//! 每次用户提交捕获一个时间锚点（TimeAnchor），本轮内它是「现在」的唯一事实来源：
//! 进入系统提示词约束模型，结束后对最终答案做事后文本校验。
//! 事后校验只做时间戳形状的正则扫描，不做语义判断 —— 嵌在其他格式里的时间会漏检，
//! 用户原话里的时间戳也会触发更正（按既定行为保留，见 DESIGN.md）。

use std::fmt;
use std::sync::OnceLock;

use chrono::{Local, NaiveDateTime};
use regex::Regex;

use crate::core::AgentError;

/// 锚点的规范文本格式
pub const ANCHOR_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 时间锚点：单次提交内「现在」的唯一事实，进入系统提示词后不再重算
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeAnchor(NaiveDateTime);

impl TimeAnchor {
    /// 按本地墙钟捕获锚点（每次提交调用一次）
    pub fn now() -> Self {
        Self(Local::now().naive_local())
    }

    /// 解析显式提供的锚点文本；不可解析即 MissingTimeAnchor
    pub fn parse(s: &str) -> Result<Self, AgentError> {
        NaiveDateTime::parse_from_str(s.trim(), ANCHOR_FORMAT)
            .map(Self)
            .map_err(|_| AgentError::MissingTimeAnchor(s.to_string()))
    }

    /// 锚点与给定时刻的偏差天数（绝对值）
    pub fn deviation_days(&self, from: NaiveDateTime) -> i64 {
        (from - self.0).num_days().abs()
    }

    /// 锚点所在日期（YYYY-MM-DD），用于搜索查询的日期下界
    pub fn date_string(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for TimeAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(ANCHOR_FORMAT))
    }
}

/// 时间戳形状：4 位年-2 位月-2 位日 时:分:秒
fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}").unwrap())
}

/// 时间一致性守卫：构造锚点指令块，并对最终答案做事后校验
#[derive(Clone, Debug)]
pub struct TimeGuard {
    /// 允许的最大时间偏差（天），默认 3
    pub max_deviation_days: u32,
}

impl Default for TimeGuard {
    fn default() -> Self {
        Self {
            max_deviation_days: 3,
        }
    }
}

impl TimeGuard {
    pub fn new(max_deviation_days: u32) -> Self {
        Self { max_deviation_days }
    }

    /// 构造带锚点约束的系统提示词
    ///
    /// 三条规则：声明锚点、时间敏感回答首行重述锚点、
    /// 偏差超限时指出矛盾而不是默默采用其中一方。
    pub fn system_prompt(&self, anchor: &TimeAnchor) -> String {
        format!(
            "当前时间锚点：{anchor}。\n\
             回答规则：\n\
             1. 本次对话中「现在」一律以上述时间锚点为准，不得自行推算或杜撰当前时间。\n\
             2. 涉及时间敏感内容时，回答的第一行必须重述该时间锚点。\n\
             3. 若上下文暗示的「当前时间」与锚点偏差超过 {} 天，必须明确指出该矛盾，\
             而不是默默采用其中一方。",
            self.max_deviation_days
        )
    }

    /// 事后校验：扫描答案中时间戳形状的子串，发现与锚点不一致的即返回更正附注
    ///
    /// 这是尽力而为的文本检查；未发现时间戳或全部一致时返回 None。
    pub fn validate(&self, answer: &str, anchor: &TimeAnchor) -> Option<String> {
        let canonical = anchor.to_string();
        let mismatch = timestamp_re()
            .find_iter(answer)
            .any(|m| m.as_str() != canonical);
        if mismatch {
            Some(format!(
                "\n\n[系统更正] 回答中出现与时间锚点不一致的时间戳，当前时间以 {canonical} 为准。"
            ))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> TimeAnchor {
        TimeAnchor::parse("2024-01-10 09:00:00").unwrap()
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(TimeAnchor::parse("昨天下午").is_err());
        assert!(TimeAnchor::parse("2024-01-10").is_err());
        assert!(TimeAnchor::parse(" 2024-01-10 09:00:00 ").is_ok());
    }

    #[test]
    fn system_prompt_states_anchor_and_deviation() {
        let guard = TimeGuard::new(3);
        let prompt = guard.system_prompt(&anchor());
        assert!(prompt.contains("2024-01-10 09:00:00"));
        assert!(prompt.contains("3 天"));
        assert!(prompt.contains("第一行"));
    }

    #[test]
    fn mismatched_timestamp_yields_notice() {
        let guard = TimeGuard::default();
        let notice = guard.validate("现在是 2023-05-01 12:00:00，天气晴。", &anchor());
        let notice = notice.expect("should produce a correction notice");
        assert!(notice.contains("2024-01-10 09:00:00"));
    }

    #[test]
    fn matching_timestamp_passes() {
        let guard = TimeGuard::default();
        assert!(guard
            .validate("2024-01-10 09:00:00 当前无降雨。", &anchor())
            .is_none());
    }

    #[test]
    fn no_timestamp_passes() {
        let guard = TimeGuard::default();
        assert!(guard.validate("今天天气不错。", &anchor()).is_none());
        // 非完全匹配的格式不触发（已知漏检限制）
        assert!(guard.validate("2024年1月10日 9点", &anchor()).is_none());
    }

    #[test]
    fn deviation_days_is_absolute() {
        let a = anchor();
        let later = TimeAnchor::parse("2024-01-20 09:00:00").unwrap();
        assert_eq!(a.deviation_days(later.naive()), 10);
        assert_eq!(later.deviation_days(a.naive()), 10);
    }
}
