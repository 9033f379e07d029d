//! Trigger（觸發器）模組
//!
//! 比對伺服器送來的每一行文字

use crate::profile::Matchable;

/// 觸發器匹配模式
///
/// 非正則的模式會被轉成等價的正則表達式。
#[derive(Debug, Clone)]
pub enum TriggerPattern {
    /// 純文字匹配（包含）
    Contains(String),
    /// 純文字匹配（開頭）
    StartsWith(String),
    /// 純文字匹配（結尾）
    EndsWith(String),
    /// 正則表達式
    Regex(String),
}

impl TriggerPattern {
    /// 轉為正則表達式原始碼
    pub fn to_regex(&self) -> String {
        match self {
            Self::Contains(s) => regex::escape(s),
            Self::StartsWith(s) => format!("^{}", regex::escape(s)),
            Self::EndsWith(s) => format!("{}$", regex::escape(s)),
            Self::Regex(re) => re.clone(),
        }
    }
}

/// 觸發器定義
#[derive(Debug, Clone)]
pub struct Trigger {
    /// 模式、腳本與匹配統計
    pub matcher: Matchable,
    /// 匹配後不顯示該行
    pub omit: bool,
    /// 匹配後從匹配結尾繼續掃描同一行
    pub repeat: bool,
}

impl Trigger {
    /// 以正則表達式創建觸發器
    pub fn new(pattern: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            matcher: Matchable::new(pattern, script),
            omit: false,
            repeat: false,
        }
    }

    /// 以 [`TriggerPattern`] 創建觸發器
    pub fn with_pattern(pattern: &TriggerPattern, script: impl Into<String>) -> Self {
        Self::new(pattern.to_regex(), script)
    }

    pub fn omit(mut self, value: bool) -> Self {
        self.omit = value;
        self
    }

    pub fn repeat(mut self, value: bool) -> Self {
        self.repeat = value;
        self
    }

    pub fn keep_evaluating(mut self, value: bool) -> Self {
        self.matcher.keep_evaluating = value;
        self
    }

    pub fn case_sensitive(mut self, value: bool) -> Self {
        self.matcher.set_case_sensitive(value);
        self
    }
}
