//! 可匹配項目（別名與觸發器共用）
//!
//! 模式以正則表達式撰寫，第一次匹配時才編譯並快取；編譯失敗只影響該項目本身。

use std::collections::BTreeMap;

use regex::{Captures, Regex, RegexBuilder};
use thiserror::Error;

/// 模式編譯錯誤
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("無效的匹配模式 `{pattern}`: {message}")]
pub struct PatternError {
    pub pattern: String,
    /// regex 的錯誤訊息，語法錯誤時包含出錯位置
    pub message: String,
}

/// 一次成功匹配的結果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchResult {
    /// 索引 0 為整段匹配，其後為各捕獲組（未參與匹配者為 None）
    pub captures: Vec<Option<String>>,
    /// 具名捕獲組
    pub named: BTreeMap<String, String>,
    /// 整段匹配在原文中的位元組起點
    pub start: usize,
    /// 整段匹配在原文中的位元組終點
    pub end: usize,
}

impl MatchResult {
    fn from_captures(regex: &Regex, caps: &Captures<'_>) -> Option<Self> {
        let whole = caps.get(0)?;
        let captures = caps
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();
        let named = regex
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();

        Some(Self {
            captures,
            named,
            start: whole.start(),
            end: whole.end(),
        })
    }

    /// 整段匹配的文字
    pub fn matched_text(&self) -> &str {
        self.group(0).unwrap_or("")
    }

    /// 第 `index` 個捕獲組
    pub fn group(&self, index: usize) -> Option<&str> {
        self.captures.get(index).and_then(|c| c.as_deref())
    }
}

/// 別名與觸發器共用的匹配狀態
#[derive(Debug, Clone)]
pub struct Matchable {
    pattern: String,
    case_sensitive: bool,
    /// 匹配後是否繼續評估後續項目
    pub keep_evaluating: bool,
    /// 匹配時交給腳本引擎執行的內容
    pub script: String,
    compiled: Option<Regex>,
    failure: Option<String>,
    last_match: Option<MatchResult>,
    match_count: u64,
    eval_count: u64,
}

impl Matchable {
    pub fn new(pattern: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive: true,
            keep_evaluating: false,
            script: script.into(),
            compiled: None,
            failure: None,
            last_match: None,
            match_count: 0,
            eval_count: 0,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// 更換模式；清除已編譯的快取與失敗標記
    pub fn set_pattern(&mut self, pattern: impl Into<String>) {
        self.pattern = pattern.into();
        self.compiled = None;
        self.failure = None;
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn set_case_sensitive(&mut self, value: bool) {
        if self.case_sensitive != value {
            self.case_sensitive = value;
            self.compiled = None;
        }
    }

    /// 編譯模式（已編譯則直接返回快取）
    pub fn compile(&mut self) -> Result<&Regex, PatternError> {
        if self.compiled.is_none() {
            let regex = RegexBuilder::new(&self.pattern)
                .case_insensitive(!self.case_sensitive)
                .build()
                .map_err(|e| PatternError {
                    pattern: self.pattern.clone(),
                    message: e.to_string(),
                })?;
            self.compiled = Some(regex);
        }
        self.compiled.as_ref().ok_or_else(|| PatternError {
            pattern: self.pattern.clone(),
            message: "pattern not compiled".to_string(),
        })
    }

    /// 從 `pos`（位元組位置）開始嘗試匹配
    ///
    /// 每次呼叫都會增加評估次數；編譯失敗時標記為失敗並返回錯誤。
    pub fn match_at(&mut self, text: &str, pos: usize) -> Result<Option<MatchResult>, PatternError> {
        self.eval_count += 1;

        let regex = match self.compile() {
            Ok(regex) => regex,
            Err(e) => {
                self.failure = Some(e.to_string());
                return Err(e);
            }
        };

        if pos > text.len() {
            return Ok(None);
        }
        let result = regex
            .captures_at(text, pos)
            .and_then(|caps| MatchResult::from_captures(regex, &caps));

        if let Some(m) = &result {
            self.match_count += 1;
            self.last_match = Some(m.clone());
        }
        Ok(result)
    }

    /// 標記為失敗（供檢視，不會停用項目）
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
    }

    pub fn clear_failure(&mut self) {
        self.failure = None;
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// 最近一次失敗的原因
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn last_match(&self) -> Option<&MatchResult> {
        self.last_match.as_ref()
    }

    pub fn match_count(&self) -> u64 {
        self.match_count
    }

    pub fn eval_count(&self) -> u64 {
        self.eval_count
    }
}
