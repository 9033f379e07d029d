//! Alias（別名）模組
//!
//! 比對玩家送出的命令；匹配時執行腳本，命令本身不再送往伺服器

use crate::profile::Matchable;

/// 別名定義
#[derive(Debug, Clone)]
pub struct Alias {
    /// 模式、腳本與匹配統計
    pub matcher: Matchable,
    /// 觸發時是否把原始命令回顯到輸出
    pub echo: bool,
}

impl Alias {
    /// 創建新的別名
    pub fn new(pattern: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            matcher: Matchable::new(pattern, script),
            echo: false,
        }
    }

    /// 設定回顯
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// 設定匹配後是否繼續評估
    pub fn keep_evaluating(mut self, value: bool) -> Self {
        self.matcher.keep_evaluating = value;
        self
    }

    /// 設定是否區分大小寫
    pub fn case_sensitive(mut self, value: bool) -> Self {
        self.matcher.set_case_sensitive(value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_builder() {
        let alias = Alias::new("^kk$", "send('kill kobold')")
            .with_echo(true)
            .keep_evaluating(true);
        assert!(alias.echo);
        assert!(alias.matcher.keep_evaluating);
        assert_eq!(alias.matcher.pattern(), "^kk$");
    }

    #[test]
    fn test_alias_with_parameter() {
        let mut alias = Alias::new(r"^go (\w+)$", "");
        let m = alias.matcher.match_at("go north", 0).unwrap().unwrap();
        assert_eq!(m.group(1), Some("north"));
        assert!(alias.matcher.match_at("gone", 0).unwrap().is_none());
    }
}
