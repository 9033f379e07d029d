//! 規則引擎
//!
//! 依優先序把玩家命令交給別名、把伺服器行交給觸發器，並在匹配時呼叫腳本。
//! 單一項目的模式錯誤或腳本錯誤只會被回報與標記，不會中斷整輪評估；
//! 是否繼續評估後面的項目只由 `keep_evaluating` 決定。

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::profile::{ItemId, ItemKind, MatchResult, Matchable, PatternError, Profile};
use crate::script::{source_excerpt, MudContext, ScriptContext, ScriptError, ScriptHost};

/// 規則引擎設定
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 腳本執行失敗時停用該項目
    pub disable_on_script_error: bool,
}

/// 分派時發生、需要顯示給使用者的錯誤
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuleError {
    #[error("{kind} '{item}': {error}")]
    Pattern {
        kind: ItemKind,
        item: String,
        error: PatternError,
    },

    #[error("{kind} '{item}' ({profile}) 腳本執行失敗: {error}")]
    Script {
        kind: ItemKind,
        item: String,
        profile: String,
        error: ScriptError,
        /// 出錯行附近的原始碼
        excerpt: Option<String>,
    },
}

impl RuleError {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Pattern { kind, .. } | Self::Script { kind, .. } => *kind,
        }
    }

    pub fn item(&self) -> &str {
        match self {
            Self::Pattern { item, .. } | Self::Script { item, .. } => item,
        }
    }
}

/// 別名與觸發器的分派器
#[derive(Debug)]
pub struct RuleEngine<S: ScriptHost> {
    profile: Profile,
    host: S,
    config: EngineConfig,
    errors: Vec<RuleError>,
    echoes: Vec<String>,
    /// 各計時器上次執行（或開始計時）的時間
    timer_clock: HashMap<ItemId, Instant>,
    /// 上次交給腳本宿主的變數
    synced_variables: Vec<(String, String)>,
}

impl<S: ScriptHost> RuleEngine<S> {
    pub fn new(profile: Profile, host: S) -> Self {
        Self::with_config(profile, host, EngineConfig::default())
    }

    pub fn with_config(profile: Profile, host: S, config: EngineConfig) -> Self {
        Self {
            profile,
            host,
            config,
            errors: Vec::new(),
            echoes: Vec::new(),
            timer_clock: HashMap::new(),
            synced_variables: Vec::new(),
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut Profile {
        &mut self.profile
    }

    pub fn host(&self) -> &S {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut S {
        &mut self.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    /// 取出累積的錯誤
    pub fn drain_errors(&mut self) -> Vec<RuleError> {
        std::mem::take(&mut self.errors)
    }

    /// 取出設定了回顯的別名所匹配的命令
    pub fn drain_echoes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.echoes)
    }

    /// 取出腳本留下的副作用
    pub fn drain_effects(&mut self) -> MudContext {
        self.host.drain_effects()
    }

    /// 把啟用中的變數項目交給腳本宿主
    pub fn sync_variables(&mut self) {
        self.synced_variables = self.enabled_variables();
        for (name, value) in &self.synced_variables {
            self.host.define_variable(name, value);
        }
    }

    /// 變數項目有變動（新增、刪除、改值、啟用狀態）時才重新同步
    fn refresh_variables(&mut self) {
        if self.enabled_variables() != self.synced_variables {
            debug!("變數已變動，重新同步");
            self.sync_variables();
        }
    }

    fn enabled_variables(&mut self) -> Vec<(String, String)> {
        let ids = self.profile.sorted_variables();
        let profile = &self.profile;
        ids.into_iter()
            .filter(|id| profile.is_enabled(*id))
            .filter_map(|id| {
                let item = profile.get(id)?;
                let variable = item.as_variable()?;
                Some((item.name().to_string(), variable.value.as_text()))
            })
            .collect()
    }

    /// 以按鍵名稱尋找快捷鍵對應的命令
    pub fn accelerator_command(&mut self, keys: &str) -> Option<String> {
        let ids = self.profile.sorted_accelerators();
        let profile = &self.profile;
        ids.into_iter()
            .filter(|id| profile.is_enabled(*id))
            .find_map(|id| {
                profile
                    .get(id)?
                    .as_accelerator()
                    .filter(|a| a.keys.eq_ignore_ascii_case(keys))
                    .map(|a| a.command.clone())
            })
    }

    /// 執行到期的計時器，返回執行的數量
    ///
    /// 新出現或重新啟用的計時器從 `now` 開始計時。
    pub fn tick(&mut self, now: Instant) -> usize {
        self.refresh_variables();
        let timers = self.profile.sorted_timers();
        self.timer_clock.retain(|id, _| timers.contains(id));

        let mut fired = 0;
        for id in timers {
            if !self.profile.is_enabled(id) {
                self.timer_clock.remove(&id);
                continue;
            }
            let Some(timer) = self.profile.get(id).and_then(|item| item.as_timer()) else {
                continue;
            };
            let interval = timer.interval;
            let script = timer.script.clone();

            let started = *self.timer_clock.entry(id).or_insert(now);
            if interval.is_zero() || now.saturating_duration_since(started) < interval {
                continue;
            }
            self.timer_clock.insert(id, now);
            self.fire(id, ItemKind::Timer, &MatchResult::default(), &script, "");
            fired += 1;
        }
        fired
    }

    /// 以別名處理玩家命令
    ///
    /// 返回 `true` 表示至少有一個別名匹配，命令不應再原樣送出。
    pub fn process_command(&mut self, text: &str) -> bool {
        self.refresh_variables();
        let mut handled = false;

        for id in self.profile.sorted_aliases() {
            if !self.profile.is_enabled(id) {
                continue;
            }
            let Some(alias) = self.profile.alias_mut(id) else {
                continue;
            };
            let result = alias.matcher.match_at(text, 0);
            let keep_evaluating = alias.matcher.keep_evaluating;
            let echo = alias.echo;
            let script = alias.matcher.script.clone();

            let captures = match result {
                Ok(Some(captures)) => captures,
                Ok(None) => continue,
                Err(e) => {
                    self.report_pattern_error(id, ItemKind::Alias, e);
                    continue;
                }
            };

            handled = true;
            if echo {
                self.echoes.push(text.to_string());
            }
            self.fire(id, ItemKind::Alias, &captures, &script, text);

            if !keep_evaluating {
                break;
            }
        }

        handled
    }

    /// 以觸發器處理伺服器送來的一行
    ///
    /// 返回該行是否仍應顯示（任一觸發器設定 omit 並成功執行即不顯示）。
    pub fn process_line(&mut self, text: &str) -> bool {
        self.refresh_variables();
        let mut omitted = false;

        for id in self.profile.sorted_triggers() {
            if !self.profile.is_enabled(id) {
                continue;
            }
            let Some(trigger) = self.profile.get(id).and_then(|item| item.as_trigger()) else {
                continue;
            };
            let omit = trigger.omit;
            let repeat = trigger.repeat;
            let script = trigger.matcher.script.clone();
            let mut keep_evaluating = trigger.matcher.keep_evaluating;

            let mut matched = false;
            let mut pos = 0;
            while pos < text.len() {
                let Some(trigger) = self.profile.trigger_mut(id) else {
                    break;
                };
                let captures = match trigger.matcher.match_at(text, pos) {
                    Ok(Some(captures)) => captures,
                    Ok(None) => break,
                    Err(e) => {
                        self.report_pattern_error(id, ItemKind::Trigger, e);
                        break;
                    }
                };

                matched = true;
                if !self.fire(id, ItemKind::Trigger, &captures, &script, text) {
                    // 只影響這一輪，項目本身的設定不變
                    keep_evaluating = false;
                    break;
                }
                if omit {
                    omitted = true;
                }
                if !repeat {
                    break;
                }
                pos = next_scan_position(text, &captures);
            }

            if matched && !keep_evaluating {
                break;
            }
        }

        !omitted
    }

    /// 在項目所屬群組的上下文中執行腳本；返回是否成功
    fn fire(&mut self, id: ItemId, kind: ItemKind, captures: &MatchResult, script: &str, input: &str) -> bool {
        let previous = self.profile.active_group();
        let owner = self
            .profile
            .get(id)
            .and_then(|item| item.parent())
            .unwrap_or_else(|| self.profile.root());
        if let Err(e) = self.profile.set_active_group(owner) {
            warn!("無法切換作用群組: {}", e);
        }

        self.host.save_captures(captures);
        let item_name = self.profile.get(id).map(|i| i.name().to_string()).unwrap_or_default();
        let group_name = self.profile.get(owner).map(|i| i.name().to_string()).unwrap_or_default();
        let context = ScriptContext {
            kind,
            item: &item_name,
            group: &group_name,
            profile: self.profile.name(),
            input,
        };
        let result = self.host.execute(script, &context);

        if let Err(e) = self.profile.set_active_group(previous) {
            warn!("無法還原作用群組: {}", e);
        }

        match result {
            Ok(()) => {
                debug!("{} '{}' 已觸發", kind, item_name);
                if let Some(matcher) = self.matcher_mut(id, kind) {
                    matcher.clear_failure();
                }
                true
            }
            Err(e) => {
                error!("{} '{}' 腳本執行失敗: {}", kind, item_name, e);
                if let Some(matcher) = self.matcher_mut(id, kind) {
                    matcher.mark_failed(e.to_string());
                }
                if self.config.disable_on_script_error {
                    if let Err(err) = self.profile.set_enabled(id, false) {
                        warn!("無法停用項目: {}", err);
                    }
                }
                let excerpt = e.line().and_then(|line| source_excerpt(script, line));
                self.errors.push(RuleError::Script {
                    kind,
                    item: item_name,
                    profile: self.profile.name().to_string(),
                    error: e,
                    excerpt,
                });
                false
            }
        }
    }

    fn report_pattern_error(&mut self, id: ItemId, kind: ItemKind, error: PatternError) {
        let item = self.profile.get(id).map(|i| i.name().to_string()).unwrap_or_default();
        warn!("{} '{}' 模式無法編譯: {}", kind, item, error);
        self.errors.push(RuleError::Pattern { kind, item, error });
    }

    fn matcher_mut(&mut self, id: ItemId, kind: ItemKind) -> Option<&mut Matchable> {
        match kind {
            ItemKind::Alias => self.profile.alias_mut(id).map(|a| &mut a.matcher),
            ItemKind::Trigger => self.profile.trigger_mut(id).map(|t| &mut t.matcher),
            _ => None,
        }
    }
}

/// 重複掃描的下一個位置；空匹配時越過匹配處的一個字元，同一位置不會匹配兩次
fn next_scan_position(text: &str, captures: &MatchResult) -> usize {
    if captures.end > captures.start {
        return captures.end;
    }
    let step = text
        .get(captures.end..)
        .and_then(|rest| rest.chars().next())
        .map(char::len_utf8)
        .unwrap_or(1);
    captures.end + step
}
