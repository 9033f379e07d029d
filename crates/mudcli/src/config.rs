//! 設定檔持久化模組
//!
//! - `ClientConfig`: 連線、編碼、GMCP、日誌與腳本設定
//! - `GroupConfig`: 可序列化的群組樹，載入時轉成 `mudcore::Profile`

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mudcore::telnet::GmcpConfig;
use mudcore::{
    Accelerator, Alias, EngineConfig, Group, ItemId, Profile, ProfileError, SessionConfig,
    TextEncoding, Timer, Trigger, TriggerPattern, Variable, VariableValue,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 設定檔錯誤
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("讀寫設定檔失敗: {0}")]
    Io(#[from] std::io::Error),

    #[error("設定檔格式錯誤: {0}")]
    Json(#[from] serde_json::Error),

    #[error("建立 Profile 失敗: {0}")]
    Profile(#[from] ProfileError),
}

// ============================================================================
// 項目設定
// ============================================================================

/// 別名設定（可序列化版本）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AliasConfig {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub script: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub keep_evaluating: bool,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    #[serde(default)]
    pub echo: bool,
}

/// 觸發器的模式寫法
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Regex,
    Contains,
    StartsWith,
    EndsWith,
}

/// 觸發器設定（可序列化版本）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriggerConfig {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub script: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub keep_evaluating: bool,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    #[serde(default)]
    pub omit: bool,
    #[serde(default)]
    pub repeat: bool,
}

/// 計時器設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    pub name: String,
    pub interval_ms: u64,
    #[serde(default)]
    pub script: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: Option<i32>,
}

/// 變數設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableConfig {
    pub name: String,
    pub value: VariableValue,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: Option<i32>,
}

/// 快捷鍵設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceleratorConfig {
    pub name: String,
    pub keys: String,
    pub command: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: Option<i32>,
}

/// 群組設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub aliases: Vec<AliasConfig>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    #[serde(default)]
    pub timers: Vec<TimerConfig>,
    #[serde(default)]
    pub variables: Vec<VariableConfig>,
    #[serde(default)]
    pub accelerators: Vec<AcceleratorConfig>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            enabled: true,
            priority: None,
            groups: Vec::new(),
            aliases: Vec::new(),
            triggers: Vec::new(),
            timers: Vec::new(),
            variables: Vec::new(),
            accelerators: Vec::new(),
        }
    }
}

impl GroupConfig {
    /// 以此設定為根建立 Profile
    pub fn build_profile(&self) -> Result<Profile, ConfigError> {
        let mut profile = Profile::new(self.name.clone());
        let root = profile.root();
        profile.set_enabled(root, self.enabled)?;
        self.populate(&mut profile, root)?;
        Ok(profile)
    }

    /// 把子項目加入 `group`
    fn populate(&self, profile: &mut Profile, group: ItemId) -> Result<(), ConfigError> {
        for config in &self.aliases {
            let alias = Alias::new(&config.pattern, &config.script)
                .with_echo(config.echo)
                .keep_evaluating(config.keep_evaluating)
                .case_sensitive(config.case_sensitive);
            let id = profile.add_child(group, &config.name, alias)?;
            apply_flags(profile, id, config.enabled, config.priority)?;
        }

        for config in &self.triggers {
            let pattern = match config.match_type {
                MatchType::Regex => TriggerPattern::Regex(config.pattern.clone()),
                MatchType::Contains => TriggerPattern::Contains(config.pattern.clone()),
                MatchType::StartsWith => TriggerPattern::StartsWith(config.pattern.clone()),
                MatchType::EndsWith => TriggerPattern::EndsWith(config.pattern.clone()),
            };
            let trigger = Trigger::with_pattern(&pattern, &config.script)
                .omit(config.omit)
                .repeat(config.repeat)
                .keep_evaluating(config.keep_evaluating)
                .case_sensitive(config.case_sensitive);
            let id = profile.add_child(group, &config.name, trigger)?;
            apply_flags(profile, id, config.enabled, config.priority)?;
        }

        for config in &self.timers {
            let timer = Timer::new(Duration::from_millis(config.interval_ms), &config.script);
            let id = profile.add_child(group, &config.name, timer)?;
            apply_flags(profile, id, config.enabled, config.priority)?;
        }

        for config in &self.variables {
            let id = profile.add_child(group, &config.name, Variable::new(config.value.clone()))?;
            apply_flags(profile, id, config.enabled, config.priority)?;
        }

        for config in &self.accelerators {
            let accelerator = Accelerator::new(&config.keys, &config.command);
            let id = profile.add_child(group, &config.name, accelerator)?;
            apply_flags(profile, id, config.enabled, config.priority)?;
        }

        for child in &self.groups {
            let id = profile.add_child(group, &child.name, Group::new())?;
            apply_flags(profile, id, child.enabled, child.priority)?;
            child.populate(profile, id)?;
        }
        Ok(())
    }
}

fn apply_flags(profile: &mut Profile, id: ItemId, enabled: bool, priority: Option<i32>) -> Result<(), ConfigError> {
    profile.set_enabled(id, enabled)?;
    if let Some(priority) = priority {
        profile.set_priority(id, priority)?;
    }
    Ok(())
}

// ============================================================================
// 客戶端設定
// ============================================================================

/// 連線設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 7777,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// 客戶端完整設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub encoding: TextEncoding,
    #[serde(default)]
    pub force_go_ahead_off: bool,
    #[serde(default)]
    pub gmcp: GmcpConfig,
    /// 未設定 RUST_LOG 時使用的日誌過濾
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// 原始位元組追蹤檔案
    #[serde(default)]
    pub wire_trace: Option<PathBuf>,
    #[serde(default)]
    pub disable_on_script_error: bool,
    /// 具名腳本，項目中以 `@name` 引用
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub profile: GroupConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            encoding: TextEncoding::default(),
            force_go_ahead_off: false,
            gmcp: GmcpConfig::default(),
            log_filter: default_log_filter(),
            wire_trace: None,
            disable_on_script_error: false,
            scripts: BTreeMap::new(),
            profile: GroupConfig::default(),
        }
    }
}

impl ClientConfig {
    /// 預設設定檔路徑
    pub fn config_path() -> PathBuf {
        config_dir().join("config.json")
    }

    /// 從檔案載入；檔案不存在時使用預設值
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 儲存到檔案
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        ensure_parent_dir(path)?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 會話層設定
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            encoding: self.encoding,
            force_go_ahead_off: self.force_go_ahead_off,
            gmcp: self.gmcp.clone(),
            engine: EngineConfig {
                disable_on_script_error: self.disable_on_script_error,
            },
        }
    }
}

/// 獲取設定目錄
pub fn config_dir() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir.join("mudcli"),
        None => PathBuf::from("."),
    }
}

/// 確保目錄存在
fn ensure_parent_dir(path: &Path) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mudcore::ItemKind;

    const SAMPLE: &str = r#"{
        "connection": { "host": "mud.example.org", "port": 4000 },
        "encoding": "big5",
        "profile": {
            "name": "main",
            "aliases": [
                { "name": "kk", "pattern": "^kk (\\w+)$", "script": "mud.send('kill ' .. matches[2])", "priority": 10 }
            ],
            "groups": [
                {
                    "name": "combat",
                    "enabled": false,
                    "triggers": [
                        { "name": "flee", "pattern": "你受傷了", "match_type": "contains", "omit": true }
                    ],
                    "timers": [
                        { "name": "save", "interval_ms": 60000, "script": "mud.send('save')" }
                    ]
                }
            ],
            "variables": [ { "name": "target", "value": "orc" } ],
            "accelerators": [ { "name": "heal", "keys": "F1", "command": "cast heal" } ]
        }
    }"#;

    #[test]
    fn test_defaults() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.connection.port, 7777);
        assert_eq!(config.encoding, TextEncoding::Utf8);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.profile.name, "default");
    }

    #[test]
    fn test_build_profile() {
        let config: ClientConfig = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(config.encoding, TextEncoding::Big5);

        let profile = config.profile.build_profile().unwrap();
        assert_eq!(profile.name(), "main");

        let kk = profile.find_path("kk", ItemKind::Alias).unwrap();
        assert_eq!(profile.get(kk).unwrap().priority(), 10);

        let flee = profile.find_path("combat/flee", ItemKind::Trigger).unwrap();
        let trigger = profile.get(flee).unwrap().as_trigger().unwrap();
        assert!(trigger.omit);
        assert_eq!(trigger.matcher.pattern(), "你受傷了");
        assert!(!profile.is_enabled(flee));

        let save = profile.find_path("combat/save", ItemKind::Timer).unwrap();
        assert_eq!(
            profile.get(save).unwrap().as_timer().unwrap().interval,
            Duration::from_secs(60)
        );
        assert!(profile.find_path("target", ItemKind::Variable).is_some());
        assert!(profile.find_path("heal", ItemKind::Accelerator).is_some());
    }

    #[test]
    fn test_variable_and_accelerator_flags() {
        let json = r#"{
            "name": "main",
            "variables": [
                { "name": "target", "value": "orc", "enabled": false },
                { "name": "hp", "value": 100, "priority": 5 }
            ],
            "accelerators": [
                { "name": "heal", "keys": "F1", "command": "cast heal", "enabled": false, "priority": 20 }
            ]
        }"#;
        let group: GroupConfig = serde_json::from_str(json).unwrap();
        let profile = group.build_profile().unwrap();

        let target = profile.find_path("target", ItemKind::Variable).unwrap();
        assert!(!profile.is_enabled(target));
        let hp = profile.find_path("hp", ItemKind::Variable).unwrap();
        assert!(profile.is_enabled(hp));
        assert_eq!(profile.get(hp).unwrap().priority(), 5);

        let heal = profile.find_path("heal", ItemKind::Accelerator).unwrap();
        assert!(!profile.is_enabled(heal));
        assert_eq!(profile.get(heal).unwrap().priority(), 20);

        // 停用狀態在存檔後保留
        let saved = serde_json::to_string(&group).unwrap();
        let reloaded: GroupConfig = serde_json::from_str(&saved).unwrap();
        assert!(!reloaded.variables[0].enabled);
        assert!(!reloaded.accelerators[0].enabled);
        assert_eq!(reloaded.accelerators[0].priority, Some(20));
    }

    #[test]
    fn test_session_config() {
        let mut config = ClientConfig::default();
        config.force_go_ahead_off = true;
        config.disable_on_script_error = true;
        let session = config.session_config();
        assert!(session.force_go_ahead_off);
        assert!(session.engine.disable_on_script_error);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        assert_eq!(ClientConfig::load_from(&path).unwrap().connection.port, 7777);

        let mut config: ClientConfig = serde_json::from_str(SAMPLE).unwrap();
        config.scripts.insert("greet".to_string(), "mud.send('wave')".to_string());
        config.save_to(&path).unwrap();

        let loaded = ClientConfig::load_from(&path).unwrap();
        assert_eq!(loaded.connection.host, "mud.example.org");
        assert_eq!(loaded.profile.groups[0].triggers[0].match_type, MatchType::Contains);
        assert_eq!(loaded.scripts.get("greet").map(String::as_str), Some("mud.send('wave')"));
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(ClientConfig::load_from(&path), Err(ConfigError::Json(_))));
    }
}
