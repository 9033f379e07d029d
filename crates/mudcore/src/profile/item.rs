//! Profile 樹中的項目
//!
//! 所有項目共用名稱、啟用旗標、優先序與父群組；種類相關的欄位放在 [`ItemData`]。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::group::Group;
use crate::alias::Alias;
use crate::trigger::Trigger;

/// 最小優先序（最先評估）
pub const MIN_PRIORITY: i32 = 1;
/// 最大優先序
pub const MAX_PRIORITY: i32 = 100_000;
/// 預設優先序
pub const DEFAULT_PRIORITY: i32 = 1000;

/// 將優先序限制在合法範圍內
pub fn clamp_priority(priority: i32) -> i32 {
    priority.clamp(MIN_PRIORITY, MAX_PRIORITY)
}

/// 項目識別碼，在同一個 Profile 內唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub(crate) u64);

impl ItemId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// 項目種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Group,
    Alias,
    Trigger,
    Timer,
    Variable,
    Accelerator,
}

impl ItemKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Alias => "alias",
            Self::Trigger => "trigger",
            Self::Timer => "timer",
            Self::Variable => "variable",
            Self::Accelerator => "accelerator",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 計時器：每隔 `interval` 執行一次腳本
#[derive(Debug, Clone, PartialEq)]
pub struct Timer {
    pub interval: Duration,
    pub script: String,
}

impl Timer {
    pub fn new(interval: Duration, script: impl Into<String>) -> Self {
        Self {
            interval,
            script: script.into(),
        }
    }
}

/// 變數值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl VariableValue {
    /// 以字串形式提供給腳本
    pub fn as_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

/// 具名變數
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: VariableValue,
}

impl Variable {
    pub fn new(value: VariableValue) -> Self {
        Self { value }
    }
}

/// 快捷鍵：按下 `keys` 時送出 `command`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accelerator {
    pub keys: String,
    pub command: String,
}

impl Accelerator {
    pub fn new(keys: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            keys: keys.into(),
            command: command.into(),
        }
    }
}

/// 種類相關的資料
#[derive(Debug, Clone)]
pub enum ItemData {
    Group(Group),
    Alias(Alias),
    Trigger(Trigger),
    Timer(Timer),
    Variable(Variable),
    Accelerator(Accelerator),
}

impl ItemData {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Group(_) => ItemKind::Group,
            Self::Alias(_) => ItemKind::Alias,
            Self::Trigger(_) => ItemKind::Trigger,
            Self::Timer(_) => ItemKind::Timer,
            Self::Variable(_) => ItemKind::Variable,
            Self::Accelerator(_) => ItemKind::Accelerator,
        }
    }
}

impl From<Group> for ItemData {
    fn from(value: Group) -> Self {
        Self::Group(value)
    }
}

impl From<Alias> for ItemData {
    fn from(value: Alias) -> Self {
        Self::Alias(value)
    }
}

impl From<Trigger> for ItemData {
    fn from(value: Trigger) -> Self {
        Self::Trigger(value)
    }
}

impl From<Timer> for ItemData {
    fn from(value: Timer) -> Self {
        Self::Timer(value)
    }
}

impl From<Variable> for ItemData {
    fn from(value: Variable) -> Self {
        Self::Variable(value)
    }
}

impl From<Accelerator> for ItemData {
    fn from(value: Accelerator) -> Self {
        Self::Accelerator(value)
    }
}

/// Profile 樹中的一個節點
#[derive(Debug, Clone)]
pub struct ProfileItem {
    pub(crate) id: ItemId,
    pub(crate) name: String,
    pub(crate) own_enabled: bool,
    pub(crate) priority: i32,
    pub(crate) parent: Option<ItemId>,
    pub(crate) data: ItemData,
}

impl ProfileItem {
    pub(crate) fn new(id: ItemId, name: String, parent: Option<ItemId>, data: ItemData) -> Self {
        Self {
            id,
            name,
            own_enabled: true,
            priority: DEFAULT_PRIORITY,
            parent,
            data,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 項目自身的啟用旗標（不考慮父群組）
    pub fn own_enabled(&self) -> bool {
        self.own_enabled
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    pub fn kind(&self) -> ItemKind {
        self.data.kind()
    }

    pub fn data(&self) -> &ItemData {
        &self.data
    }

    pub fn as_group(&self) -> Option<&Group> {
        match &self.data {
            ItemData::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_alias(&self) -> Option<&Alias> {
        match &self.data {
            ItemData::Alias(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_trigger(&self) -> Option<&Trigger> {
        match &self.data {
            ItemData::Trigger(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_timer(&self) -> Option<&Timer> {
        match &self.data {
            ItemData::Timer(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match &self.data {
            ItemData::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_accelerator(&self) -> Option<&Accelerator> {
        match &self.data {
            ItemData::Accelerator(a) => Some(a),
            _ => None,
        }
    }
}
