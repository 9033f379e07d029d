//! Lua 腳本支援模組
//!
//! [`ScriptHost`] 是規則引擎與腳本語言之間的介面；[`ScriptEngine`] 以 mlua 實作。

use std::collections::HashMap;

use mlua::{Lua, Table};
use regex::Regex;
use thiserror::Error;

use crate::profile::{ItemKind, MatchResult};

/// 腳本執行錯誤
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Lua 錯誤: {message}")]
    Lua {
        message: String,
        /// 出錯的行號（1 起算），能從錯誤訊息取得時才有
        line: Option<usize>,
    },

    #[error("腳本未找到: {0}")]
    NotFound(String),
}

impl ScriptError {
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Lua { line, .. } => *line,
            Self::NotFound(_) => None,
        }
    }
}

impl From<mlua::Error> for ScriptError {
    fn from(err: mlua::Error) -> Self {
        let message = err.to_string();
        let line = error_line(&message);
        ScriptError::Lua { message, line }
    }
}

/// 從 `[string "name"]:3: ...` 取出行號
fn error_line(message: &str) -> Option<usize> {
    lazy_static::lazy_static! {
        static ref LINE: Option<Regex> = Regex::new(r#"\[string "[^"]*"\]:(\d+):"#).ok();
    }
    let caps = LINE.as_ref()?.captures(message)?;
    caps.get(1)?.as_str().parse().ok()
}

/// 取出錯誤行附近的原始碼（前後各一行），每行標上行號
pub fn source_excerpt(script: &str, line: usize) -> Option<String> {
    let lines: Vec<&str> = script.lines().collect();
    if line == 0 || line > lines.len() {
        return None;
    }
    let first = line.saturating_sub(2);
    let last = (line + 1).min(lines.len());
    let excerpt = (first..last)
        .map(|i| {
            let marker = if i + 1 == line { ">" } else { " " };
            format!("{}{:4} | {}", marker, i + 1, lines[i])
        })
        .collect::<Vec<_>>()
        .join("\n");
    Some(excerpt)
}

/// 觸發執行的項目資訊
#[derive(Debug, Clone, Copy)]
pub struct ScriptContext<'a> {
    pub kind: ItemKind,
    pub item: &'a str,
    /// 執行期間的作用群組名稱
    pub group: &'a str,
    pub profile: &'a str,
    /// 被匹配的命令或行
    pub input: &'a str,
}

/// 腳本執行後留下的副作用，由上層在 dispatch 結束後處理
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MudContext {
    /// 待發送的命令隊列（直接送出，不再經過別名）
    pub commands: Vec<String>,

    /// 本地顯示的訊息（mud.echo）
    pub echos: Vec<String>,

    /// 寫入日誌的訊息
    pub log_messages: Vec<String>,
}

impl MudContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.echos.is_empty() && self.log_messages.is_empty()
    }

    fn append(&mut self, other: MudContext) {
        self.commands.extend(other.commands);
        self.echos.extend(other.echos);
        self.log_messages.extend(other.log_messages);
    }
}

/// 規則引擎呼叫的腳本介面
pub trait ScriptHost {
    /// 在執行前提供本次匹配的捕獲內容
    fn save_captures(&mut self, captures: &MatchResult);

    /// 同步執行腳本
    fn execute(&mut self, script: &str, context: &ScriptContext<'_>) -> Result<(), ScriptError>;

    /// 取出累積的副作用
    fn drain_effects(&mut self) -> MudContext {
        MudContext::default()
    }

    /// 以 Profile 中的變數項目設定腳本變數
    fn define_variable(&mut self, _name: &str, _value: &str) {}
}

/// Lua 腳本引擎
pub struct ScriptEngine {
    /// Lua 解釋器實例
    lua: Lua,
    /// 已載入的具名腳本
    scripts: HashMap<String, String>,
    /// 持久化變數（跨觸發器共享）
    persistent_vars: HashMap<String, String>,
    /// 下一次執行使用的捕獲內容
    captures: Option<MatchResult>,
    /// 尚未被取走的副作用
    pending: MudContext,
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("scripts", &self.scripts.len())
            .field("persistent_vars", &self.persistent_vars)
            .finish()
    }
}

impl ScriptEngine {
    /// 創建新的腳本引擎
    pub fn new() -> Self {
        Self {
            lua: Lua::new(),
            scripts: HashMap::new(),
            persistent_vars: HashMap::new(),
            captures: None,
            pending: MudContext::new(),
        }
    }

    /// 載入具名腳本，可在項目中以 `@name` 引用
    pub fn load_script(&mut self, name: impl Into<String>, code: impl Into<String>) {
        self.scripts.insert(name.into(), code.into());
    }

    /// 移除腳本
    pub fn remove_script(&mut self, name: &str) -> bool {
        self.scripts.remove(name).is_some()
    }

    /// 持久化變數
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.persistent_vars.get(name).map(String::as_str)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.persistent_vars.insert(name.into(), value.into());
    }

    /// 驗證腳本語法
    pub fn validate(&self, code: &str) -> Result<(), ScriptError> {
        self.lua.load(code).into_function()?;
        Ok(())
    }

    /// 解析 `@name` 形式的腳本引用
    fn resolve<'a>(&'a self, script: &'a str) -> Result<&'a str, ScriptError> {
        match script.trim().strip_prefix('@') {
            Some(name) => self
                .scripts
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| ScriptError::NotFound(name.to_string())),
            None => Ok(script),
        }
    }

    /// 運行 Lua 代碼
    fn run_code(&mut self, code: &str, context: &ScriptContext<'_>) -> Result<MudContext, ScriptError> {
        let lua = &self.lua;

        // 創建 mud 表用於存放 API
        let mud = lua.create_table()?;
        mud.set("commands", lua.create_table()?)?;
        mud.set("echos", lua.create_table()?)?;
        mud.set("log_messages", lua.create_table()?)?;

        let variables = lua.create_table()?;
        for (key, value) in &self.persistent_vars {
            variables.set(key.as_str(), value.as_str())?;
        }
        mud.set("variables", variables)?;

        mud.set("item", context.item)?;
        mud.set("kind", context.kind.label())?;
        mud.set("group", context.group)?;
        mud.set("profile", context.profile)?;

        // mud.send(command)
        let send_fn = lua.create_function(|lua, cmd: String| push_global(lua, "commands", cmd))?;
        mud.set("send", send_fn)?;

        // mud.echo(text) - 本地顯示訊息
        let echo_fn = lua.create_function(|lua, text: String| push_global(lua, "echos", text))?;
        mud.set("echo", echo_fn)?;

        // mud.log(message) - 寫入日誌
        let log_fn = lua.create_function(|lua, msg: String| {
            tracing::info!("[Script] {}", msg);
            push_global(lua, "log_messages", msg)
        })?;
        mud.set("log", log_fn)?;

        lua.globals().set("mud", mud)?;
        lua.globals().set("line", context.input)?;
        lua.globals().set("command", context.input)?;

        // matches[1] 為整段匹配，matches[2..] 為捕獲組，具名捕獲以名稱為鍵
        let matches = lua.create_table()?;
        if let Some(captures) = &self.captures {
            for (i, cap) in captures.captures.iter().enumerate() {
                matches.set(i + 1, cap.as_deref().unwrap_or(""))?;
            }
            for (name, value) in &captures.named {
                matches.set(name.as_str(), value.as_str())?;
            }
        }
        lua.globals().set("matches", matches)?;

        let chunk_name = format!("{}:{}", context.kind.label(), context.item);
        lua.load(code).set_name(chunk_name).exec()?;

        // 收集結果
        let mud: Table = lua.globals().get("mud")?;
        let mut result = MudContext::new();
        result.commands = collect_strings(&mud, "commands");
        result.echos = collect_strings(&mud, "echos");
        result.log_messages = collect_strings(&mud, "log_messages");

        // 收集 variables 並持久化儲存
        if let Ok(vars) = mud.get::<Table>("variables") {
            for (k, v) in vars.pairs::<String, String>().flatten() {
                self.persistent_vars.insert(k, v);
            }
        }

        Ok(result)
    }
}

fn push_global(lua: &Lua, field: &str, value: String) -> mlua::Result<()> {
    let mud: Table = lua.globals().get("mud")?;
    let list: Table = mud.get(field)?;
    let len = list.len()? + 1;
    list.set(len, value)
}

fn collect_strings(mud: &Table, field: &str) -> Vec<String> {
    match mud.get::<Table>(field) {
        Ok(list) => list.sequence_values::<String>().flatten().collect(),
        Err(_) => Vec::new(),
    }
}

impl ScriptHost for ScriptEngine {
    fn save_captures(&mut self, captures: &MatchResult) {
        self.captures = Some(captures.clone());
    }

    fn execute(&mut self, script: &str, context: &ScriptContext<'_>) -> Result<(), ScriptError> {
        let code = self.resolve(script)?.to_string();
        let effects = self.run_code(&code, context);
        self.captures = None;
        self.pending.append(effects?);
        Ok(())
    }

    fn drain_effects(&mut self) -> MudContext {
        std::mem::take(&mut self.pending)
    }

    fn define_variable(&mut self, name: &str, value: &str) {
        self.persistent_vars.insert(name.to_string(), value.to_string());
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}
