//! MUD Core Library
//!
//! 提供 MUD 客戶端的核心功能：
//! - `telnet`: Telnet 位元組流解碼、選項協商、GMCP、提示列與 TCP 連線
//! - `session`: 把協定處理與規則引擎組合成單一連線會話
//! - `profile`: 群組樹與別名/觸發器等項目
//! - `engine`: 別名與觸發器的分派
//! - `script`: Lua 腳本支援
//! - `encoding`: Big5/UTF-8 編解碼
//! - `debug_log`: 原始位元組追蹤

pub mod alias;
pub mod ansi;
pub mod debug_log;
pub mod encoding;
pub mod engine;
pub mod profile;
pub mod script;
pub mod session;
pub mod telnet;
pub mod trigger;

pub use alias::Alias;
pub use ansi::strip_ansi;
pub use debug_log::WireTrace;
pub use encoding::{decode_big5, encode_big5, TextEncoding};
pub use engine::{EngineConfig, RuleEngine, RuleError};
pub use profile::{
    Accelerator, Group, ItemData, ItemId, ItemKind, MatchResult, Matchable, PatternError, Profile,
    ProfileError, ProfileItem, Timer, Variable, VariableValue,
};
pub use script::{MudContext, ScriptContext, ScriptEngine, ScriptError, ScriptHost};
pub use session::{SessionConfig, SessionEvent, TelnetSession};
pub use telnet::{TelnetClient, TelnetConfig, TelnetError};
pub use trigger::{Trigger, TriggerPattern};
