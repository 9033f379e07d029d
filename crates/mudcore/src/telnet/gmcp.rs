//! GMCP（Generic MUD Communication Protocol）通道
//!
//! 訊框格式：`IAC SB 201 <package.message>[<sep><args>] IAC SE`，
//! 解析時 `<sep>` 取第一個 LF，沒有 LF 才取第一個空白；送出時固定用空白。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::protocol::{encode_subnegotiation, TelnetOption};

/// GMCP 錯誤
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GmcpError {
    #[error("GMCP 尚未啟用")]
    NotNegotiated,

    #[error("GMCP 訊息名稱不可為空")]
    EmptyName,
}

/// GMCP 訊息
#[derive(Debug, Clone, PartialEq)]
pub struct GmcpMessage {
    /// 訊息名稱，例如 `Char.Vitals`
    pub name: String,
    /// 原始參數（JSON 或純字串）
    pub args: Option<String>,
}

impl GmcpMessage {
    /// 創建新的 GMCP 訊息
    pub fn new(name: impl Into<String>, args: Option<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// 從子協商內容解析
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        let (name, args) = split_frame(&text);
        Self::new(name, args.map(str::to_string))
    }

    /// 將參數解析為 JSON；不是合法 JSON 時視為純字串
    pub fn json(&self) -> Value {
        match self.args.as_deref().map(str::trim) {
            None | Some("") => Value::Null,
            Some(raw) => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
            }
        }
    }

    /// 編碼為子協商內容（不含 IAC SB/SE）
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = self.name.clone().into_bytes();
        if let Some(args) = &self.args {
            payload.push(b' ');
            payload.extend_from_slice(args.as_bytes());
        }
        payload
    }
}

/// 拆分 `<name><sep><args>`
pub fn split_frame(text: &str) -> (&str, Option<&str>) {
    let sep = text.find('\n').or_else(|| text.find(' '));
    match sep {
        Some(pos) => (&text[..pos], Some(&text[pos + 1..])),
        None => (text, None),
    }
}

/// GMCP 客戶端識別與支援的套件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmcpConfig {
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,
}

fn default_client_name() -> String {
    "mudcore".to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_packages() -> Vec<String> {
    ["Char 1", "Char.Skills 1", "Char.Items 1", "Room 1", "Comm.Channel 1"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for GmcpConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            client_version: default_client_version(),
            packages: default_packages(),
        }
    }
}

/// GMCP 通道：握手後才會將收到的訊框交給上層
#[derive(Debug, Default)]
pub struct GmcpChannel {
    config: GmcpConfig,
    handshake_complete: bool,
}

impl GmcpChannel {
    /// 創建新的 GMCP 通道
    pub fn new(config: GmcpConfig) -> Self {
        Self {
            config,
            handshake_complete: false,
        }
    }

    /// 握手是否已完成
    pub fn is_ready(&self) -> bool {
        self.handshake_complete
    }

    /// 斷線或伺服器關閉 GMCP 時重設
    pub fn reset(&mut self) {
        self.handshake_complete = false;
    }

    /// 產生握手訊框（Core.Hello 與 Core.Supports.Set），並將通道標記為就緒
    pub fn handshake(&mut self) -> Vec<u8> {
        let hello = json!({
            "client": self.config.client_name,
            "version": self.config.client_version,
        });
        let supports = Value::from(self.config.packages.clone());

        let mut out = Self::encode("Core.Hello", Some(&hello.to_string()));
        out.extend(Self::encode("Core.Supports.Set", Some(&supports.to_string())));
        self.handshake_complete = true;
        debug!("送出 GMCP 握手: {}", hello);
        out
    }

    /// 編碼一則要送出的訊息
    pub fn send_message(&self, name: &str, args: Option<&str>) -> Result<Vec<u8>, GmcpError> {
        if !self.handshake_complete {
            return Err(GmcpError::NotNegotiated);
        }
        if name.trim().is_empty() {
            return Err(GmcpError::EmptyName);
        }
        Ok(Self::encode(name, args))
    }

    /// 處理收到的訊框；握手前收到的訊框會被丟棄
    pub fn on_frame(&self, payload: &[u8]) -> Option<GmcpMessage> {
        if !self.handshake_complete {
            warn!("握手前收到 GMCP 訊框，已丟棄");
            return None;
        }
        let message = GmcpMessage::parse(payload);
        debug!("收到 GMCP: {}", message.name);
        Some(message)
    }

    fn encode(name: &str, args: Option<&str>) -> Vec<u8> {
        let message = GmcpMessage::new(name, args.map(str::to_string));
        encode_subnegotiation(TelnetOption::Gmcp, &message.to_payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telnet::protocol::{TelnetDecoder, TelnetEvent, IAC};

    #[test]
    fn test_split_prefers_newline() {
        assert_eq!(
            split_frame("Comm.Channel.Text\n{\"text\": \"a b\"}"),
            ("Comm.Channel.Text", Some("{\"text\": \"a b\"}"))
        );
        assert_eq!(split_frame("Char.Name {\"name\":\"x\"}"), ("Char.Name", Some("{\"name\":\"x\"}")));
        assert_eq!(split_frame("Core.Ping"), ("Core.Ping", None));
    }

    #[test]
    fn test_json_args() {
        let msg = GmcpMessage::parse(br#"Char.Vitals {"hp": 10}"#);
        assert_eq!(msg.json()["hp"], 10);

        let bare = GmcpMessage::parse(b"Core.Goodbye see you");
        assert_eq!(bare.json(), Value::String("see you".to_string()));

        let none = GmcpMessage::parse(b"Core.Ping");
        assert_eq!(none.json(), Value::Null);
    }

    #[test]
    fn test_handshake_frames() {
        let mut channel = GmcpChannel::new(GmcpConfig {
            client_name: "tester".to_string(),
            client_version: "9.9".to_string(),
            packages: vec!["Char 1".to_string()],
        });
        assert!(!channel.is_ready());

        let bytes = channel.handshake();
        assert!(channel.is_ready());

        let mut decoder = TelnetDecoder::new();
        let events = decoder.feed(&bytes);
        assert_eq!(events.len(), 2);

        let TelnetEvent::GmcpFrame(hello) = &events[0] else {
            panic!("expected GMCP frame, got {:?}", events[0]);
        };
        let hello = GmcpMessage::parse(hello);
        assert_eq!(hello.name, "Core.Hello");
        assert_eq!(hello.json()["client"], "tester");
        assert_eq!(hello.json()["version"], "9.9");

        let TelnetEvent::GmcpFrame(supports) = &events[1] else {
            panic!("expected GMCP frame, got {:?}", events[1]);
        };
        let supports = GmcpMessage::parse(supports);
        assert_eq!(supports.name, "Core.Supports.Set");
        assert_eq!(supports.json(), json!(["Char 1"]));
    }

    #[test]
    fn test_send_requires_handshake() {
        let mut channel = GmcpChannel::default();
        assert!(matches!(
            channel.send_message("Core.Ping", None),
            Err(GmcpError::NotNegotiated)
        ));

        channel.handshake();
        let bytes = channel.send_message("Core.Ping", None).unwrap();
        assert_eq!(&bytes[..3], &[IAC, 250, 201]);
        assert_eq!(&bytes[3..bytes.len() - 2], b"Core.Ping");
    }

    #[test]
    fn test_frames_before_handshake_dropped() {
        let mut channel = GmcpChannel::default();
        assert!(channel.on_frame(b"Room.Info {}").is_none());
        channel.handshake();
        let msg = channel.on_frame(b"Room.Info {}").unwrap();
        assert_eq!(msg.name, "Room.Info");
        assert_eq!(msg.args.as_deref(), Some("{}"));
    }
}
