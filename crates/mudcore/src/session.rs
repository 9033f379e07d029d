//! 連線會話
//!
//! 把解碼器、選項協商、GMCP、提示列追蹤、斷行與規則引擎組合成一個同步的處理單元。
//! 會話本身不做 I/O：呼叫端把收到的位元組交給 [`TelnetSession::receive`]，
//! 再以 [`TelnetSession::take_outbound`] 取出要寫回 socket 的位元組。

use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::ansi::strip_ansi;
use crate::encoding::TextEncoding;
use crate::engine::{EngineConfig, RuleEngine, RuleError};
use crate::profile::Profile;
use crate::script::ScriptHost;
use crate::telnet::negotiation::{NegotiationSignal, Negotiator};
use crate::telnet::prompt::{strip_leading_newline, GoAheadAction, LeadingNewline, PromptTracker};
use crate::telnet::protocol::{escape_iac, TelnetCommand, TelnetDecoder, TelnetEvent, TelnetOption};
use crate::telnet::{GmcpChannel, GmcpConfig, GmcpError, GmcpMessage};

/// 會話設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub encoding: TextEncoding,
    /// 把 GA 當成換行，而不是提示列結尾
    pub force_go_ahead_off: bool,
    pub gmcp: GmcpConfig,
    pub engine: EngineConfig,
}

/// 交給畫面層的事件
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// 以 LF 結束的一行；`visible` 為 false 表示被觸發器隱藏
    Line { text: String, visible: bool },
    /// 以 GA 結束的提示列
    Prompt { text: String, visible: bool },
    Gmcp(GmcpMessage),
    /// 本地回顯開關（伺服器負責回顯時為 false）
    LocalEcho(bool),
    GmcpEnabled,
    GmcpDisabled,
    /// 拒絕了伺服器要求的選項
    OptionRefused(TelnetOption),
    /// 命令往返延遲
    Latency(Duration),
    /// 本地顯示的文字（別名回顯、腳本 echo）
    Echo(String),
    Error(RuleError),
}

/// 以 LF 切行，保留尚未結束的尾段
#[derive(Debug, Default)]
struct LineAssembler {
    partial: Vec<u8>,
}

impl LineAssembler {
    fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        for &byte in data {
            if byte == b'\n' {
                lines.push(std::mem::take(&mut self.partial));
            } else {
                self.partial.push(byte);
            }
        }
        lines
    }

    fn take_partial(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.partial)
    }

    fn clear(&mut self) {
        self.partial.clear();
    }
}

/// 一條 MUD 連線的協定與規則處理
#[derive(Debug)]
pub struct TelnetSession<S: ScriptHost> {
    config: SessionConfig,
    decoder: TelnetDecoder,
    negotiator: Negotiator,
    gmcp: GmcpChannel,
    prompt: PromptTracker,
    lines: LineAssembler,
    engine: RuleEngine<S>,
    outbound: BytesMut,
    /// 上一個事件是提示列，下一段資料開頭的多餘換行要移除
    after_prompt: bool,
}

impl<S: ScriptHost> TelnetSession<S> {
    pub fn new(config: SessionConfig, profile: Profile, host: S) -> Self {
        let mut engine = RuleEngine::with_config(profile, host, config.engine.clone());
        engine.sync_variables();
        Self {
            decoder: TelnetDecoder::new(),
            negotiator: Negotiator::new(),
            gmcp: GmcpChannel::new(config.gmcp.clone()),
            prompt: PromptTracker::new(config.force_go_ahead_off),
            lines: LineAssembler::default(),
            engine,
            outbound: BytesMut::with_capacity(1024),
            after_prompt: false,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn engine(&self) -> &RuleEngine<S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RuleEngine<S> {
        &mut self.engine
    }

    pub fn profile(&self) -> &Profile {
        self.engine.profile()
    }

    pub fn profile_mut(&mut self) -> &mut Profile {
        self.engine.profile_mut()
    }

    pub fn set_encoding(&mut self, encoding: TextEncoding) {
        self.config.encoding = encoding;
    }

    pub fn set_force_go_ahead_off(&mut self, value: bool) {
        self.config.force_go_ahead_off = value;
        self.prompt.set_force_go_ahead_off(value);
    }

    pub fn gmcp_enabled(&self) -> bool {
        self.negotiator.gmcp_enabled()
    }

    /// 伺服器是否負責回顯（此時不應在本地顯示輸入）
    pub fn remote_echo(&self) -> bool {
        self.negotiator.remote_echo()
    }

    /// 尚未收到 GA 回應的命令數
    pub fn pending_commands(&self) -> u32 {
        self.prompt.pending_commands()
    }

    pub fn last_latency(&self) -> Option<Duration> {
        self.prompt.last_latency()
    }

    /// 處理從伺服器收到的位元組
    pub fn receive(&mut self, data: &[u8]) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        for event in self.decoder.feed(data) {
            match event {
                TelnetEvent::PlainData(mut bytes) => {
                    if self.after_prompt && strip_leading_newline(&mut bytes) != LeadingNewline::Pending {
                        self.after_prompt = false;
                    }
                    for line in self.lines.push(&bytes) {
                        self.dispatch_line(&line, false, &mut events);
                    }
                }
                TelnetEvent::Negotiation(cmd, option) => {
                    self.handle_negotiation(cmd, option, &mut events);
                }
                TelnetEvent::GmcpFrame(payload) => {
                    if !self.negotiator.gmcp_enabled() {
                        debug!("GMCP 未啟用，丟棄訊框");
                        continue;
                    }
                    if let Some(message) = self.gmcp.on_frame(&payload) {
                        events.push(SessionEvent::Gmcp(message));
                    }
                }
                TelnetEvent::Subnegotiation(option, payload) => {
                    trace!("忽略 {:?} 子協商 ({} bytes)", option, payload.len());
                }
                TelnetEvent::GoAhead => match self.prompt.on_go_ahead() {
                    GoAheadAction::FlushPrompt { latency } => {
                        let prompt = self.lines.take_partial();
                        if !prompt.is_empty() {
                            self.dispatch_line(&prompt, true, &mut events);
                        }
                        self.after_prompt = true;
                        if let Some(latency) = latency {
                            events.push(SessionEvent::Latency(latency));
                        }
                    }
                    GoAheadAction::InjectNewline => {
                        for line in self.lines.push(b"\n") {
                            self.dispatch_line(&line, false, &mut events);
                        }
                    }
                },
            }
        }

        self.flush_effects(&mut events);
        events
    }

    /// 送出玩家輸入的命令；匹配別名時由別名處理，否則原樣送出
    pub fn send_command(&mut self, text: &str) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if !self.engine.process_command(text) {
            self.send_raw_line(text);
        }
        self.flush_effects(&mut events);
        events
    }

    /// 送出快捷鍵對應的命令；沒有對應的快捷鍵時返回 None
    pub fn press_keys(&mut self, keys: &str) -> Option<Vec<SessionEvent>> {
        let command = self.engine.accelerator_command(keys)?;
        Some(self.send_command(&command))
    }

    /// 執行到期的計時器
    pub fn tick(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        self.engine.tick(now);
        self.flush_effects(&mut events);
        events
    }

    /// 不經別名直接送出一行
    pub fn send_raw_line(&mut self, text: &str) {
        let encoded = self.config.encoding.encode(text);
        self.outbound.put_slice(&escape_iac(&encoded));
        self.outbound.put_slice(b"\r\n");
        self.prompt.on_send();
        trace!("送出: {}", text);
    }

    /// 送出 GMCP 訊息
    pub fn send_gmcp(&mut self, name: &str, args: Option<&str>) -> Result<(), GmcpError> {
        if !self.negotiator.gmcp_enabled() {
            return Err(GmcpError::NotNegotiated);
        }
        let frame = self.gmcp.send_message(name, args)?;
        self.outbound.put_slice(&frame);
        Ok(())
    }

    /// 是否有待寫出的位元組
    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// 取出所有待寫出的位元組
    pub fn take_outbound(&mut self) -> Bytes {
        self.outbound.split().freeze()
    }

    /// 斷線後重設協定狀態；Profile 與腳本狀態保留
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.negotiator.reset();
        self.gmcp.reset();
        self.prompt.reset();
        self.lines.clear();
        self.outbound.clear();
        self.after_prompt = false;
    }

    fn handle_negotiation(&mut self, cmd: TelnetCommand, option: TelnetOption, events: &mut Vec<SessionEvent>) {
        let outcome = self.negotiator.handle(cmd, option);
        self.outbound.put_slice(&outcome.reply);

        for signal in outcome.signals {
            match signal {
                NegotiationSignal::RemoteEcho(remote) => events.push(SessionEvent::LocalEcho(!remote)),
                NegotiationSignal::GmcpEnabled => {
                    if outcome.start_gmcp_handshake || !self.gmcp.is_ready() {
                        let handshake = self.gmcp.handshake();
                        self.outbound.put_slice(&handshake);
                    }
                    events.push(SessionEvent::GmcpEnabled);
                }
                NegotiationSignal::GmcpDisabled => {
                    self.gmcp.reset();
                    events.push(SessionEvent::GmcpDisabled);
                }
                NegotiationSignal::OptionRefused(option) => {
                    events.push(SessionEvent::OptionRefused(option));
                }
            }
        }
    }

    fn dispatch_line(&mut self, bytes: &[u8], prompt: bool, events: &mut Vec<SessionEvent>) {
        let text = self.config.encoding.decode(bytes);
        let visible = self.engine.process_line(&strip_ansi(&text));
        events.push(if prompt {
            SessionEvent::Prompt { text, visible }
        } else {
            SessionEvent::Line { text, visible }
        });
    }

    /// 處理分派後留下的錯誤、回顯與腳本副作用
    fn flush_effects(&mut self, events: &mut Vec<SessionEvent>) {
        for error in self.engine.drain_errors() {
            events.push(SessionEvent::Error(error));
        }
        for echo in self.engine.drain_echoes() {
            events.push(SessionEvent::Echo(echo));
        }

        let effects = self.engine.drain_effects();
        for message in effects.log_messages {
            info!("[Script] {}", message);
        }
        for echo in effects.echos {
            events.push(SessionEvent::Echo(echo));
        }
        // 腳本送出的命令不再經過別名
        for command in effects.commands {
            self.send_raw_line(&command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::Alias;
    use crate::profile::{Accelerator, Timer, Variable, VariableValue};
    use crate::script::ScriptEngine;
    use crate::telnet::protocol::IAC;
    use crate::trigger::Trigger;

    const GA: u8 = 249;
    const SB: u8 = 250;
    const SE: u8 = 240;
    const WILL: u8 = 251;
    const DO: u8 = 253;
    const WONT: u8 = 252;
    const GMCP: u8 = 201;

    fn session() -> TelnetSession<ScriptEngine> {
        TelnetSession::new(SessionConfig::default(), Profile::new("test"), ScriptEngine::new())
    }

    fn line(text: &str) -> SessionEvent {
        SessionEvent::Line {
            text: text.to_string(),
            visible: true,
        }
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    #[test]
    fn test_lines_and_partial() {
        let mut session = session();
        assert_eq!(session.receive(b"hello\r\nwor"), vec![line("hello")]);
        assert_eq!(session.receive(b"ld\n"), vec![line("world")]);
    }

    #[test]
    fn test_go_ahead_flushes_prompt() {
        let mut session = session();
        let events = session.receive(&[b'H', b'P', b'>', b' ', IAC, GA]);
        assert_eq!(
            events,
            vec![SessionEvent::Prompt {
                text: "HP> ".to_string(),
                visible: true
            }]
        );
    }

    #[test]
    fn test_leading_newline_after_prompt_removed() {
        let mut session = session();
        let mut input = vec![b'>', IAC, GA];
        input.extend_from_slice(b"\r\nnext\n");
        let events = session.receive(&input);
        assert_eq!(
            events,
            vec![
                SessionEvent::Prompt {
                    text: ">".to_string(),
                    visible: true
                },
                line("next"),
            ]
        );
    }

    #[test]
    fn test_leading_newline_after_prompt_split_after_ansi() {
        let mut session = session();
        let mut input = vec![b'>', IAC, GA];
        input.extend_from_slice(b"\x1b[0m");
        let events = session.receive(&input);
        assert_eq!(
            events,
            vec![SessionEvent::Prompt {
                text: ">".to_string(),
                visible: true
            }]
        );

        let events = session.receive(b"\nnext\n");
        assert_eq!(events, vec![line("\x1b[0mnext")]);
    }

    #[test]
    fn test_force_go_ahead_off_injects_newline() {
        let mut session = session();
        session.set_force_go_ahead_off(true);
        assert_eq!(session.receive(&[b'a', b'b', IAC, GA]), vec![line("ab")]);
    }

    #[test]
    fn test_will_gmcp_twice_replies_once() {
        let mut session = session();
        let events = session.receive(&[IAC, WILL, GMCP, IAC, WILL, GMCP]);
        assert_eq!(events, vec![SessionEvent::GmcpEnabled]);

        let out = session.take_outbound();
        assert_eq!(count(&out, &[IAC, DO, GMCP]), 1);
        assert_eq!(count(&out, b"Core.Hello"), 1);
        assert_eq!(count(&out, b"Core.Supports.Set"), 1);
        assert!(!session.has_outbound());
    }

    #[test]
    fn test_gmcp_frame_after_handshake() {
        let mut session = session();
        let mut input = vec![IAC, WILL, GMCP, IAC, SB, GMCP];
        input.extend_from_slice(br#"Char.Vitals {"hp":100}"#);
        input.extend_from_slice(&[IAC, SE]);

        let events = session.receive(&input);
        match &events[1] {
            SessionEvent::Gmcp(message) => {
                assert_eq!(message.name, "Char.Vitals");
                assert_eq!(message.json()["hp"], 100);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_gmcp_frame_ignored_when_disabled() {
        let mut session = session();
        let mut input = vec![IAC, SB, GMCP];
        input.extend_from_slice(b"Room.Info {}");
        input.extend_from_slice(&[IAC, SE]);
        assert!(session.receive(&input).is_empty());
        assert_eq!(session.send_gmcp("Core.Ping", None), Err(GmcpError::NotNegotiated));
    }

    #[test]
    fn test_send_gmcp() {
        let mut session = session();
        session.receive(&[IAC, WILL, GMCP]);
        session.take_outbound();

        session.send_gmcp("Core.Ping", None).unwrap();
        let out = session.take_outbound();
        assert_eq!(&out[..3], &[IAC, SB, GMCP]);
        assert_eq!(&out[out.len() - 2..], &[IAC, SE]);
    }

    #[test]
    fn test_remote_echo_and_refused_option() {
        let mut session = session();
        let events = session.receive(&[IAC, WILL, 1, IAC, DO, 31]);
        assert_eq!(
            events,
            vec![
                SessionEvent::LocalEcho(false),
                SessionEvent::OptionRefused(TelnetOption::Naws)
            ]
        );
        assert!(session.remote_echo());
        assert_eq!(&session.take_outbound()[..], &[IAC, DO, 1, IAC, WONT, 31]);
    }

    #[test]
    fn test_unmatched_command_sent_raw() {
        let mut session = session();
        assert!(session.send_command("look").is_empty());
        assert_eq!(&session.take_outbound()[..], b"look\r\n");
        assert_eq!(session.pending_commands(), 1);
    }

    #[test]
    fn test_alias_script_commands_sent_raw() {
        let mut session = session();
        let profile = session.profile_mut();
        let root = profile.root();
        profile
            .add_child(root, "kk", Alias::new(r"^kk (\w+)$", r#"mud.send("kk " .. matches[2])"#))
            .unwrap();

        session.send_command("kk orc");
        // 腳本送出的命令不會再次觸發同一個別名
        assert_eq!(&session.take_outbound()[..], b"kk orc\r\n");
        assert_eq!(session.pending_commands(), 1);
    }

    #[test]
    fn test_latency_reported_on_prompt() {
        let mut session = session();
        session.send_command("look");
        session.send_command("score");
        let events = session.receive(&[b'>', IAC, GA]);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Latency(_))));
        assert_eq!(session.pending_commands(), 1);
        assert!(session.last_latency().is_some());
    }

    #[test]
    fn test_trigger_omit_and_echo() {
        let mut session = session();
        let profile = session.profile_mut();
        let root = profile.root();
        profile
            .add_child(root, "spam", Trigger::new("^廣告", r#"mud.echo("hidden")"#).omit(true))
            .unwrap();

        let events = session.receive("廣告：買金幣\n".as_bytes());
        assert_eq!(
            events,
            vec![
                SessionEvent::Line {
                    text: "廣告：買金幣".to_string(),
                    visible: false
                },
                SessionEvent::Echo("hidden".to_string()),
            ]
        );
    }

    #[test]
    fn test_trigger_matches_without_ansi() {
        let mut session = session();
        let profile = session.profile_mut();
        let root = profile.root();
        profile
            .add_child(root, "orc", Trigger::new("^orc$", r#"mud.send("kill orc")"#))
            .unwrap();

        let events = session.receive(b"\x1b[31morc\x1b[0m\n");
        assert_eq!(events, vec![line("\x1b[31morc\x1b[0m")]);
        assert_eq!(&session.take_outbound()[..], b"kill orc\r\n");
    }

    #[test]
    fn test_script_error_reported() {
        let mut session = session();
        let profile = session.profile_mut();
        let root = profile.root();
        profile.add_child(root, "bad", Trigger::new("orc", "error('x')")).unwrap();

        let events = session.receive(b"orc\n");
        assert!(matches!(&events[1], SessionEvent::Error(RuleError::Script { item, .. }) if item == "bad"));
    }

    #[test]
    fn test_big5_lines() {
        let mut session = session();
        session.set_encoding(TextEncoding::Big5);
        let mut input = crate::encoding::encode_big5("測試");
        input.push(b'\n');
        let events = session.receive(&input);
        assert_eq!(events, vec![line("測試")]);
    }

    #[test]
    fn test_accelerator_sends_command() {
        let mut session = session();
        let profile = session.profile_mut();
        let root = profile.root();
        profile.add_child(root, "flee", Accelerator::new("F2", "flee")).unwrap();

        assert!(session.press_keys("F3").is_none());
        session.press_keys("F2").unwrap();
        assert_eq!(&session.take_outbound()[..], b"flee\r\n");
    }

    #[test]
    fn test_timer_tick_sends_script_commands() {
        let mut session = session();
        let profile = session.profile_mut();
        let root = profile.root();
        profile
            .add_child(root, "idle", Timer::new(Duration::from_secs(10), r#"mud.send("save")"#))
            .unwrap();

        let start = Instant::now();
        session.tick(start);
        assert!(!session.has_outbound());
        session.tick(start + Duration::from_secs(10));
        assert_eq!(&session.take_outbound()[..], b"save\r\n");
    }

    #[test]
    fn test_variables_visible_to_scripts() {
        let mut profile = Profile::new("test");
        let root = profile.root();
        profile
            .add_child(root, "target", Variable::new(VariableValue::Text("orc".to_string())))
            .unwrap();
        profile
            .add_child(root, "k", Alias::new("^k$", r#"mud.send("kill " .. mud.variables.target)"#))
            .unwrap();

        let mut session = TelnetSession::new(SessionConfig::default(), profile, ScriptEngine::new());
        session.send_command("k");
        assert_eq!(&session.take_outbound()[..], b"kill orc\r\n");
    }

    #[test]
    fn test_reset_clears_state() {
        let mut session = session();
        session.receive(&[IAC, WILL, GMCP]);
        session.receive(b"partial");
        session.send_command("look");
        session.reset();

        assert!(!session.gmcp_enabled());
        assert!(!session.has_outbound());
        assert_eq!(session.pending_commands(), 0);
        assert_eq!(session.receive(b"line\n"), vec![line("line")]);
    }
}
