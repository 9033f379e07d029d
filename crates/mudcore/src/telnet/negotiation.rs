//! Telnet 選項協商
//!
//! 消費解碼器產生的 `Negotiation` 事件，決定回應位元組與對上層的通知。

use tracing::{debug, info};

use super::protocol::{encode_negotiation, TelnetCommand, TelnetOption};

/// 協商結果對上層的通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationSignal {
    /// 伺服器會（true）或不再（false）回顯，客戶端應相應關閉/恢復本地回顯
    RemoteEcho(bool),
    /// GMCP 已啟用
    GmcpEnabled,
    /// GMCP 已被伺服器關閉
    GmcpDisabled,
    /// 伺服器要求啟用的選項被拒絕
    OptionRefused(TelnetOption),
}

/// 單一協商命令的處理結果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NegotiationOutcome {
    /// 要回傳給伺服器的位元組
    pub reply: Vec<u8>,
    /// 給上層的通知
    pub signals: Vec<NegotiationSignal>,
    /// 是否需要立即送出 GMCP 握手訊框
    pub start_gmcp_handshake: bool,
}

/// 選項協商狀態
#[derive(Debug, Default)]
pub struct Negotiator {
    gmcp_enabled: bool,
    remote_echo: bool,
}

impl Negotiator {
    /// 創建新的協商器
    pub fn new() -> Self {
        Self::default()
    }

    /// GMCP 是否已啟用
    pub fn gmcp_enabled(&self) -> bool {
        self.gmcp_enabled
    }

    /// 伺服器是否負責回顯
    pub fn remote_echo(&self) -> bool {
        self.remote_echo
    }

    /// 斷線後重設
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 處理一個協商命令
    pub fn handle(&mut self, cmd: TelnetCommand, option: TelnetOption) -> NegotiationOutcome {
        let mut outcome = NegotiationOutcome::default();
        debug!("收到協商: {:?} {:?}", cmd, option);

        match (cmd, option) {
            (TelnetCommand::Will, TelnetOption::Echo) => {
                if !self.remote_echo {
                    self.remote_echo = true;
                    outcome.reply.extend_from_slice(&encode_negotiation(TelnetCommand::Do, option));
                }
                outcome.signals.push(NegotiationSignal::RemoteEcho(true));
            }
            (TelnetCommand::Wont, TelnetOption::Echo) => {
                if self.remote_echo {
                    self.remote_echo = false;
                    outcome.reply.extend_from_slice(&encode_negotiation(TelnetCommand::Dont, option));
                }
                outcome.signals.push(NegotiationSignal::RemoteEcho(false));
            }
            (TelnetCommand::Will, TelnetOption::Gmcp) => {
                if self.gmcp_enabled {
                    debug!("GMCP 已啟用，忽略重複的 WILL GMCP");
                    return outcome;
                }
                self.gmcp_enabled = true;
                info!("伺服器支援 GMCP，回應 DO GMCP");
                outcome.reply.extend_from_slice(&encode_negotiation(TelnetCommand::Do, option));
                outcome.signals.push(NegotiationSignal::GmcpEnabled);
                outcome.start_gmcp_handshake = true;
            }
            (TelnetCommand::Wont, TelnetOption::Gmcp) => {
                if self.gmcp_enabled {
                    self.gmcp_enabled = false;
                    outcome.signals.push(NegotiationSignal::GmcpDisabled);
                }
            }
            (TelnetCommand::Will, other) => {
                outcome.reply.extend_from_slice(&encode_negotiation(TelnetCommand::Dont, other));
            }
            (TelnetCommand::Do, TelnetOption::Gmcp) => {
                self.gmcp_enabled = true;
                outcome.reply.extend_from_slice(&encode_negotiation(TelnetCommand::Will, option));
                outcome.signals.push(NegotiationSignal::GmcpEnabled);
            }
            (TelnetCommand::Do, other) => {
                outcome.reply.extend_from_slice(&encode_negotiation(TelnetCommand::Wont, other));
                outcome.signals.push(NegotiationSignal::OptionRefused(other));
            }
            // DONT 與其他 WONT 目前不需要記錄
            _ => {}
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telnet::protocol::IAC;

    #[test]
    fn test_will_gmcp_is_idempotent() {
        let mut negotiator = Negotiator::new();

        let first = negotiator.handle(TelnetCommand::Will, TelnetOption::Gmcp);
        assert_eq!(first.reply, vec![IAC, TelnetCommand::Do as u8, 201]);
        assert_eq!(first.signals, vec![NegotiationSignal::GmcpEnabled]);
        assert!(first.start_gmcp_handshake);

        let second = negotiator.handle(TelnetCommand::Will, TelnetOption::Gmcp);
        assert!(second.reply.is_empty());
        assert!(second.signals.is_empty());
        assert!(!second.start_gmcp_handshake);
        assert!(negotiator.gmcp_enabled());
    }

    #[test]
    fn test_will_unknown_declined() {
        let mut negotiator = Negotiator::new();
        let outcome = negotiator.handle(TelnetCommand::Will, TelnetOption::Mccp2);
        assert_eq!(outcome.reply, vec![IAC, TelnetCommand::Dont as u8, 86]);
        assert!(outcome.signals.is_empty());
    }

    #[test]
    fn test_echo_toggles() {
        let mut negotiator = Negotiator::new();
        let on = negotiator.handle(TelnetCommand::Will, TelnetOption::Echo);
        assert_eq!(on.reply, vec![IAC, TelnetCommand::Do as u8, 1]);
        assert_eq!(on.signals, vec![NegotiationSignal::RemoteEcho(true)]);
        assert!(negotiator.remote_echo());

        let off = negotiator.handle(TelnetCommand::Wont, TelnetOption::Echo);
        assert_eq!(off.reply, vec![IAC, TelnetCommand::Dont as u8, 1]);
        assert_eq!(off.signals, vec![NegotiationSignal::RemoteEcho(false)]);
        assert!(!negotiator.remote_echo());
    }

    #[test]
    fn test_do_gmcp_accepted() {
        let mut negotiator = Negotiator::new();
        let outcome = negotiator.handle(TelnetCommand::Do, TelnetOption::Gmcp);
        assert_eq!(outcome.reply, vec![IAC, TelnetCommand::Will as u8, 201]);
        assert_eq!(outcome.signals, vec![NegotiationSignal::GmcpEnabled]);
    }

    #[test]
    fn test_do_other_refused_without_touching_gmcp() {
        let mut negotiator = Negotiator::new();
        negotiator.handle(TelnetCommand::Will, TelnetOption::Gmcp);

        let outcome = negotiator.handle(TelnetCommand::Do, TelnetOption::Naws);
        assert_eq!(outcome.reply, vec![IAC, TelnetCommand::Wont as u8, 31]);
        assert_eq!(
            outcome.signals,
            vec![NegotiationSignal::OptionRefused(TelnetOption::Naws)]
        );
        assert!(negotiator.gmcp_enabled());
    }

    #[test]
    fn test_dont_is_noop() {
        let mut negotiator = Negotiator::new();
        let outcome = negotiator.handle(TelnetCommand::Dont, TelnetOption::Gmcp);
        assert_eq!(outcome, NegotiationOutcome::default());
    }
}
