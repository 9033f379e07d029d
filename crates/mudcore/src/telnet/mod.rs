//! Telnet 協定模組
//!
//! 實作 Telnet 位元組流解碼、選項協商、GMCP 通道、提示列偵測與 TCP 傳輸

mod client;
pub mod gmcp;
pub mod negotiation;
pub mod prompt;
pub mod protocol;

pub use client::{ConnectionState, LookupHandle, TelnetClient, TelnetConfig, TelnetError};
pub use gmcp::{GmcpChannel, GmcpConfig, GmcpError, GmcpMessage};
pub use negotiation::{NegotiationOutcome, NegotiationSignal, Negotiator};
pub use prompt::{GoAheadAction, LeadingNewline, PromptTracker};
pub use protocol::{TelnetCommand, TelnetDecoder, TelnetEvent, TelnetOption};
