//! Telnet 協定常數、解碼器與編碼輔助函式
//!
//! 實作 RFC 854 Telnet 協定的位元組層處理：
//! - [`TelnetDecoder`]：逐位元組狀態機，將原始資料流拆為純文字、協商命令、
//!   子協商（GMCP）訊框與 Go-Ahead 事件
//! - `encode_*`：產生送往伺服器的命令位元組

use tracing::trace;

/// Telnet IAC (Interpret As Command) - 0xFF
pub const IAC: u8 = 255;

/// 子協商內容的上限，超過即視為格式錯誤並丟棄
pub const MAX_SUBNEGOTIATION_LEN: usize = 1 << 20;

/// Telnet 命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TelnetCommand {
    /// Sub-negotiation End
    Se = 240,
    /// No Operation
    Nop = 241,
    /// Data Mark
    DataMark = 242,
    /// Break
    Break = 243,
    /// Interrupt Process
    InterruptProcess = 244,
    /// Abort Output
    AbortOutput = 245,
    /// Are You There
    AreYouThere = 246,
    /// Erase Character
    EraseCharacter = 247,
    /// Erase Line
    EraseLine = 248,
    /// Go Ahead
    GoAhead = 249,
    /// Sub-negotiation Begin
    Sb = 250,
    /// Will
    Will = 251,
    /// Won't
    Wont = 252,
    /// Do
    Do = 253,
    /// Don't
    Dont = 254,
}

impl TelnetCommand {
    /// 從位元組解析 Telnet 命令
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            240 => Some(Self::Se),
            241 => Some(Self::Nop),
            242 => Some(Self::DataMark),
            243 => Some(Self::Break),
            244 => Some(Self::InterruptProcess),
            245 => Some(Self::AbortOutput),
            246 => Some(Self::AreYouThere),
            247 => Some(Self::EraseCharacter),
            248 => Some(Self::EraseLine),
            249 => Some(Self::GoAhead),
            250 => Some(Self::Sb),
            251 => Some(Self::Will),
            252 => Some(Self::Wont),
            253 => Some(Self::Do),
            254 => Some(Self::Dont),
            _ => None,
        }
    }

    /// 是否為需要選項位元組的協商動詞（WILL/WONT/DO/DONT）
    pub fn is_verb(self) -> bool {
        matches!(self, Self::Will | Self::Wont | Self::Do | Self::Dont)
    }
}

/// Telnet 選項
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetOption {
    /// Binary Transmission
    BinaryTransmission,
    /// Echo
    Echo,
    /// Suppress Go Ahead
    SuppressGoAhead,
    /// Terminal Type
    TerminalType,
    /// Window Size (NAWS)
    Naws,
    /// Terminal Speed
    TerminalSpeed,
    /// Remote Flow Control
    RemoteFlowControl,
    /// Linemode
    Linemode,
    /// Environment Variables (New)
    NewEnviron,
    /// Charset
    Charset,
    /// MCCP2 (MUD Client Compression Protocol)
    Mccp2,
    /// MCCP3
    Mccp3,
    /// GMCP (Generic MUD Communication Protocol)
    Gmcp,
    /// Unknown option
    Unknown(u8),
}

impl TelnetOption {
    /// 從位元組解析 Telnet 選項
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::BinaryTransmission,
            1 => Self::Echo,
            3 => Self::SuppressGoAhead,
            24 => Self::TerminalType,
            31 => Self::Naws,
            32 => Self::TerminalSpeed,
            33 => Self::RemoteFlowControl,
            34 => Self::Linemode,
            39 => Self::NewEnviron,
            42 => Self::Charset,
            86 => Self::Mccp2,
            87 => Self::Mccp3,
            201 => Self::Gmcp,
            other => Self::Unknown(other),
        }
    }

    /// 獲取選項的位元組值
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::BinaryTransmission => 0,
            Self::Echo => 1,
            Self::SuppressGoAhead => 3,
            Self::TerminalType => 24,
            Self::Naws => 31,
            Self::TerminalSpeed => 32,
            Self::RemoteFlowControl => 33,
            Self::Linemode => 34,
            Self::NewEnviron => 39,
            Self::Charset => 42,
            Self::Mccp2 => 86,
            Self::Mccp3 => 87,
            Self::Gmcp => 201,
            Self::Unknown(b) => *b,
        }
    }
}

/// 解碼器輸出的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    /// 純文字資料（已移除 CR）
    PlainData(Vec<u8>),
    /// 協商命令（WILL, WONT, DO, DONT）
    Negotiation(TelnetCommand, TelnetOption),
    /// GMCP 子協商內容（不含選項位元組）
    GmcpFrame(Vec<u8>),
    /// 其他選項的子協商內容
    Subnegotiation(TelnetOption, Vec<u8>),
    /// IAC GA
    GoAhead,
}

/// 解碼器狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Idle,
    SawIac,
    /// 已收到 IAC 與協商動詞，等待選項位元組
    SawIacVerb(TelnetCommand),
    /// 子協商中；`saw_iac` 表示上一個位元組是內嵌的 IAC，
    /// `overflow` 表示內容已超過上限，剩餘位元組丟棄直到 IAC SE
    InSubnegotiation { saw_iac: bool, overflow: bool },
}

/// Telnet 位元組流解碼器
///
/// 一次處理一個位元組，狀態跨 `feed` 呼叫保留，因此封包在任意位置被切斷都能正確解碼。
#[derive(Debug)]
pub struct TelnetDecoder {
    state: DecoderState,
    /// 尚未輸出的純文字
    data: Vec<u8>,
    /// 目前正在累積的命令位元組（IAC 開頭）
    command: Vec<u8>,
    /// 子協商內容（第一個位元組為選項）
    subnegotiation: Vec<u8>,
    /// 最近一次 `feed` 是否看到 GA
    last_go_ahead: bool,
}

impl TelnetDecoder {
    /// 創建新的解碼器
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            data: Vec::new(),
            command: Vec::new(),
            subnegotiation: Vec::new(),
            last_go_ahead: false,
        }
    }

    /// 解碼一段原始位元組，返回依序產生的事件
    pub fn feed(&mut self, input: &[u8]) -> Vec<TelnetEvent> {
        let mut events = Vec::new();
        self.last_go_ahead = false;

        for &byte in input {
            self.step(byte, &mut events);
        }
        self.flush_data(&mut events);

        events
    }

    /// 最近一次 `feed` 是否包含 GA
    pub fn last_go_ahead(&self) -> bool {
        self.last_go_ahead
    }

    /// 是否停在協定序列中間（例如封包在 IAC 之後被切斷）
    pub fn is_mid_sequence(&self) -> bool {
        self.state != DecoderState::Idle
    }

    /// 重設為初始狀態（斷線後使用）
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn flush_data(&mut self, events: &mut Vec<TelnetEvent>) {
        if !self.data.is_empty() {
            events.push(TelnetEvent::PlainData(std::mem::take(&mut self.data)));
        }
    }

    fn step(&mut self, byte: u8, events: &mut Vec<TelnetEvent>) {
        match self.state {
            DecoderState::Idle => {
                if byte == IAC {
                    self.command.clear();
                    self.command.push(byte);
                    self.state = DecoderState::SawIac;
                } else if byte != b'\r' {
                    self.data.push(byte);
                }
            }
            DecoderState::SawIac => {
                self.command.push(byte);
                if byte == IAC {
                    // IAC IAC = 轉義的 0xFF
                    self.data.push(IAC);
                    self.finish_command();
                    return;
                }

                match TelnetCommand::from_byte(byte) {
                    Some(cmd) if cmd.is_verb() => {
                        self.state = DecoderState::SawIacVerb(cmd);
                    }
                    Some(TelnetCommand::Sb) => {
                        self.subnegotiation.clear();
                        self.state = DecoderState::InSubnegotiation {
                            saw_iac: false,
                            overflow: false,
                        };
                    }
                    Some(TelnetCommand::Se) => {
                        trace!("丟棄孤立的 IAC SE");
                        self.finish_command();
                    }
                    Some(TelnetCommand::GoAhead) => {
                        self.flush_data(events);
                        events.push(TelnetEvent::GoAhead);
                        self.last_go_ahead = true;
                        self.finish_command();
                    }
                    _ => {
                        // NOP、AYT 等單位元組命令
                        trace!("略過 Telnet 命令: {:?}", self.command);
                        self.finish_command();
                    }
                }
            }
            DecoderState::SawIacVerb(cmd) => {
                let option = TelnetOption::from_byte(byte);
                self.flush_data(events);
                events.push(TelnetEvent::Negotiation(cmd, option));
                self.finish_command();
            }
            DecoderState::InSubnegotiation { saw_iac, overflow } => {
                if saw_iac {
                    if byte == TelnetCommand::Se as u8 {
                        if overflow {
                            self.finish_command();
                        } else {
                            self.finish_subnegotiation(events);
                        }
                        return;
                    }
                    if !overflow {
                        self.subnegotiation.push(IAC);
                        if byte != IAC {
                            self.subnegotiation.push(byte);
                        }
                    }
                    self.state = DecoderState::InSubnegotiation { saw_iac: false, overflow };
                } else if byte == IAC {
                    self.state = DecoderState::InSubnegotiation { saw_iac: true, overflow };
                } else if !overflow {
                    self.subnegotiation.push(byte);
                }

                if !overflow && self.subnegotiation.len() > MAX_SUBNEGOTIATION_LEN {
                    trace!("子協商過長，丟棄 {} 位元組", self.subnegotiation.len());
                    self.subnegotiation = Vec::new();
                    if let DecoderState::InSubnegotiation { saw_iac, .. } = self.state {
                        self.state = DecoderState::InSubnegotiation { saw_iac, overflow: true };
                    }
                }
            }
        }
    }

    fn finish_command(&mut self) {
        self.command.clear();
        self.state = DecoderState::Idle;
    }

    fn finish_subnegotiation(&mut self, events: &mut Vec<TelnetEvent>) {
        let mut payload = std::mem::take(&mut self.subnegotiation);
        self.finish_command();

        if payload.is_empty() {
            // IAC SB IAC SE：沒有選項位元組
            return;
        }

        let option = TelnetOption::from_byte(payload.remove(0));
        self.flush_data(events);
        match option {
            TelnetOption::Gmcp => events.push(TelnetEvent::GmcpFrame(payload)),
            other => events.push(TelnetEvent::Subnegotiation(other, payload)),
        }
    }
}

impl Default for TelnetDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// 產生協商命令：IAC <verb> <option>
pub fn encode_negotiation(cmd: TelnetCommand, option: TelnetOption) -> [u8; 3] {
    [IAC, cmd as u8, option.as_byte()]
}

/// 產生子協商：IAC SB <option> <payload> IAC SE，內容中的 IAC 會被加倍
pub fn encode_subnegotiation(option: TelnetOption, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 5);
    out.extend_from_slice(&[IAC, TelnetCommand::Sb as u8, option.as_byte()]);
    out.extend_from_slice(&escape_iac(payload));
    out.extend_from_slice(&[IAC, TelnetCommand::Se as u8]);
    out
}

/// 將資料中的 0xFF 轉義為 IAC IAC
pub fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        out.push(b);
        if b == IAC {
            out.push(IAC);
        }
    }
    out
}
