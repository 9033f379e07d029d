//! Go-Ahead 提示列與延遲量測
//!
//! 伺服器在提示列（prompt）之後送出 IAC GA。追蹤器據此：
//! - 將未以 LF 結束的緩衝內容視為提示列
//! - 遞減尚未被回應的命令數
//! - 以第一個未回應命令的送出時間計算往返延遲

use std::time::{Duration, Instant};

use tracing::debug;

/// 超過此時間未送出新命令，待回應計數即視為不可靠而歸零
pub const STALE_COMMAND_THRESHOLD: Duration = Duration::from_millis(2000);

/// 收到 GA 後應採取的動作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoAheadAction {
    /// 將目前緩衝內容輸出為提示列；若量測完成則附帶延遲
    FlushPrompt { latency: Option<Duration> },
    /// 相容模式：把 GA 當成換行
    InjectNewline,
}

/// 提示列與延遲追蹤器
#[derive(Debug, Default)]
pub struct PromptTracker {
    force_go_ahead_off: bool,
    pending_commands: u32,
    last_send: Option<Instant>,
    latency_started: Option<Instant>,
    last_latency: Option<Duration>,
}

impl PromptTracker {
    /// 創建新的追蹤器
    pub fn new(force_go_ahead_off: bool) -> Self {
        Self {
            force_go_ahead_off,
            ..Self::default()
        }
    }

    /// 設定是否強制把 GA 當作換行
    pub fn set_force_go_ahead_off(&mut self, value: bool) {
        self.force_go_ahead_off = value;
    }

    pub fn force_go_ahead_off(&self) -> bool {
        self.force_go_ahead_off
    }

    /// 尚未被 GA 回應的命令數
    pub fn pending_commands(&self) -> u32 {
        self.pending_commands
    }

    /// 最近一次量測到的延遲
    pub fn last_latency(&self) -> Option<Duration> {
        self.last_latency
    }

    /// 是否有進行中的延遲量測
    pub fn is_measuring(&self) -> bool {
        self.latency_started.is_some()
    }

    /// 記錄一次送出
    pub fn on_send(&mut self) {
        self.on_send_at(Instant::now());
    }

    /// 記錄一次送出（指定時間，供測試使用）
    pub fn on_send_at(&mut self, now: Instant) {
        if self.pending_commands == 0 {
            self.latency_started = Some(now);
        }
        self.pending_commands += 1;
        self.last_send = Some(now);
    }

    /// 處理 GA
    pub fn on_go_ahead(&mut self) -> GoAheadAction {
        self.on_go_ahead_at(Instant::now())
    }

    /// 處理 GA（指定時間，供測試使用）
    pub fn on_go_ahead_at(&mut self, now: Instant) -> GoAheadAction {
        if self.force_go_ahead_off {
            return GoAheadAction::InjectNewline;
        }

        self.pending_commands = self.pending_commands.saturating_sub(1);
        if let Some(last) = self.last_send {
            if now.saturating_duration_since(last) > STALE_COMMAND_THRESHOLD {
                self.pending_commands = 0;
            }
        }

        let latency = self
            .latency_started
            .take()
            .map(|started| now.saturating_duration_since(started));
        if let Some(latency) = latency {
            debug!("延遲: {} ms", latency.as_millis());
            self.last_latency = Some(latency);
        }

        GoAheadAction::FlushPrompt { latency }
    }

    /// 斷線後重設計數與量測
    pub fn reset(&mut self) {
        *self = Self::new(self.force_go_ahead_off);
    }
}

/// [`strip_leading_newline`] 的結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadingNewline {
    /// 已刪除開頭的 LF
    Removed,
    /// 開頭不是 LF
    Absent,
    /// 資料只有 ANSI 序列（或為空），要等下一段資料才能判斷
    Pending,
}

/// 移除提示列之後多餘的開頭換行
///
/// 先跳過開頭的 ANSI 控制序列，若緊接著是 LF 則刪除該 LF。
pub fn strip_leading_newline(data: &mut Vec<u8>) -> LeadingNewline {
    let offset = skip_ansi_sequences(data);
    match data.get(offset) {
        Some(&b'\n') => {
            data.remove(offset);
            LeadingNewline::Removed
        }
        Some(_) => LeadingNewline::Absent,
        None => LeadingNewline::Pending,
    }
}

fn skip_ansi_sequences(data: &[u8]) -> usize {
    let mut i = 0;
    while i < data.len() && data[i] == 0x1B {
        if data.get(i + 1) == Some(&b'[') {
            // CSI：參數後以 0x40-0x7E 結束
            let mut j = i + 2;
            while j < data.len() && !(0x40..=0x7E).contains(&data[j]) {
                j += 1;
            }
            if j >= data.len() {
                return i;
            }
            i = j + 1;
        } else if i + 1 < data.len() {
            i += 2;
        } else {
            return i;
        }
    }
    i
}
