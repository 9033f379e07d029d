//! 原始位元組追蹤
//!
//! 以十六進位記錄進出 socket 的位元組，排查協定問題時使用。未呼叫 `init` 前不做任何事。

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

lazy_static::lazy_static! {
    static ref WIRE_TRACE: Mutex<Option<WireTrace>> = Mutex::new(None);
}

/// 資料方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Self::Inbound => "RECV",
            Self::Outbound => "SEND",
        }
    }
}

pub struct WireTrace {
    file: File,
}

impl WireTrace {
    /// 開啟追蹤檔（覆寫既有檔案）
    pub fn init(path: PathBuf) -> io::Result<()> {
        let file = File::create(path)?;
        if let Ok(mut trace) = WIRE_TRACE.lock() {
            *trace = Some(WireTrace { file });
        }
        Ok(())
    }

    /// 關閉追蹤
    pub fn shutdown() {
        if let Ok(mut trace) = WIRE_TRACE.lock() {
            *trace = None;
        }
    }

    pub fn is_enabled() -> bool {
        WIRE_TRACE.lock().map(|t| t.is_some()).unwrap_or(false)
    }

    pub fn record(direction: Direction, bytes: &[u8]) {
        if let Ok(mut trace) = WIRE_TRACE.lock() {
            if let Some(t) = trace.as_mut() {
                let _ = writeln!(
                    t.file,
                    "[{}] {}: [{}]",
                    unix_timestamp(),
                    direction.label(),
                    hex_dump(bytes)
                );
            }
        }
    }
}

/// `[0xFF, 0xF9]` -> `"FF F9"`
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn unix_timestamp() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}
