//! Telnet 客戶端
//!
//! 非同步 TCP 傳輸層：只負責搬運位元組，Telnet 解碼交給 [`crate::session::TelnetSession`]。

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::debug_log::{Direction, WireTrace};

/// Telnet 客戶端錯誤
#[derive(Debug, Error)]
pub enum TelnetError {
    #[error("連線失敗: {0}")]
    ConnectionFailed(#[from] io::Error),

    #[error("連線逾時")]
    Timeout,

    #[error("未連線")]
    NotConnected,

    #[error("連線已被伺服器關閉")]
    ConnectionClosed,

    #[error("DNS 解析失敗: {0}")]
    DnsResolutionFailed(String),

    #[error("DNS 解析已取消")]
    LookupAborted,
}

/// 連線狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Resolving,
    Connecting,
    Connected,
}

/// Telnet 客戶端配置
#[derive(Debug, Clone)]
pub struct TelnetConfig {
    /// 連線逾時（秒）
    pub connect_timeout: Duration,
    /// 讀取緩衝區大小
    pub read_buffer_size: usize,
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_buffer_size: 8192,
        }
    }
}

/// 進行中的主機名稱解析，可在完成前取消
#[derive(Debug)]
pub struct LookupHandle {
    host: String,
    task: JoinHandle<Result<Vec<SocketAddr>, TelnetError>>,
}

impl LookupHandle {
    /// 在背景解析主機名稱
    pub fn spawn(host: &str, port: u16) -> Self {
        let target = format!("{}:{}", host, port);
        let host_name = host.to_string();
        let task = tokio::spawn(async move {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&target)
                .await
                .map_err(|e| TelnetError::DnsResolutionFailed(e.to_string()))?
                .collect();
            if addrs.is_empty() {
                return Err(TelnetError::DnsResolutionFailed(format!(
                    "無法解析主機: {}",
                    host_name
                )));
            }
            Ok(addrs)
        });

        Self {
            host: host.to_string(),
            task,
        }
    }

    /// 取消解析（斷線要求早於解析完成時使用）
    pub fn abort(&self) {
        info!("取消解析 {}", self.host);
        self.task.abort();
    }

    /// 可在其他任務中取消解析的控制代碼
    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }

    /// 等待解析結果
    pub async fn addresses(self) -> Result<Vec<SocketAddr>, TelnetError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(TelnetError::LookupAborted),
            Err(e) => Err(TelnetError::DnsResolutionFailed(e.to_string())),
        }
    }
}

/// Telnet 客戶端
#[derive(Debug)]
pub struct TelnetClient {
    stream: Option<TcpStream>,
    config: TelnetConfig,
    state: ConnectionState,
}

impl TelnetClient {
    /// 創建新的 Telnet 客戶端
    pub fn new(config: TelnetConfig) -> Self {
        Self {
            stream: None,
            config,
            state: ConnectionState::Disconnected,
        }
    }

    /// 獲取連線狀態
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// 解析並連線到 MUD 伺服器
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), TelnetError> {
        self.state = ConnectionState::Resolving;
        info!("正在連線到 {}:{}", host, port);

        let addrs = match LookupHandle::spawn(host, port).addresses().await {
            Ok(addrs) => addrs,
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                return Err(e);
            }
        };
        self.connect_to(&addrs).await
    }

    /// 連線到已解析的位址（依序嘗試）
    pub async fn connect_to(&mut self, addrs: &[SocketAddr]) -> Result<(), TelnetError> {
        self.state = ConnectionState::Connecting;
        debug!("已解析到位址: {:?}", addrs);

        let mut last_error = TelnetError::DnsResolutionFailed("沒有可用的位址".to_string());
        for addr in addrs {
            match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true)?;
                    info!("已連線到 {}", addr);
                    self.stream = Some(stream);
                    self.state = ConnectionState::Connected;
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!("連線 {} 失敗: {}", addr, e);
                    last_error = TelnetError::ConnectionFailed(e);
                }
                Err(_) => {
                    warn!("連線 {} 逾時", addr);
                    last_error = TelnetError::Timeout;
                }
            }
        }

        self.state = ConnectionState::Disconnected;
        Err(last_error)
    }

    /// 斷開連線
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.state = ConnectionState::Disconnected;
        info!("已斷開連線");
    }

    /// 發送原始位元組到伺服器
    pub async fn write(&mut self, data: &[u8]) -> Result<(), TelnetError> {
        let stream = self.stream.as_mut().ok_or(TelnetError::NotConnected)?;
        WireTrace::record(Direction::Outbound, data);
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    /// 讀取一段原始位元組
    pub async fn read(&mut self) -> Result<Vec<u8>, TelnetError> {
        let stream = self.stream.as_mut().ok_or(TelnetError::NotConnected)?;

        let mut buffer = vec![0u8; self.config.read_buffer_size];
        let n = stream.read(&mut buffer).await?;

        if n == 0 {
            self.stream = None;
            self.state = ConnectionState::Disconnected;
            return Err(TelnetError::ConnectionClosed);
        }

        buffer.truncate(n);
        WireTrace::record(Direction::Inbound, &buffer);
        Ok(buffer)
    }
}

impl Default for TelnetClient {
    fn default() -> Self {
        Self::new(TelnetConfig::default())
    }
}
