//! 終端機 MUD 客戶端
//!
//! 從標準輸入讀取命令，伺服器輸出直接印到標準輸出。以 `#quit` 或 EOF 離開，
//! `#key <按鍵>` 觸發快捷鍵，`#save` 把目前設定寫回設定檔。

mod config;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use mudcore::telnet::LookupHandle;
use mudcore::{ScriptEngine, SessionEvent, TelnetClient, TelnetConfig, TelnetError, TelnetSession, WireTrace};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::ClientConfig;

/// mudcli - 終端機 MUD 客戶端
#[derive(Parser, Debug)]
#[command(name = "mudcli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 設定檔路徑（預設為使用者設定目錄下的 mudcli/config.json）
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// 伺服器主機
    #[arg(long)]
    host: Option<String>,

    /// 伺服器連接埠
    #[arg(long)]
    port: Option<u16>,

    /// 把原始位元組以十六進位寫入此檔案
    #[arg(long, value_name = "PATH")]
    wire_trace: Option<PathBuf>,
}

impl Cli {
    /// 命令列參數覆蓋設定檔
    fn apply(self, config: &mut ClientConfig) {
        if let Some(host) = self.host {
            config.connection.host = host;
        }
        if let Some(port) = self.port {
            config.connection.port = port;
        }
        if let Some(path) = self.wire_trace {
            config.wire_trace = Some(path);
        }
    }
}

/// 標準輸入的一行
enum Input {
    Line(String),
    Eof,
}

/// 以 `#` 開頭、由客戶端自己處理的命令
#[derive(Debug, PartialEq, Eq)]
enum LocalCommand<'a> {
    Quit,
    Save,
    Key(&'a str),
}

impl<'a> LocalCommand<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        match line.trim() {
            "#quit" => Some(Self::Quit),
            "#save" => Some(Self::Save),
            other => other
                .strip_prefix("#key ")
                .map(str::trim)
                .filter(|keys| !keys.is_empty())
                .map(Self::Key),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = cli.config.clone().unwrap_or_else(ClientConfig::config_path);
    let mut config = ClientConfig::load_from(&path)
        .with_context(|| format!("無法載入設定檔 {}", path.display()))?;
    cli.apply(&mut config);

    // 初始化日誌（輸出到 stderr，避免與 MUD 輸出混在一起）
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Some(trace_path) = &config.wire_trace {
        WireTrace::init(trace_path.clone())
            .with_context(|| format!("無法建立追蹤檔 {}", trace_path.display()))?;
    }

    let mut scripts = ScriptEngine::new();
    for (name, code) in &config.scripts {
        scripts.load_script(name.as_str(), code.as_str());
    }
    let profile = config.profile.build_profile()?;
    let mut session = TelnetSession::new(config.session_config(), profile, scripts);

    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Input>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if input_tx.send(Input::Line(line)).is_err() {
                return;
            }
        }
        let _ = input_tx.send(Input::Eof);
    });

    let host = config.connection.host.clone();
    let port = config.connection.port;
    println!(">>> 正在連線到 {}:{}", host, port);

    // 解析期間按 Ctrl+C 會取消解析
    let lookup = LookupHandle::spawn(&host, port);
    let abort = lookup.abort_handle();
    let addrs = tokio::select! {
        result = lookup.addresses() => result,
        _ = tokio::signal::ctrl_c() => {
            abort.abort();
            println!(">>> 已取消");
            return Ok(());
        }
    };
    let addrs = match addrs {
        Ok(addrs) => addrs,
        Err(e) => {
            println!(">>> 連線失敗: {}", e);
            return Ok(());
        }
    };

    let mut client = TelnetClient::new(TelnetConfig::default());
    if let Err(e) = client.connect_to(&addrs).await {
        println!(">>> 連線失敗: {}", e);
        return Ok(());
    }
    println!(">>> 已連線到 {}:{}", host, port);

    let mut timers = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            result = client.read() => match result {
                Ok(data) => print_events(session.receive(&data)),
                Err(TelnetError::ConnectionClosed) => {
                    println!(">>> 連線已關閉");
                    break;
                }
                Err(e) => {
                    error!("讀取失敗: {}", e);
                    println!(">>> 錯誤: {}", e);
                    break;
                }
            },
            input = input_rx.recv() => match input {
                Some(Input::Line(line)) => {
                    let line = line.trim_end();
                    match LocalCommand::parse(line) {
                        Some(LocalCommand::Quit) => break,
                        Some(LocalCommand::Save) => match config.save_to(&path) {
                            Ok(()) => println!(">>> 設定已儲存到 {}", path.display()),
                            Err(e) => {
                                warn!("儲存設定失敗: {}", e);
                                println!(">>> 儲存失敗: {}", e);
                            }
                        },
                        Some(LocalCommand::Key(keys)) => match session.press_keys(keys) {
                            Some(events) => print_events(events),
                            None => println!(">>> 沒有對應 {} 的快捷鍵", keys),
                        },
                        None => print_events(session.send_command(line)),
                    }
                }
                Some(Input::Eof) | None => break,
            },
            _ = timers.tick() => print_events(session.tick(Instant::now())),
            _ = tokio::signal::ctrl_c() => break,
        }

        if session.has_outbound() {
            let data = session.take_outbound();
            if let Err(e) = client.write(&data).await {
                warn!("寫入失敗: {}", e);
                println!(">>> 發送失敗: {}", e);
                break;
            }
        }
    }

    client.disconnect().await;
    WireTrace::shutdown();
    info!("已結束");
    println!(">>> 已斷開連線");
    Ok(())
}

/// 把會話事件印到終端機
fn print_events(events: Vec<SessionEvent>) {
    use std::io::Write;

    for event in events {
        match event {
            SessionEvent::Line { text, visible } => {
                if visible {
                    println!("{}", text);
                }
            }
            SessionEvent::Prompt { text, visible } => {
                if visible {
                    print!("{}", text);
                    let _ = std::io::stdout().flush();
                }
            }
            SessionEvent::Echo(text) => println!("{}", text),
            SessionEvent::Error(e) => {
                println!(">>> {}", e);
                if let mudcore::RuleError::Script {
                    excerpt: Some(excerpt),
                    ..
                } = &e
                {
                    println!("{}", excerpt);
                }
            }
            SessionEvent::Gmcp(message) => info!("GMCP {} {}", message.name, message.json()),
            SessionEvent::Latency(latency) => info!("延遲 {} ms", latency.as_millis()),
            SessionEvent::LocalEcho(on) => info!("本地回顯: {}", on),
            SessionEvent::GmcpEnabled => info!("GMCP 已啟用"),
            SessionEvent::GmcpDisabled => info!("GMCP 已關閉"),
            SessionEvent::OptionRefused(option) => info!("拒絕選項 {:?}", option),
        }
    }
}
