use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use coordinator::{Application, RunnerError};
use coordinator_core::config::{AppConfig, LogFormat, TransportKind};
use coordinator_core::init_logging;
use tracing::{error, info, warn};

/// 运行模式
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// 进程内事件传输，单进程运行
    Embedded,
    /// Redis Streams 事件传输
    Redis,
}

impl From<Mode> for TransportKind {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Embedded => TransportKind::InMemory,
            Mode::Redis => TransportKind::RedisStream,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "coordinator", version, about = "分布式算力市场协调层")]
struct Cli {
    /// 配置文件路径，未指定时按默认路径查找
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 运行模式，覆盖配置中的事件传输类型
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// 日志级别
    #[arg(short, long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_parser = ["json", "pretty"])]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载配置失败".to_string(),
    })?;

    if let Some(mode) = cli.mode {
        config.event_bus.transport = mode.into();
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format.parse::<LogFormat>()?;
    }
    if config.event_bus.consumer_name.is_empty() {
        config.event_bus.consumer_name = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_default();
    }

    init_logging(&config.logging)?;

    info!("启动分布式算力市场协调层");
    info!(transport = ?config.event_bus.transport, "运行模式");

    let app = Application::new(config).await?;

    match app.run().await {
        Ok(()) => {
            info!("协调层已优雅关闭");
            Ok(())
        }
        Err(RunnerError::Shutdown(failures)) => {
            for failure in &failures {
                warn!(error = %failure, "关停错误");
            }
            Err(RunnerError::Shutdown(failures).into())
        }
        Err(e) => {
            error!(error = %e, "协调层启动失败");
            Err(e.into())
        }
    }
}
