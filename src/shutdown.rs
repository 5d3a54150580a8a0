//! 操作系统关停信号

use tracing::info;

/// 等待终止信号
///
/// Unix 上监听 SIGINT、SIGTERM 与 SIGQUIT，其他平台只监听 Ctrl+C。
/// 信号处理器安装失败时返回错误。
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let received = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    info!(signal = received, "收到关停信号");
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!(signal = "ctrl_c", "收到关停信号");
    Ok(())
}
