mod status;

use std::sync::Arc;

use autowifi_core::config;
use autowifi_core::controller::ReconnectController;
use autowifi_core::factory;
use autowifi_core::traits::EventSource as _;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// 如果没有选择任何后端，编译失败
#[cfg(not(any(
    feature = "backend_linux",
    feature = "backend_nmcli",
    feature = "backend_wpa_cli",
    feature = "backend_wpa_dbus",
    feature = "backend_mock"
)))]
compile_error!(
    "No backend feature selected. Please choose one, e.g., --features autowifi-daemon/backend_linux"
);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = &*config::CONFIG;
    anyhow::ensure!(
        !cfg.target.ssid.is_empty(),
        "Target SSID is empty. Edit configs/autowifi.toml and rebuild."
    );
    info!(
        "🚀 autowifi starting: keeping '{}' on {}",
        cfg.target.ssid, cfg.interface
    );

    // 1. 基于特性（和运行时能力探测）决定实例化哪个后端
    let backend = factory::create_backend(cfg).await?;

    // 2. 订阅系统连通性变化通知；失败时仅靠定时器驱动
    let events = match backend.events.subscribe() {
        Ok(rx) => rx,
        Err(e) => {
            warn!("Connectivity-change subscription unavailable ({e}); relying on the timer alone");
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            rx
        }
    };

    // 3. 启动重连控制循环
    let controller = ReconnectController::new(
        backend.radio,
        backend.initiator,
        Arc::new(status::LogNotifier::new()),
        cfg.target.clone(),
        cfg.loop_config.clone(),
    );
    let handle = controller.spawn(events);

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutdown requested, stopping reconnect loop");
    handle.stop().await;
    Ok(())
}
