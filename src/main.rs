//! # ax-oxide 服务入口
//!
//! 连接浏览器的远程调试端点，通过 WebSocket JSON 协议提供无障碍信息查询服务。
//!
//! ## 主要功能
//! - 加载配置并初始化日志
//! - 建立浏览器级别的 CDP 连接
//! - 定期清理过期缓存和空闲资源
//! - 实现优雅关闭和会话清理
//!
//! ## 架构
//! - **CDP 层**: 单个浏览器级 WebSocket 连接，每个目标使用扁平化会话
//! - **会话管理**: 每个被检查的标签页对应一个串行化的调试会话
//! - **服务层**: 请求校验和元素解析流程
//!
//! ## 环境变量
//! - `AX_OXIDE_CONFIG`: 可选的 TOML 配置文件；设置后不再读取下面的 `AX_OXIDE_*` 变量
//! - `AX_OXIDE_HOST` / `AX_OXIDE_PORT`: 监听地址（默认: 127.0.0.1:9333）
//! - `AX_OXIDE_CDP_ENDPOINT`: 浏览器端点（默认: http://localhost:9222）
//! - `RUST_LOG`: 日志过滤器，未设置时使用 `AX_OXIDE_LOG_LEVEL`

use anyhow::Context;
use ax_oxide::{
    cdp::{debugger::list_targets, CdpDebugger},
    config::Config,
    server::InspectorServer,
    service::InspectorService,
    session::SessionManager,
};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("AX_OXIDE_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::from_env()?,
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("ax-oxide server v{}", ax_oxide::VERSION);
    info!("Configuration loaded: host={}, port={}", config.host, config.port);

    let debugger = CdpDebugger::connect(&config.cdp_endpoint)
        .await
        .with_context(|| format!("connecting to {}", config.cdp_endpoint))?;
    match list_targets(&config.cdp_endpoint).await {
        Ok(targets) => info!(
            "Browser has {} page targets",
            targets.iter().filter(|t| t.target_type == "page").count()
        ),
        Err(e) => warn!("Could not list targets: {}", e),
    }

    let manager = SessionManager::new(
        debugger.clone(),
        debugger.clone(),
        config.session_config(),
        &config.cache_config(),
    );
    info!("Session manager initialized");

    // Periodic sweep of expired cache entries and unused resources
    let sweeper = manager.clone();
    let browser = debugger.clone();
    let sweep_interval = Duration::from_millis(config.sweep_interval_ms.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            if !browser.is_connected() {
                warn!("Browser connection is down; requests will fail until restart");
            }
            let outcome = sweeper.sweep();
            info!(
                "Sweep completed: {} cache entries, {} frame contexts, {} resources dropped. Attached sessions: {}",
                outcome.cache_entries,
                outcome.frame_contexts,
                outcome.slots_dropped,
                sweeper.session_count()
            );
        }
    });

    // Setup graceful shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(mut sigterm), Ok(mut sigint)) => {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            info!("Received SIGTERM signal");
                        }
                        _ = sigint.recv() => {
                            info!("Received SIGINT signal");
                        }
                    }
                }
                _ => {
                    warn!("Signal handlers unavailable, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }

        #[cfg(windows)]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C signal");
        }

        let _ = shutdown_tx.send(());
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let server = InspectorServer::bind(addr, InspectorService::new(manager.clone())).await?;
    server
        .run(async {
            shutdown_rx.await.ok();
        })
        .await?;

    info!("Detaching all sessions...");
    manager.shutdown().await;
    if let Err(e) = debugger.close().await {
        warn!("Failed to close browser connection: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}
