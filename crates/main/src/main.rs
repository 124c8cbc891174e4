//! 主应用程序入口
//!
//! 读取配置、组装存储与服务，然后启动 Axum Web 服务。

use std::sync::Arc;

use anyhow::Context;
use application::{
    services::{ChatService, ChatServiceDependencies, UserService, UserServiceDependencies},
    Clock, PresenceRegistry, SystemClock,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

/// 未设置 `RUST_LOG` 时的过滤规则，各层的丢弃事件等调试日志默认可见
const DEFAULT_LOG_FILTER: &str = "info,duochat=debug,application=debug,web_api=debug,infrastructure=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = AppConfig::load().context("加载配置失败")?;
    tracing::info!(
        backend = ?config.storage.backend,
        allow_plain_username = config.auth.allow_plain_username,
        "配置已加载"
    );

    let infrastructure = Infrastructure::connect((&config).into())
        .await
        .context("初始化存储失败")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let user_service = UserService::new(UserServiceDependencies {
        user_repository: infrastructure.user_repository.clone(),
        password_hasher: infrastructure.password_hasher_trait(),
        clock: clock.clone(),
    });

    let chat_service = ChatService::new(ChatServiceDependencies {
        presence: Arc::new(PresenceRegistry::new()),
        message_store: infrastructure.message_store.clone(),
        dispatcher: infrastructure.dispatcher(),
        clock,
        ring_timeout: config.calls.ring_timeout(),
    });

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState::new(
        Arc::new(user_service),
        Arc::new(chat_service),
        infrastructure.hub.clone(),
        jwt_service,
    )
    .with_plain_username(config.auth.allow_plain_username);

    let app = router(state);
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("无法监听 {address}"))?;

    tracing::info!("聊天服务器启动在 http://{address}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务器已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，开始优雅关闭");
}
