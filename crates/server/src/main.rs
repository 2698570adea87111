//! 主应用程序入口
//!
//! 加载配置、初始化日志与指标、连接数据库并启动 HTTP/WebSocket 服务。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use application::{
    Hub, MessageService, MessageStore, PasswordHasher, RefreshTokenStore, RoomService, RoomStore,
    TokenService, UserService, UserStore,
};
use config::AppConfig;
use infrastructure::{connect_with_retry, BcryptPasswordHasher, PgStorage, MIGRATOR};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;
use web_api::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env();
    cfg.validate()?;
    init_tracing(&cfg.env);
    web_api::metrics::install()?;

    let pool = connect_with_retry(&cfg.database_dsn).await?;
    MIGRATOR.run(&pool).await?;

    let storage = PgStorage::new(pool.clone());
    let tokens = Arc::new(TokenService::new(
        &cfg.jwt_secret,
        cfg.access_token_ttl_minutes,
        cfg.refresh_token_ttl_days,
    ));
    let hasher: Arc<dyn PasswordHasher> = Arc::new(BcryptPasswordHasher::default());
    let hub = Arc::new(Hub::new());

    let users = Arc::new(UserService::new(
        Arc::clone(&storage.users) as Arc<dyn UserStore>,
        Arc::clone(&storage.refresh_tokens) as Arc<dyn RefreshTokenStore>,
        hasher,
        Arc::clone(&tokens),
    ));
    let rooms = Arc::new(RoomService::new(
        Arc::clone(&storage.rooms) as Arc<dyn RoomStore>,
        Arc::clone(&hub),
    ));
    let messages = Arc::new(MessageService::new(
        Arc::clone(&storage.messages) as Arc<dyn MessageStore>,
        Arc::clone(&storage.users) as Arc<dyn UserStore>,
    ));

    let state = AppState {
        users,
        rooms,
        messages,
        tokens,
        hub: Arc::clone(&hub),
        env: cfg.env.clone(),
    };
    let app = web_api::router(state);

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, env = %cfg.env, "chat server listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining connections");
    let _ = shutdown_tx.send(());

    // 在途请求最多 10 秒排空；长连接随进程退出断开，客户端自行重连
    match tokio::time::timeout(Duration::from_secs(10), server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!("drain window elapsed, forcing shutdown"),
    }

    hub.shutdown();
    pool.close().await;
    tracing::info!("chat server stopped");
    Ok(())
}

fn init_tracing(env: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env == "dev" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
