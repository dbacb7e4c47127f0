use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use lingo_backend::{
    AppState, build_router,
    cache::RedisStore,
    config::Config,
    database::PgUserRepository,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'lingo_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 连接共享存储
    let store = RedisStore::connect(
        &config.redis_url,
        config.redis_connect_timeout(),
        config.redis_response_timeout(),
    )
    .await
    .expect("Failed to connect to Redis");

    let sweep_interval = config.sweep_interval();
    let grace_period = config.shutdown_grace_period();
    let host = config.server_host.clone();
    let port = config.server_port;

    let state = AppState::new(
        config,
        Arc::new(store),
        Arc::new(PgUserRepository::new(pool)),
    );

    // 从共享存储恢复缓存
    state
        .sessions
        .hydrate()
        .await
        .expect("Failed to hydrate sessions");
    state
        .rate_limiter
        .hydrate()
        .await
        .expect("Failed to hydrate ratelimits");

    state.sessions.spawn_sweeper(sweep_interval);
    state.rate_limiter.spawn_sweeper(sweep_interval);

    let sessions = state.sessions.clone();
    let rate_limiter = state.rate_limiter.clone();
    let app = build_router(state);

    // 启动服务器
    let addr = SocketAddr::new(
        host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    // 写回缓存，超过宽限期的操作直接放弃
    let closing = futures_util::future::join(sessions.close(), rate_limiter.close());
    match tokio::time::timeout(grace_period, closing).await {
        Ok((sessions, ratelimits)) => tracing::info!(
            "Flushed {} sessions and {} ratelimits before exiting",
            sessions,
            ratelimits
        ),
        Err(_) => tracing::warn!(
            "Cache flush did not finish within {:?}, exiting anyway",
            grace_period
        ),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down");
}
