//! taskgate-server
//!
//! HTTP front end for taskgate-core: rate-limited, API-key-gated task
//! routes plus an in-process worker pool and GC loop.
//!
//! # モジュール構成
//! - **config**: clap による CLI / 環境変数設定
//! - **routes**: axum Router とハンドラ
//! - **auth**: X-API-Key ゲート（CredentialVerifier）
//! - **limit**: ルート単位の rate limit ミドルウェア
//! - **logging**: tracing 初期化と "Incoming Request" ログ
//! - **jobs**: 同梱の work function
//! - **error**: エラーエンベロープ

pub mod auth;
pub mod config;
pub mod error;
pub mod jobs;
pub mod limit;
pub mod logging;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use taskgate_core::ports::SystemClock;
use taskgate_core::{App, AppBuilder, Backend, BuildError, Job, TimeLimits};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::ServerConfig;
use crate::jobs::{Background, BackgroundHandler};
use crate::routes::{AppState, build_router};

/// Wire the core app with the bundled work functions.
pub fn build_app(config: &ServerConfig, backend: Backend) -> Result<App, BuildError> {
    let limits = TimeLimits::new(
        Duration::from_secs(config.soft_time_limit_secs),
        Duration::from_secs(config.hard_time_limit_secs),
    )?;
    AppBuilder::new(backend)
        .with_backend_timeout(config.backend_timeout())
        .register::<Background, _>(
            BackgroundHandler::new(config.background_job_duration()),
            BackgroundHandler::options(limits),
        )?
        .expect_tasks(&[Background::NAME])
        .build()
}

pub fn app_state(config: &ServerConfig, app: Arc<App>) -> AppState {
    AppState {
        app,
        verifier: auth::verifier_from_config(config),
        trust_forwarded_for: config.trust_forwarded_for,
    }
}

/// Run the HTTP server, workers and GC until ctrl-c / SIGTERM.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;
    let addr = config.bind_addr()?;

    let backend = Backend::in_memory(Arc::new(SystemClock), config.store_config());
    let app = Arc::new(build_app(&config, backend)?);

    let workers = app.spawn_workers(config.worker_names(), config.worker_config());
    let (gc_stop, gc_rx) = watch::channel(false);
    let gc = app.gc_loop(config.gc_interval()).spawn(gc_rx);

    let router = build_router(app_state(&config, Arc::clone(&app)));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        %addr,
        workers = ?workers.worker_names(),
        auth_mode = ?config.auth_mode,
        "taskgate listening"
    );

    let served = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    tracing::info!("http server stopped; draining workers");
    workers.shutdown_and_join().await;
    let _ = gc_stop.send(true);
    if let Err(err) = gc.await {
        tracing::warn!(error = %err, "gc loop ended abnormally");
    }

    served.context("http server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
