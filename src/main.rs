//! Hookline broker service entry point.
//!
//! Wires configuration, the connection pool, migrations, seed bootstrap,
//! the dispatcher and sweeper loops, and the HTTP server, then coordinates
//! graceful shutdown.

use anyhow::{Context, Result};
use hookline_api::Config;
use hookline_core::{bootstrap::bootstrap, storage::Storage, Db};
use hookline_dispatch::{Dispatcher, Sweeper};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("loading configuration")?;
    init_tracing(&config.rust_log);

    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        "starting hookline broker"
    );

    let db = Db::connect(
        &config.database_url,
        config.database_max_connections,
        config.database_min_connections,
        std::time::Duration::from_secs(config.database_connection_timeout),
    )
    .await
    .context("connecting to the database")?;

    sqlx::migrate!("./migrations").run(db.pool()).await.context("running migrations")?;
    info!("migrations applied");

    let storage = Storage::new(db.pool().clone());
    bootstrap(&storage, &config.seed).await.context("applying seed data")?;

    let cancel = CancellationToken::new();

    let dispatcher =
        Dispatcher::new(storage.clone(), config.to_dispatcher_config(), cancel.clone())
            .context("building dispatcher")?;
    let dispatcher_handle = tokio::spawn(dispatcher.run());

    let sweeper = Sweeper::new(storage.clone(), config.to_sweeper_config(), cancel.clone());
    let sweeper_handle = tokio::spawn(sweeper.run());

    let addr = config.parse_server_addr().context("parsing server address")?;
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        hookline_api::start_server(storage, &config, addr, server_cancel).await
    });

    shutdown_signal().await;
    info!("shutdown signal received");
    cancel.cancel();

    let (dispatcher_result, sweeper_result, server_result) =
        tokio::join!(dispatcher_handle, sweeper_handle, server_handle);
    dispatcher_result.context("dispatcher task panicked")?;
    sweeper_result.context("sweeper task panicked")?;
    server_result.context("server task panicked")?.context("server failed")?;

    info!("hookline broker stopped");
    Ok(())
}

fn init_tracing(filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter.to_string()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
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
            },
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
