use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::database::{DatabaseConfig, apply_schema, health_check, init_pool};
use loyalty::{
    accrual::{AccrualApi, AccrualClient},
    balance::{BalanceService, Invalidator},
    config::Config,
    order::OrderService,
    repositories::{
        OrderRepo, PgOrderRepo, PgPinger, PgUserRepo, PgWithdrawalRepo, Pinger, UserRepo,
        WithdrawalRepo,
    },
    routes,
    state::AppState,
    updater::{OrderUpdater, UpdaterConfig},
    withdraw::WithdrawService,
};

/// Time allowed for in-flight work to drain after a shutdown signal.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load();
    info!("Starting loyalty service");

    let db_config = DatabaseConfig::new(&config.database_uri)?;
    let pool = init_pool(&db_config).await?;
    apply_schema(&pool, include_str!("../migrations/0001_init.sql")).await?;

    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    let users: Arc<dyn UserRepo> = Arc::new(PgUserRepo::new(pool.clone()));
    let orders: Arc<dyn OrderRepo> = Arc::new(PgOrderRepo::new(pool.clone()));
    let withdrawals: Arc<dyn WithdrawalRepo> = Arc::new(PgWithdrawalRepo::new(pool.clone()));
    let pinger: Arc<dyn Pinger> = Arc::new(PgPinger::new(pool.clone()));

    let balance = Arc::new(BalanceService::new(orders.clone(), withdrawals.clone()));
    let invalidator: Arc<dyn Invalidator> = balance.clone();
    let withdraw = Arc::new(WithdrawService::new(
        orders.clone(),
        withdrawals.clone(),
        invalidator.clone(),
    ));
    let order_ingress = OrderService::new(orders.clone());
    let jwt = loyalty::jwt::JwtService::new(&config.jwt_secret);

    let cancel = CancellationToken::new();

    let accrual: Arc<dyn AccrualApi> =
        Arc::new(AccrualClient::new(&config.accrual_address, cancel.clone())?);
    let updater = OrderUpdater::new(
        orders.clone(),
        accrual,
        invalidator,
        UpdaterConfig::default(),
    );
    let updater_handle = tokio::spawn(updater.run(cancel.clone()));

    let state = AppState {
        users,
        orders,
        withdrawals,
        balance,
        withdraw,
        order_ingress,
        jwt,
        pinger,
    };

    let app = routes::create_router(state);
    let bind_address = config.bind_address();
    let listener = TcpListener::bind(&bind_address).await?;
    info!("Loyalty service listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if tokio::time::timeout(SHUTDOWN_DRAIN, updater_handle)
        .await
        .is_err()
    {
        warn!("Order updater did not drain within the shutdown window");
    }
    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}

/// Resolve on SIGINT or SIGTERM, cancelling the shared shutdown token.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
    cancel.cancel();
}
