use dotenvy::dotenv;
use tracing::info;

use drivetest_api::infra::{
    app::create_app,
    reconciliation_worker::run_reconciliation_loop,
    setup::{init_app_state, init_tracing},
};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let app_state = init_app_state().await?;

    let bind_addr = app_state.config.bind_addr;

    // Spawn the reconciliation sweep (after tracing is initialized)
    let lifecycle = app_state.subscription_use_cases.clone();
    let every = app_state.config.reconcile_interval;
    let stale_after = app_state.config.reconcile_stale_after;
    let batch_size = app_state.config.reconcile_batch_size;
    tokio::spawn(async move {
        run_reconciliation_loop(lifecycle, every, stale_after, batch_size).await;
    });

    let app = create_app(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Backend listening at {}", &listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
