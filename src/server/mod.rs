pub mod page;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::ServerState;

use tokio::net::TcpListener;

/// HTTPサーバを起動し、Ctrl+C で停止するまで待つ
pub async fn serve(state: ServerState) -> anyhow::Result<()> {
    let address = state.settings.bind_address();
    let listener = TcpListener::bind(&address).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("サーバを停止しました");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("シグナル待ち受けに失敗しました: {}", e);
    }
}
