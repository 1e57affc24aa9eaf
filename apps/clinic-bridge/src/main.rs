use anyhow::{Context, Result};
use clinic_bridge::{build_state, init_tracing, router, BridgeConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = BridgeConfig::from_env().context("Configuração inválida")?;
    init_tracing(config.json_logs);

    let addr = config.bind_addr;
    let state = build_state(config)?;
    let sessions = state.sessions.clone();
    let app = router(state);

    info!(%addr, "Clinic Bridge escutando");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Falha no servidor HTTP")?;

    sessions.close_all().await;
    info!("Clinic Bridge encerrado");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Falha ao escutar sinal de desligamento");
    }
    info!("Sinal de desligamento recebido");
}
