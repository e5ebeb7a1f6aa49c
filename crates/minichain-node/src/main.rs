use anyhow::{Context, Result};
use clap::Parser;
use minichain_core::MiningReward;
use minichain_node::{
    router,
    state::{generate_node_id, open_ledger},
    AppState, Args, HttpTransport, NodeConfig,
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = NodeConfig::try_from(Args::parse())?;
    let node_id = generate_node_id();
    let reward = MiningReward::new(
        node_id.clone(),
        config.reward_receiver.clone(),
        config.reward_amount,
    );

    let (ledger, store) = open_ledger(&config)?;
    let transport = HttpTransport::new(config.peer_timeout).context("building HTTP client")?;
    let mut state = AppState::new(ledger, transport, reward);
    if let Some(store) = store.clone() {
        state = state.with_store(store);
    }

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(
        %node_id,
        difficulty = config.difficulty,
        "minichain-node listening on http://{}",
        config.listen
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(store) = store {
        store.close()?;
    }
    info!("minichain-node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
