use anyhow::{Context, Result};
use clap::Parser;

use routechoice_server::settings::Args;
use routechoice_server::{AppState, create_router};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let state = AppState::from_args(&args).context("failed to initialise application state")?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&args.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", args.bind_address))?;
    log::info!("route choice study server listening on http://{}", args.bind_address);

    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}
