use std::sync::Arc;

use modelgate::providers::factory::ProviderRegistry;
use modelgate::ModelRouter;
use modelgate_server::configuration::Settings;
use modelgate_server::middleware::AuthConfig;
use modelgate_server::{app, logging, AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::new()?;

    // Initialize tracing for logging
    logging::init(settings.log.format)?;
    logging::install_panic_hook();

    let registry = ProviderRegistry::from_configs(settings.provider_configs()?)?;
    let router = Arc::new(ModelRouter::new(&registry));
    info!(
        providers = registry.providers().len(),
        models = router.list_models().len(),
        "model routes ready"
    );

    let Settings {
        server,
        auth,
        defaults,
        ..
    } = settings;

    if auth.secret.is_none() {
        warn!("MODELGATE_AUTH__SECRET is not set; inbound calls are not authenticated");
    }

    let addr = server.socket_addr()?;
    let state = AppState::new(router, defaults, &server, AuthConfig::new(auth.secret));

    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
