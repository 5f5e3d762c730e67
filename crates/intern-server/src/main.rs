use http::HeaderValue;
use intern::store::Store;
use intern_server::{configuration::Settings, routes, state::AppState};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let settings = Settings::new()?;
    let addr = settings.server.socket_addr()?;
    let frontend_url = settings.server.frontend_url.clone();

    let store = Arc::new(Store::open(&settings.store.path)?);
    info!("opened store at {}", settings.store.path.display());
    if settings.store.seed_demo_data {
        let (emails, events) = store.seed_demo_data(chrono::Utc::now())?;
        info!(emails, events, "seeded demo data");
    }

    // Create app state
    let state = AppState::from_settings(settings, store)?;

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&frontend_url)?)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    // Run server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
