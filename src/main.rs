use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use expo_checkin::config::Config;
use expo_checkin::models::Role;
use expo_checkin::routes::create_routes;
use expo_checkin::state::AppState;
use expo_checkin::store::{Backend, MemoryBackend, PgBackend};

const BOOTSTRAP_SESSION_TTL_HOURS: i64 = 24 * 7;

async fn open_backend(config: &Config) -> Result<Arc<dyn Backend>, Box<dyn std::error::Error>> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on exit");
        let backend = MemoryBackend::new();
        if let Some(token) = config.bootstrap_admin_token.as_deref() {
            backend
                .insert_session(
                    token,
                    "admin@localhost",
                    Role::Admin,
                    ChronoDuration::hours(BOOTSTRAP_SESSION_TTL_HOURS),
                )
                .await;
            tracing::info!("Seeded bootstrap admin session");
        }
        return Ok(Arc::new(backend));
    };

    let backend = PgBackend::connect(database_url, config.max_connections).await?;
    tracing::info!("Connected to database and ran migrations");

    // Keeps guard watches in step with sign-ins and revocations made by the
    // identity provider.
    backend.spawn_auth_listener().await?;

    if config.bootstrap_admin_token.is_some() {
        tracing::warn!("BOOTSTRAP_ADMIN_TOKEN is ignored with a database backend");
    }
    Ok(Arc::new(backend))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn")),
        )
        .init();

    let config = Config::from_env();
    let backend = open_backend(&config).await?;
    let addr = config.bind_addr;

    let app = create_routes(AppState::new(backend, config));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("🚀 Server running at http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
