//! `synkronus-server` — wires configuration, storage, and the HTTP router
//! together and serves until a shutdown signal arrives.

use std::sync::Arc;

use synkronus::attachments::AttachmentStore;
use synkronus::auth::AuthGate;
use synkronus::bundle::BundleService;
use synkronus::http::{self, AppState};
use synkronus::observations::ObservationStore;
use synkronus::sync::SyncEngine;
use synkronus::users::UserStore;
use synkronus::{Config, Db};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    synkronus::logging::init_logging(&config.log_level).map_err(|e| e.to_string())?;

    tracing::info!(bind_host = %config.bind_host, bind_port = config.bind_port, "starting synkronus-server");

    let db = Db::open(&config.db_connection)?;
    let observations = ObservationStore::new(db.clone());
    let sync = SyncEngine::new(observations, config.max_pull_page);
    let attachments = AttachmentStore::new(config.attachments_path.clone())?;
    let bundle = Arc::new(BundleService::new(
        config.bundle_path.clone(),
        config.versions_path.clone(),
        config.max_versions,
    )?);

    let users = UserStore::new(db.clone());
    users
        .bootstrap_admin(&config.admin_username, &config.admin_password)
        .await?;
    let auth = AuthGate::new(users.clone(), &config.jwt_secret, config.token_ttl, config.refresh_ttl);

    let state = AppState {
        sync,
        attachments,
        bundle,
        auth,
        users,
        started_at: Arc::new(time::OffsetDateTime::now_utc()),
    };

    let router = http::router(state);
    let addr = std::net::SocketAddr::new(config.bind_host, config.bind_port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
