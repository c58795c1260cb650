//! billow - receipt OCR ingestion and search server.

use std::sync::Arc;

use billow::api::{self, AppState};
use billow::blob::FsBlobStore;
use billow::config::Settings;
use billow::identity::TokenIdentity;
use billow::ingest::Ingestion;
use billow::ocr::{self, Recognizer};
use billow::retrieval::Retrieval;
use billow::store::SqliteReceiptStore;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "billow=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    std::fs::create_dir_all(&settings.data_dir)?;
    info!("Data directory: {}", settings.data_dir.display());

    let store = Arc::new(SqliteReceiptStore::open(&settings.db_path()).await?);
    let blobs = Arc::new(FsBlobStore::new(settings.uploads_dir()));
    let identity = Arc::new(TokenIdentity::load(&settings.identity_file)?);

    let provider = ocr::provider_from_settings(&settings.ocr)?;
    let recognizer = Recognizer::new(provider, settings.ocr.timeout);
    info!(
        "OCR provider: {} (timeout {:?})",
        recognizer.provider_name(),
        settings.ocr.timeout
    );

    let state = AppState {
        ingestion: Ingestion::new(blobs, recognizer, store.clone()),
        retrieval: Retrieval::new(store.clone()),
        identity,
    };

    let app = api::router(
        state,
        settings.max_upload_bytes,
        settings.static_dir.as_deref(),
    );

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
