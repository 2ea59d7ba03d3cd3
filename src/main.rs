//! Image Ingest - upload an image, transcribe and summarize it with a
//! multimodal model, keep a record of every attempt.

mod auth;
mod config;
mod encoder;
mod inference;
mod ingest;
mod parser;
mod prompt;
mod routes;
mod store;
mod supabase;
mod uploads;

use config::AppConfig;
use inference::ChatCompletionsClient;
use ingest::Ingestor;
use routes::AppState;
use std::sync::Arc;
use store::{DocumentStore, MemoryStore};
use supabase::SupabaseStore;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "image_ingest=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let inference = ChatCompletionsClient::new(config.inference.clone());
    info!("Inference client initialized (model: {})", inference.model());

    let store: Arc<dyn DocumentStore> = match config.supabase.clone() {
        Some(supabase) => {
            info!("Using Supabase document store at {}", supabase.url);
            Arc::new(SupabaseStore::new(supabase))
        }
        None => Arc::new(MemoryStore::new()),
    };

    let uploads = uploads::UploadDir::open(&config.upload_dir).await?;
    info!("Uploads stored under {}", uploads.root().display());

    let state = AppState {
        ingestor: Ingestor::new(Arc::new(inference), store.clone()),
        store,
        uploads,
        verifier: auth::TokenVerifier::new(&config.jwt_secret),
    };

    let app = routes::build_router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
