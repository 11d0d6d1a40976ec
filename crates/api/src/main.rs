use std::sync::Arc;

use dubflow_api::{build_router, state::AppState};
use dubflow_config::Settings;
use dubflow_pipeline::{HttpMediaSeparator, ModelClient, ModelConfig, SegmenterConfig};
use dubflow_services::{FsObjectStore, MongoTaskStore, MongoTranscriptStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load()?;

    let client = mongodb::Client::with_uri_str(&settings.database.uri).await?;
    let db = client.database(&settings.database.name);
    dubflow_db::indexes::ensure_indexes(&db).await?;

    let state = AppState {
        tasks: Arc::new(MongoTaskStore::new(&db)),
        transcripts: Arc::new(MongoTranscriptStore::new(&db)),
        objects: Arc::new(FsObjectStore::new(
            &settings.storage.root,
            settings.storage.public_domain.clone(),
        )),
        separator: Arc::new(HttpMediaSeparator::new(settings.separator.endpoint.clone())),
        model: Arc::new(ModelClient::new(ModelConfig::from(&settings.model))?),
        segmenter_config: SegmenterConfig::from(&settings.segmenter),
    };

    let app = build_router(state);
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "dubflow api listening");
    axum::serve(listener, app).await?;

    Ok(())
}
