use axum::serve;
use linguachat_node::store::LocalStore;
use linguachat_node::{init_tracing, router, AppConfig, AppState};
use linguachat_translate::{GeminiTranslator, Translator};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;
    let store = Arc::new(LocalStore::open(&config.store_path)?);

    if config.gemini_api_keys.is_empty() {
        warn!("no GEMINI_API_KEYS configured, messages will be delivered untranslated");
    }
    let mut gemini = GeminiTranslator::new(config.gemini_api_keys.clone());
    if let Some(model) = &config.gemini_model {
        gemini = gemini.with_model(model.clone());
    }
    let translator: Arc<dyn Translator> = Arc::new(gemini);

    let state = AppState::new(config.clone(), store, translator);
    let app = router(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, build_id = %config.build_id, "starting LinguaChat node service");

    serve(listener, app).await?;
    Ok(())
}
