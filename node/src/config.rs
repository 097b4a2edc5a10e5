use std::env;
use std::path::PathBuf;
use uuid::Uuid;

/// Runtime configuration for the chat engine service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub build_id: String,
    pub store_path: PathBuf,
    pub gemini_api_keys: Vec<String>,
    pub gemini_model: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let build_id =
            env::var("LINGUACHAT_BUILD_ID").unwrap_or_else(|_| Uuid::new_v4().to_string());
        let store_path = env::var("LINGUACHAT_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/linguachat"));
        let gemini_api_keys = env::var("GEMINI_API_KEYS")
            .map(|keys| {
                keys.split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let gemini_model = env::var("GEMINI_MODEL").ok();
        Ok(Self {
            host,
            port,
            build_id,
            store_path,
            gemini_api_keys,
            gemini_model,
        })
    }
}
