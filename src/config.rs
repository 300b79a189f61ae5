use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub backend: BackendConfig,
    pub change_feed: ChangeFeedConfig,
    #[serde(default)]
    pub speech: SpeechSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub api_key: String,
    /// Signed-in user's token; without it the client is anonymous
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeFeedConfig {
    pub nats_url: String,
    pub subject_prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct SpeechSettings {
    pub result_buffer: usize,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self { result_buffer: 64 }
    }
}

impl Config {
    /// Load `path` (extension optional), then apply `LINGUA__SECTION__KEY`
    /// environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("change_feed.nats_url", "nats://localhost:4222")?
            .set_default("change_feed.subject_prefix", "lingua")?
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("LINGUA")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
