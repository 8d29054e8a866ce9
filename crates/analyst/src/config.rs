use serde::Deserialize;

use analyst_dune::ClientSettings;
use analyst_pipeline::PipelineSettings;

const DEFAULT_CONFIG_PATH: &str = "crates/analyst/config/default.toml";
const API_KEY_ENV: &str = "DUNE_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub dune: ClientSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

fn default_database_path() -> String {
    "analyst.db".to_string()
}

impl Settings {
    /// File (optional) < `ANALYST__*` environment < `DUNE_API_KEY` when no key is set.
    pub fn new(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let config_file_path = match config_path {
            Some(path) => path.to_string(),
            None => std::env::var("ANALYST_CONFIG_PATH")
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
        };

        let s = config::Config::builder()
            .add_source(config::File::with_name(&config_file_path).required(false))
            .add_source(
                config::Environment::with_prefix("ANALYST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let mut settings: Settings = s.try_deserialize()?;
        if settings.dune.api_key().is_none() {
            settings.dune.api_key = std::env::var(API_KEY_ENV).ok();
        }
        Ok(settings)
    }
}
