use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Server {
    pub listen: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: StoreBackend,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Service {
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub store: Store,
    pub postgres: Option<Postgres>,
    pub service: Service,
}

impl Settings {
    /// Loads the TOML file at `path`, then applies `REDEMPTION__SECTION__KEY`
    /// environment overrides.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Self::builder()?
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("REDEMPTION")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.listen", "0.0.0.0:5000")?
            .set_default("store.backend", "postgres")?
            .set_default("service.channel_capacity", 512)
    }
}
