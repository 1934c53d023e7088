//! Settings for the demo server, layered from defaults, an optional file and
//! `DOCFX__`-prefixed environment variables (`DOCFX__SERVER__PORT=8080`).

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_CONFIG_FILE: &str = "docfx";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogSettings {
    /// An `EnvFilter` directive such as `info` or `docfx=debug`.
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreSettings {
    pub max_page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub log: LogSettings,
    pub store: StoreSettings,
}

impl Settings {
    /// Loads settings. `path` names a config file without extension; a missing file is fine.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3210)?
            .set_default("log.filter", "info")?
            .set_default("store.max_page_size", 1024)?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("DOCFX").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
