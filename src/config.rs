use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Путь сокета по умолчанию
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/appdetect.sock";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub backlog: u32,
    pub write_timeout_ms: u64,
    /// Добавлять ли поле `document` в ответ
    #[serde(default)]
    pub include_document: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    pub backend: String,
    pub dry_run_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "compact".to_string(),
            },
            server: ServerConfig {
                socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
                backlog: 8,
                write_timeout_ms: 1000,
                include_document: false,
            },
            tracker: TrackerConfig {
                backend: "auto".to_string(),
                dry_run_interval_ms: 5000,
            },
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (if present), then `APPDETECT_*` env vars.
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("APPDETECT_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        if self.server.socket_path.as_os_str().is_empty() {
            anyhow::bail!("socket_path не может быть пустым");
        }

        if self.server.backlog == 0 || self.server.backlog > 1024 {
            anyhow::bail!("backlog должен быть в диапазоне 1..=1024, получено {}", self.server.backlog);
        }

        if self.server.write_timeout_ms == 0 {
            anyhow::bail!("write_timeout_ms должно быть больше 0");
        }

        match self.tracker.backend.as_str() {
            "auto" | "sway" | "x11" | "dry_run" => {}
            _ => anyhow::bail!("Неизвестный бэкенд отслеживания фокуса: {}", self.tracker.backend),
        }

        if self.tracker.dry_run_interval_ms < 100 {
            anyhow::bail!("dry_run_interval_ms должно быть минимум 100");
        }

        Ok(())
    }
}
