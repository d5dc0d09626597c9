use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::stream::{ParseOptions, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_DEPTH, DEFAULT_SIZE_LIMIT};

/// Префикс переменных окружения.
pub const ENV_PREFIX: &str = "PBWIRE";

/// Параметры декодера, собранные из значений по умолчанию, файла и
/// окружения.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecSettings {
    pub max_depth: u32,
    pub size_limit: usize,
    /// Размер порции при чтении из `Read`
    pub chunk_size: usize,
    pub track_correct_ending: bool,
    pub log_level: String,
}

impl CodecSettings {
    /// Значения по умолчанию с переопределением из `PBWIRE_*`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// То же, что [`CodecSettings::load`], плюс необязательный файл
    /// (toml/json/yaml по расширению). Окружение важнее файла.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("max_depth", i64::from(DEFAULT_MAX_DEPTH))?
            .set_default("size_limit", DEFAULT_SIZE_LIMIT as i64)?
            .set_default("chunk_size", DEFAULT_CHUNK_SIZE as i64)?
            .set_default("track_correct_ending", false)?
            .set_default("log_level", "info")?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let cfg = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let settings: Self = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Message("chunk_size must be positive".into()));
        }
        if self.size_limit > DEFAULT_SIZE_LIMIT {
            return Err(ConfigError::Message(format!(
                "size_limit {} exceeds {DEFAULT_SIZE_LIMIT}",
                self.size_limit
            )));
        }
        Ok(())
    }

    pub fn to_parse_options(&self) -> ParseOptions {
        ParseOptions::default()
            .with_max_depth(self.max_depth)
            .with_size_limit(self.size_limit)
            .with_track_correct_ending(self.track_correct_ending)
    }
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            size_limit: DEFAULT_SIZE_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            track_correct_ending: false,
            log_level: "info".to_string(),
        }
    }
}
