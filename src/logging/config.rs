use std::{env, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Переменная окружения с уровнем или директивой фильтра.
pub const ENV_LOG: &str = "PBWIRE_LOG";
/// Переменная окружения с форматом вывода.
pub const ENV_LOG_FORMAT: &str = "PBWIRE_LOG_FORMAT";

/// Формат вывода событий.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Многострочный, для разработки
    Pretty,
    #[default]
    Compact,
    /// Одна JSON-запись на событие
    Json,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень: trace, debug, info, warn, error
    pub level: String,
    pub format: LogFormat,
    /// Дополнительные директивы вида `pbwire::stream=trace`
    pub directives: Vec<String>,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

impl LoggingConfig {
    /// Переопределяет уровень и формат из `PBWIRE_LOG` и
    /// `PBWIRE_LOG_FORMAT`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var(ENV_LOG) {
            if !level.trim().is_empty() {
                self.level = level.trim().to_string();
            }
        }
        if let Ok(format) = env::var(ENV_LOG_FORMAT) {
            match format.parse() {
                Ok(format) => self.format = format,
                Err(e) => eprintln!("{ENV_LOG_FORMAT}: {e}; keeping {}", self.format),
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.level.trim().is_empty() {
            return Err("log level must not be empty".to_string());
        }
        if let Some(bad) = self.directives.iter().find(|d| d.trim().is_empty()) {
            return Err(format!("empty filter directive {bad:?}"));
        }
        Ok(())
    }

    /// Строка для `EnvFilter`: базовый уровень и дополнительные директивы.
    pub fn build_filter_directive(&self) -> String {
        std::iter::once(self.level.as_str())
            .chain(self.directives.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            directives: Vec::new(),
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет сборку директивы фильтра.
    #[test]
    fn test_build_filter_directive() {
        let cfg = LoggingConfig {
            level: "warn".to_string(),
            directives: vec!["pbwire::stream=trace".to_string()],
            ..Default::default()
        };
        assert_eq!(cfg.build_filter_directive(), "warn,pbwire::stream=trace");
        assert_eq!(LoggingConfig::default().build_filter_directive(), "info");
    }

    /// Тест проверяет разбор формата без учёта регистра.
    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    /// Тест проверяет десериализацию частичной конфигурации.
    #[test]
    fn test_deserialize_partial() {
        let cfg: LoggingConfig =
            serde_json::from_str(r#"{"level":"debug","format":"json"}"#).unwrap();
        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(cfg.with_target);
    }

    /// Тест проверяет отказ для пустого уровня.
    #[test]
    fn test_validate() {
        let mut cfg = LoggingConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.level = " ".to_string();
        assert!(cfg.validate().is_err());
    }
}
