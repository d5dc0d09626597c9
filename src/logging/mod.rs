pub mod config;
mod filters;
mod formatter;
pub mod handle;

pub use config::{LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt};

/// Инициализация логирования с конфигурацией.
///
/// Ошибка, если конфигурация некорректна или глобальный подписчик уже
/// установлен.
pub fn init_logging(
    mut config: LoggingConfig
) -> Result<LoggingHandle, Box<dyn std::error::Error + Send + Sync>> {
    config.apply_env_overrides();
    config.validate()?;

    let (filter_layer, filter_handle) =
        reload::Layer::new(filters::build_filter_from_config(&config));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(formatter::build_formatter_from_config(&config))
        .try_init()?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        log_format = %config.format,
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(filter_handle))
}
