use std::io::{self, Stderr};

use tracing_subscriber::{fmt, layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::config::{LogFormat, LoggingConfig};

/// Слой форматирования по конфигурации. Возвращается trait-объект, чтобы
/// стереть конкретный тип формата.
pub fn build_formatter_from_config<S>(config: &LoggingConfig) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    // stdout занят выводом CLI
    let writer: fn() -> Stderr = io::stderr;

    let base = fmt::layer()
        .with_writer(writer)
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_line_number(config.with_line_numbers);

    match config.format {
        LogFormat::Json => Box::new(
            base.event_format(fmt::format().json().with_current_span(true))
                .with_ansi(false),
        ),
        LogFormat::Pretty => Box::new(
            base.event_format(fmt::format().pretty())
                .with_ansi(config.with_ansi),
        ),
        LogFormat::Compact => Box::new(
            base.event_format(fmt::format().compact())
                .with_ansi(config.with_ansi),
        ),
    }
}

#[cfg(test)]
mod tests {
    use tracing::info;
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;

    /// Тест проверяет, что слой строится и работает для каждого формата.
    #[test]
    fn test_formatter_for_every_format() {
        for format in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            let cfg = LoggingConfig {
                format,
                with_ansi: false,
                ..Default::default()
            };
            let subscriber = Registry::default().with(build_formatter_from_config(&cfg));
            tracing::subscriber::with_default(subscriber, || {
                info!(%format, "formatter smoke test");
            });
        }
    }
}
