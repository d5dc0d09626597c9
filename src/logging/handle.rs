use tracing_subscriber::{reload, EnvFilter, Registry};

use super::filters;

/// Handle установленного логирования: позволяет сменить фильтр без
/// переустановки подписчика.
#[derive(Debug, Clone)]
pub struct LoggingHandle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl LoggingHandle {
    pub(crate) fn new(filter: reload::Handle<EnvFilter, Registry>) -> Self {
        Self { filter }
    }

    /// Заменяет фильтр. Некорректная директива заменяется на `info`.
    pub fn set_filter(
        &self,
        directive: &str,
    ) -> Result<(), reload::Error> {
        self.filter
            .reload(filters::filter_from_directive(directive))?;
        tracing::debug!(directive, "log filter reloaded");
        Ok(())
    }

    /// Текущая директива фильтра.
    pub fn current_filter(&self) -> Option<String> {
        self.filter.with_current(|f| f.to_string()).ok()
    }
}
