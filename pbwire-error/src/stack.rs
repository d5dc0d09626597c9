use std::{fmt, panic::Location, sync::Arc};

use crate::{ErrorExt, StatusCode};

/// Ошибка верхнего уровня: корневая причина и цепочка контекстов.
///
/// Контексты хранятся от внутреннего к внешнему: первый добавлен ближе
/// всего к месту, где декодер вернул `WireError`.
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    frames: Vec<ErrorContext>,
}

/// Один уровень контекста и место, где он добавлен.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub location: &'static Location<'static>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            frames: Vec::new(),
        }
    }

    /// Добавляет внешний уровень контекста.
    #[track_caller]
    pub fn context(
        mut self,
        msg: impl Into<String>,
    ) -> Self {
        self.frames.push(ErrorContext {
            message: msg.into(),
            location: Location::caller(),
        });
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    /// Корневая причина.
    pub fn root(&self) -> &dyn ErrorExt {
        self.root.as_ref()
    }

    /// Контексты от внутреннего к внешнему.
    pub fn contexts(&self) -> &[ErrorContext] {
        &self.frames
    }

    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }

    /// Вход отвергнут из-за глубины вложенности или размера, а не из-за
    /// повреждённых байтов.
    pub fn is_resource_exhaustion(&self) -> bool {
        self.status_code().is_resource_exhaustion()
    }

    /// Код завершения процесса для этой ошибки.
    pub fn exit_code(&self) -> u8 {
        self.status_code().exit_code()
    }

    /// Многострочный отчёт: код и причина, затем контексты от внешнего к
    /// внутреннему с местом в исходниках.
    ///
    /// ```text
    /// Truncated (8000): truncated input while reading varint
    ///   while failed to decode message after 1 bytes (src/codec/message.rs:233)
    /// ```
    pub fn report(&self) -> String {
        let mut out = format!("{}: {}", self.status_code(), self.root);
        for frame in self.frames.iter().rev() {
            out.push_str(&format!(
                "\n  while {} ({}:{})",
                frame.message,
                frame.location.file(),
                frame.location.line()
            ));
        }
        out
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StackError
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("StackError")
            .field("status_code", &self.status_code())
            .field("root", &self.root.to_string())
            .field("contexts", &self.frames)
            .finish()
    }
}

/// Однострочная форма: контексты от внешнего к внутреннему, затем причина.
impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for frame in self.frames.iter().rev() {
            write!(f, "{}: ", frame.message)?;
        }
        write!(f, "{}", self.root)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

impl From<StackError> for std::io::Error {
    fn from(e: StackError) -> Self {
        std::io::Error::other(e.to_string())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
