use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибка разбора wire-формата.
///
/// Покрывает повреждённый вход (обрезанный поток, выход за лимит, длинный
/// varint, несогласованный end-group) и исчерпание ресурсов (глубина
/// вложенности, объявленный размер). Все варианты восстановимы: вызывающий
/// код получает `Err` и прекращает разбор, уже применённые изменения не
/// откатываются.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Поток закончился посреди значения
    #[error("truncated input while reading {context}")]
    Truncated { context: &'static str },

    /// Чтение вышло за границу вложенного сообщения или общий лимит
    #[error("read past the enclosing limit")]
    LimitExceeded,

    /// Varint длиннее допустимого или с лишними битами
    #[error("malformed varint")]
    MalformedVarint,

    /// Номер поля 0 или ≥ 2^29
    #[error("invalid tag 0x{raw:X}")]
    InvalidTag { raw: u32 },

    /// Wire type 6 или 7
    #[error("invalid wire type {wire_type} for field {field}")]
    InvalidWireType { field: u32, wire_type: u8 },

    /// End-group не соответствует открывающему start-group
    #[error("group {field} is not closed by a matching end-group tag")]
    MismatchedEndGroup { field: u32 },

    /// Вложенное сообщение закончилось не на своей границе
    #[error("nested message did not end exactly at its length limit")]
    UnterminatedMessage,

    /// Разбор верхнего уровня закончился на тэге 0 или end-group
    #[error("unexpected end-of-message tag 0x{tag:X}")]
    UnexpectedEndOfMessage { tag: u32 },

    /// Превышена глубина вложенности
    #[error("recursion depth limit exceeded (max {max})")]
    RecursionLimit { max: u32 },

    /// Объявленная длина не помещается в лимит
    #[error("declared length {length} is too large")]
    LengthTooLarge { length: u64 },

    /// Превышен общий лимит размера входа
    #[error("input exceeds the size limit of {limit} bytes")]
    SizeLimit { limit: usize },

    /// Строковое поле содержит невалидный UTF-8
    #[error("string field {field} is not valid UTF-8")]
    InvalidUtf8 { field: u32 },
}

impl WireError {
    /// Исчерпание ресурса (глубина или размер), а не повреждение байтов.
    pub fn is_resource_exhaustion(&self) -> bool {
        self.status_code().is_resource_exhaustion()
    }
}

impl ErrorExt for WireError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Truncated { .. } => StatusCode::Truncated,
            Self::LimitExceeded => StatusCode::LimitExceeded,
            Self::MalformedVarint => StatusCode::MalformedVarint,
            Self::InvalidTag { .. } => StatusCode::InvalidTag,
            Self::InvalidWireType { .. } => StatusCode::InvalidWireType,
            Self::MismatchedEndGroup { .. } => StatusCode::MismatchedEndGroup,
            Self::UnterminatedMessage | Self::UnexpectedEndOfMessage { .. } => {
                StatusCode::UnterminatedMessage
            }
            Self::RecursionLimit { .. } => StatusCode::DepthLimit,
            Self::LengthTooLarge { .. } | Self::SizeLimit { .. } => StatusCode::SizeLimit,
            Self::InvalidUtf8 { .. } => StatusCode::InvalidUtf8,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl From<WireError> for std::io::Error {
    fn from(e: WireError) -> Self {
        let kind = match &e {
            WireError::Truncated { .. } => std::io::ErrorKind::UnexpectedEof,
            _ => std::io::ErrorKind::InvalidData,
        };
        std::io::Error::new(kind, e.to_string())
    }
}
