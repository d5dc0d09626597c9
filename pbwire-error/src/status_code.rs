use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки данных / контракта API
/// - 6xxx: Ввод-вывод
/// - 8xxx: Ошибки wire-формата
///
/// `num_enum::TryFromPrimitive` даёт `TryFrom<u32>`.
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,
    Config = 1005,

    // === 2xxx: Ошибки данных ===
    NotFound = 2000,
    TypeError = 2002,
    IndexOutOfBounds = 2006,
    InvalidData = 2009,

    // === 6xxx: Ввод-вывод ===
    Io = 6000,
    UnexpectedEof = 6007,

    // === 8xxx: Wire-формат ===
    Truncated = 8000,
    LimitExceeded = 8001,
    MalformedVarint = 8002,
    InvalidTag = 8003,
    InvalidWireType = 8004,
    MismatchedEndGroup = 8005,
    UnterminatedMessage = 8006,
    DepthLimit = 8007,
    SizeLimit = 8008,
    InvalidUtf8 = 8009,
    ParseError = 8010,
    EncodingError = 8011,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибка входных данных wire-формата (диапазон 8xxx).
    pub fn is_wire_error(&self) -> bool {
        (8000..=8999).contains(&self.code())
    }

    /// Исчерпание ресурса: глубина рекурсии или объявленный размер.
    ///
    /// Такие ошибки обрабатываются так же, как повреждённый вход.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::DepthLimit | Self::SizeLimit)
    }

    /// Код завершения процесса в духе `sysexits.h`.
    ///
    /// Любой отказ декодера (включая исчерпание глубины или размера) даёт
    /// `65` (EX_DATAERR), ошибки чтения файла `74` (EX_IOERR).
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Success => 0,
            code if code.is_wire_error() => 65,
            Self::InvalidData | Self::TypeError => 65,
            Self::InvalidArgs => 64,
            Self::NotFound => 66,
            Self::Io | Self::UnexpectedEof => 74,
            Self::Config => 78,
            _ => 70,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
