//! Тэг поля: `(field_number << 3) | wire_type`, закодированный как varint.

use std::fmt;

use bytes::BufMut;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use pbwire_error::{WireError, WireResult};

use super::{encode_varint, encoded_len_varint};

/// Минимальный допустимый номер поля.
pub const MIN_FIELD_NUMBER: u32 = 1;
/// Максимальный допустимый номер поля (2^29 - 1).
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

const TAG_TYPE_BITS: u32 = 3;
const TAG_TYPE_MASK: u32 = (1 << TAG_TYPE_BITS) - 1;

/// Форма кодирования значения поля.
///
/// Значения 6 и 7 невалидны.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

/// Проверенный тэг: номер поля в `1..=2^29-1` и валидный wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    field_number: u32,
    wire_type: WireType,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl WireType {
    /// Размер значения фиксированной ширины, если он известен заранее.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Fixed32 => Some(4),
            Self::Fixed64 => Some(8),
            _ => None,
        }
    }
}

impl Tag {
    /// Создаёт тэг.
    ///
    /// # Panics
    /// Если номер поля вне `1..=2^29-1`.
    pub fn new(
        field_number: u32,
        wire_type: WireType,
    ) -> Self {
        assert!(
            is_valid_field_number(field_number),
            "field number {field_number} out of range"
        );
        Self {
            field_number,
            wire_type,
        }
    }

    /// Разбирает сырое значение тэга.
    pub fn from_raw(raw: u32) -> WireResult<Self> {
        let field_number = raw >> TAG_TYPE_BITS;
        if field_number < MIN_FIELD_NUMBER {
            return Err(WireError::InvalidTag { raw });
        }

        let wire_type =
            WireType::try_from((raw & TAG_TYPE_MASK) as u8).map_err(|e| {
                WireError::InvalidWireType {
                    field: field_number,
                    wire_type: e.number,
                }
            })?;

        Ok(Self {
            field_number,
            wire_type,
        })
    }

    /// Сырое значение тэга.
    #[inline]
    pub const fn raw(self) -> u32 {
        (self.field_number << TAG_TYPE_BITS) | self.wire_type as u32
    }

    #[inline]
    pub const fn field_number(self) -> u32 {
        self.field_number
    }

    #[inline]
    pub const fn wire_type(self) -> WireType {
        self.wire_type
    }

    /// Тэг того же поля с другим wire type.
    pub const fn with_wire_type(
        self,
        wire_type: WireType,
    ) -> Self {
        Self {
            field_number: self.field_number,
            wire_type,
        }
    }

    /// Записывает тэг в буфер.
    #[inline]
    pub fn encode(
        self,
        buf: &mut impl BufMut,
    ) {
        encode_varint(u64::from(self.raw()), buf);
    }

    /// Размер закодированного тэга.
    #[inline]
    pub const fn encoded_len(self) -> usize {
        tag_len(self.field_number)
    }
}

/// Проверяет, что номер поля в допустимом диапазоне.
#[inline]
pub const fn is_valid_field_number(field_number: u32) -> bool {
    field_number >= MIN_FIELD_NUMBER && field_number <= MAX_FIELD_NUMBER
}

/// Записывает тэг `(field_number, wire_type)` в буфер.
#[inline]
pub fn encode_tag(
    field_number: u32,
    wire_type: WireType,
    buf: &mut impl BufMut,
) {
    Tag::new(field_number, wire_type).encode(buf);
}

/// Размер тэга для поля (не зависит от wire type).
#[inline]
pub const fn tag_len(field_number: u32) -> usize {
    encoded_len_varint((field_number as u64) << TAG_TYPE_BITS)
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for Tag {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{:?}", self.field_number, self.wire_type)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
