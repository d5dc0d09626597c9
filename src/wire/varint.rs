//! Variable-length integer encoding (base-128, little-endian).
//!
//! Каждый байт несёт 7 бит данных, старший бит означает продолжение:
//! - 0-127: 1 байт
//! - 128-16383: 2 байта
//! - до u64::MAX: 10 байт максимум
//!
//! Знаковые sint32/sint64 предварительно проходят через ZigZag, чтобы
//! маленькие по модулю отрицательные числа оставались короткими.

use bytes::BufMut;
use pbwire_error::{WireError, WireResult};

/// Максимальная длина varint для u64 (10 байт).
pub const MAX_VARINT_LEN: usize = 10;

/// Максимальная длина varint для u32 и тэгов (5 байт).
pub const MAX_VARINT32_LEN: usize = 5;

/// Записывает u64 в varint формате.
///
/// # Examples
/// ```
/// use pbwire::wire::encode_varint;
///
/// let mut buf = Vec::new();
/// encode_varint(300, &mut buf);
/// assert_eq!(buf, vec![0xAC, 0x02]);
/// ```
#[inline]
pub fn encode_varint(
    mut value: u64,
    buf: &mut impl BufMut,
) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Вычисляет размер varint для числа (без записи).
#[inline]
pub const fn encoded_len_varint(value: u64) -> usize {
    // (индекс старшего бита * 9 + 73) / 64 == ceil(биты / 7)
    let hi = 63 - (value | 1).leading_zeros() as usize;
    (hi * 9 + 73) / 64
}

/// Читает u64 из начала среза.
///
/// Возвращает значение и кол-во прочитанных байт.
///
/// # Errors
/// - `Truncated`, если срез закончился посреди varint
/// - `MalformedVarint`, если varint длиннее 10 байт или 10-й байт несёт
///   биты сверх 64
pub fn decode_varint(bytes: &[u8]) -> WireResult<(u64, usize)> {
    let mut result: u64 = 0;

    for (i, &byte) in bytes.iter().take(MAX_VARINT_LEN).enumerate() {
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(WireError::MalformedVarint);
        }

        result |= u64::from(byte & 0x7F) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    if bytes.len() >= MAX_VARINT_LEN {
        Err(WireError::MalformedVarint)
    } else {
        Err(WireError::Truncated { context: "varint" })
    }
}

/// Читает u32 из начала среза (путь тэгов).
///
/// Не более 5 байт; 5-й байт не может быть больше `0x0F`.
pub fn decode_varint32(bytes: &[u8]) -> WireResult<(u32, usize)> {
    let mut result: u32 = 0;

    for (i, &byte) in bytes.iter().take(MAX_VARINT32_LEN).enumerate() {
        if i == MAX_VARINT32_LEN - 1 && byte > 0x0F {
            return Err(WireError::MalformedVarint);
        }

        result |= u32::from(byte & 0x7F) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    if bytes.len() >= MAX_VARINT32_LEN {
        Err(WireError::MalformedVarint)
    } else {
        Err(WireError::Truncated { context: "varint32" })
    }
}

/// Значение int32/enum в varint: отрицательные расширяются знаком до 64 бит
/// и занимают 10 байт.
#[inline]
pub const fn int32_to_varint(value: i32) -> u64 {
    value as i64 as u64
}

/// ZigZag для 32 бит: `(n << 1) ^ (n >> 31)`.
#[inline]
pub const fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

#[inline]
pub const fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// ZigZag для 64 бит: `(n << 1) ^ (n >> 63)`.
#[inline]
pub const fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub const fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}
