//! Чтение, запись и размер значений полей по типам.
//!
//! Каждый тип поля представлен маркерным типом, реализующим [`WireCodec`]:
//! маркер знает wire type, представление значения в Rust и способ его
//! кодирования. Функции модуля собирают из маркеров запись полей с тэгом,
//! packed-блоков, строк и вложенных сообщений.

use bytes::{BufMut, BytesMut};
use pbwire_error::WireResult;

use super::{encode_length_delimited, length_delimited_len, Message};
use crate::{
    stream::ParseSession,
    wire::{
        encode_tag, encode_varint, encoded_len_varint, int32_to_varint, tag_len, zigzag_decode32,
        zigzag_decode64, zigzag_encode32, zigzag_encode64, Tag, WireType,
    },
};

/// Кодек скалярного типа поля.
pub trait WireCodec {
    /// Представление значения в Rust.
    type Value: Copy + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static;

    /// Wire type неупакованного значения.
    const WIRE_TYPE: WireType;

    fn read(session: &mut ParseSession<'_>) -> WireResult<Self::Value>;

    fn write(
        value: Self::Value,
        buf: &mut impl BufMut,
    );

    /// Размер значения без тэга.
    fn size(value: Self::Value) -> usize;
}

macro_rules! varint_codec {
    ($(#[$meta:meta])* $name:ident, $ty:ty, |$r:ident| $read:expr, |$w:ident| $write:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl WireCodec for $name {
            type Value = $ty;
            const WIRE_TYPE: WireType = WireType::Varint;

            #[inline]
            fn read(session: &mut ParseSession<'_>) -> WireResult<$ty> {
                let $r = session.read_varint64()?;
                Ok($read)
            }

            #[inline]
            fn write(
                value: $ty,
                buf: &mut impl BufMut,
            ) {
                let $w = value;
                encode_varint($write, buf);
            }

            #[inline]
            fn size(value: $ty) -> usize {
                let $w = value;
                encoded_len_varint($write)
            }
        }
    };
}

macro_rules! fixed_codec {
    ($(#[$meta:meta])* $name:ident, $ty:ty, $wire:ident, $read:ident, $put:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl WireCodec for $name {
            type Value = $ty;
            const WIRE_TYPE: WireType = WireType::$wire;

            #[inline]
            fn read(session: &mut ParseSession<'_>) -> WireResult<$ty> {
                Ok(session.$read()? as $ty)
            }

            #[inline]
            fn write(
                value: $ty,
                buf: &mut impl BufMut,
            ) {
                buf.$put(value);
            }

            #[inline]
            fn size(_value: $ty) -> usize {
                $len
            }
        }
    };
}

varint_codec!(
    /// int32: отрицательные значения занимают 10 байт.
    Int32, i32, |v| v as i32, |v| int32_to_varint(v)
);
varint_codec!(Int64, i64, |v| v as i64, |v| v as u64);
varint_codec!(UInt32, u32, |v| v as u32, |v| v as u64);
varint_codec!(UInt64, u64, |v| v, |v| v);
varint_codec!(
    /// sint32: zigzag поверх varint.
    SInt32, i32, |v| zigzag_decode32(v as u32), |v| zigzag_encode32(v) as u64
);
varint_codec!(SInt64, i64, |v| zigzag_decode64(v), |v| zigzag_encode64(v));
varint_codec!(Bool, bool, |v| v != 0, |v| v as u64);
varint_codec!(
    /// Перечисление кодируется как int32.
    Enum, i32, |v| v as i32, |v| int32_to_varint(v)
);

fixed_codec!(Fixed32, u32, Fixed32, read_fixed32, put_u32_le, 4);
fixed_codec!(Fixed64, u64, Fixed64, read_fixed64, put_u64_le, 8);
fixed_codec!(SFixed32, i32, Fixed32, read_fixed32, put_i32_le, 4);
fixed_codec!(SFixed64, i64, Fixed64, read_fixed64, put_i64_le, 8);

/// float: 4 байта IEEE-754 little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Float;

/// double: 8 байт IEEE-754 little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Double;

impl WireCodec for Float {
    type Value = f32;
    const WIRE_TYPE: WireType = WireType::Fixed32;

    #[inline]
    fn read(session: &mut ParseSession<'_>) -> WireResult<f32> {
        Ok(f32::from_bits(session.read_fixed32()?))
    }

    #[inline]
    fn write(
        value: f32,
        buf: &mut impl BufMut,
    ) {
        buf.put_f32_le(value);
    }

    #[inline]
    fn size(_value: f32) -> usize {
        4
    }
}

impl WireCodec for Double {
    type Value = f64;
    const WIRE_TYPE: WireType = WireType::Fixed64;

    #[inline]
    fn read(session: &mut ParseSession<'_>) -> WireResult<f64> {
        Ok(f64::from_bits(session.read_fixed64()?))
    }

    #[inline]
    fn write(
        value: f64,
        buf: &mut impl BufMut,
    ) {
        buf.put_f64_le(value);
    }

    #[inline]
    fn size(_value: f64) -> usize {
        8
    }
}

////////////////////////////////////////////////////////////////////////////////
// Поля с тэгом
////////////////////////////////////////////////////////////////////////////////

/// Пишет тэг и значение.
pub fn write_field<C: WireCodec>(
    field: u32,
    value: C::Value,
    buf: &mut impl BufMut,
) {
    encode_tag(field, C::WIRE_TYPE, buf);
    C::write(value, buf);
}

/// Размер поля вместе с тэгом.
pub fn field_len<C: WireCodec>(
    field: u32,
    value: C::Value,
) -> usize {
    tag_len(field) + C::size(value)
}

/// Пишет каждый элемент отдельным полем.
pub fn write_repeated<C: WireCodec>(
    field: u32,
    values: &[C::Value],
    buf: &mut impl BufMut,
) {
    for &value in values {
        write_field::<C>(field, value, buf);
    }
}

pub fn repeated_len<C: WireCodec>(
    field: u32,
    values: &[C::Value],
) -> usize {
    values.len() * tag_len(field) + values.iter().map(|&v| C::size(v)).sum::<usize>()
}

/// Суммарный размер элементов packed-блока без тэга и длины.
pub fn packed_payload_len<C: WireCodec>(values: &[C::Value]) -> usize {
    match C::WIRE_TYPE.fixed_size() {
        Some(width) => values.len() * width,
        None => values.iter().map(|&v| C::size(v)).sum(),
    }
}

/// Пишет packed-блок. Пустой список не пишет ничего.
pub fn write_packed<C: WireCodec>(
    field: u32,
    values: &[C::Value],
    buf: &mut impl BufMut,
) {
    if values.is_empty() {
        return;
    }
    write_packed_with_len::<C>(field, values, packed_payload_len::<C>(values), buf);
}

/// Пишет packed-блок с заранее посчитанным размером полезной нагрузки.
pub fn write_packed_with_len<C: WireCodec>(
    field: u32,
    values: &[C::Value],
    payload_len: usize,
    buf: &mut impl BufMut,
) {
    encode_tag(field, WireType::LengthDelimited, buf);
    encode_varint(payload_len as u64, buf);
    for &value in values {
        C::write(value, buf);
    }
}

pub fn packed_len<C: WireCodec>(
    field: u32,
    values: &[C::Value],
) -> usize {
    if values.is_empty() {
        return 0;
    }
    let payload = packed_payload_len::<C>(values);
    tag_len(field) + encoded_len_varint(payload as u64) + payload
}

/// Читает значение повторяющегося поля в любой из двух кодировок.
///
/// Packed-блок принимается всегда, когда сам тип не length-delimited.
/// Возвращает `false`, если wire type тэга не подходит этому типу: значение
/// не прочитано, вызывающий код должен пропустить поле.
pub fn read_repeated<C: WireCodec>(
    tag: Tag,
    session: &mut ParseSession<'_>,
    out: &mut impl Extend<C::Value>,
) -> WireResult<bool> {
    if tag.wire_type() == C::WIRE_TYPE {
        out.extend(Some(C::read(session)?));
        return Ok(true);
    }
    if tag.wire_type() == WireType::LengthDelimited {
        session.read_packed(|s| {
            out.extend(Some(C::read(s)?));
            Ok(())
        })?;
        return Ok(true);
    }
    Ok(false)
}

////////////////////////////////////////////////////////////////////////////////
// Строки, байты, сообщения
////////////////////////////////////////////////////////////////////////////////

pub fn write_bytes(
    field: u32,
    value: &[u8],
    buf: &mut impl BufMut,
) {
    encode_tag(field, WireType::LengthDelimited, buf);
    encode_varint(value.len() as u64, buf);
    buf.put_slice(value);
}

pub fn write_string(
    field: u32,
    value: &str,
    buf: &mut impl BufMut,
) {
    write_bytes(field, value.as_bytes(), buf);
}

/// Размер length-delimited поля с полезной нагрузкой `len` байт.
pub fn bytes_field_len(
    field: u32,
    len: usize,
) -> usize {
    tag_len(field) + encoded_len_varint(len as u64) + len
}

pub fn write_message(
    field: u32,
    msg: &(impl Message + ?Sized),
    buf: &mut BytesMut,
) {
    encode_tag(field, WireType::LengthDelimited, buf);
    encode_length_delimited(msg, buf);
}

pub fn message_field_len(
    field: u32,
    msg: &(impl Message + ?Sized),
) -> usize {
    tag_len(field) + length_delimited_len(msg)
}

/// Пишет сообщение в групповой кодировке.
pub fn write_group(
    field: u32,
    msg: &(impl Message + ?Sized),
    buf: &mut BytesMut,
) {
    encode_tag(field, WireType::StartGroup, buf);
    msg.encode_raw(buf);
    encode_tag(field, WireType::EndGroup, buf);
}

pub fn group_field_len(
    field: u32,
    msg: &(impl Message + ?Sized),
) -> usize {
    2 * tag_len(field) + msg.encoded_len()
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
