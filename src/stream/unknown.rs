//! Хранилище неизвестных полей.
//!
//! Поля, которые сообщение не распознало, сохраняются как байты
//! "тэг + значение" в каноническом виде: значение varint перекодируется
//! минимальным числом байт, остальные wire type копируются как есть.

use bytes::{BufMut, Bytes};

use crate::wire::{
    decode_varint, decode_varint32, encode_tag, encode_varint, Tag, WireType,
};

/// Сырые байты неизвестных полей в порядке появления.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UnknownFields {
    buf: Vec<u8>,
}

/// Значение одного неизвестного поля.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownValue<'a> {
    Varint(u64),
    Fixed64(u64),
    LengthDelimited(&'a [u8]),
    /// Поля внутри группы (без закрывающего тэга)
    Group(&'a [u8]),
    Fixed32(u32),
}

/// Итератор по полям [`UnknownFields`].
#[derive(Debug, Clone)]
pub struct UnknownFieldsIter<'a> {
    rest: &'a [u8],
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl UnknownFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Размер сохранённых байт.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Ёмкость буфера в байтах.
    pub fn space_used_excluding_self(&self) -> usize {
        self.buf.capacity()
    }

    pub fn add_varint(
        &mut self,
        field: u32,
        value: u64,
    ) {
        encode_tag(field, WireType::Varint, &mut self.buf);
        encode_varint(value, &mut self.buf);
    }

    pub fn add_fixed32(
        &mut self,
        field: u32,
        value: u32,
    ) {
        encode_tag(field, WireType::Fixed32, &mut self.buf);
        self.buf.put_u32_le(value);
    }

    pub fn add_fixed64(
        &mut self,
        field: u32,
        value: u64,
    ) {
        encode_tag(field, WireType::Fixed64, &mut self.buf);
        self.buf.put_u64_le(value);
    }

    pub fn add_length_delimited(
        &mut self,
        field: u32,
        value: &[u8],
    ) {
        encode_tag(field, WireType::LengthDelimited, &mut self.buf);
        encode_varint(value.len() as u64, &mut self.buf);
        self.buf.extend_from_slice(value);
    }

    /// Добавляет группу: start-group, поля `group`, end-group.
    pub fn add_group(
        &mut self,
        field: u32,
        group: &UnknownFields,
    ) {
        encode_tag(field, WireType::StartGroup, &mut self.buf);
        self.buf.extend_from_slice(&group.buf);
        encode_tag(field, WireType::EndGroup, &mut self.buf);
    }

    /// Дописывает поля другого набора.
    pub fn merge_from(
        &mut self,
        other: &UnknownFields,
    ) {
        self.buf.extend_from_slice(&other.buf);
    }

    /// Выводит сохранённые байты.
    pub fn encode(
        &self,
        buf: &mut impl BufMut,
    ) {
        buf.put_slice(&self.buf);
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }

    /// Поля в порядке появления.
    pub fn iter(&self) -> UnknownFieldsIter<'_> {
        UnknownFieldsIter { rest: &self.buf }
    }
}

impl<'a> UnknownFieldsIter<'a> {
    fn take(
        &mut self,
        n: usize,
    ) -> Option<&'a [u8]> {
        if n > self.rest.len() {
            return None;
        }
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Some(head)
    }

    fn varint(&mut self) -> Option<u64> {
        let (value, n) = decode_varint(self.rest).ok()?;
        self.rest = &self.rest[n..];
        Some(value)
    }

    /// Пропускает содержимое группы, возвращая его без закрывающего тэга.
    fn group(
        &mut self,
        field: u32,
    ) -> Option<&'a [u8]> {
        let start = self.rest;
        let mut depth = 0usize;
        loop {
            let body_len = start.len() - self.rest.len();
            let (raw, n) = decode_varint32(self.rest).ok()?;
            self.rest = &self.rest[n..];
            let tag = Tag::from_raw(raw).ok()?;
            match tag.wire_type() {
                WireType::Varint => {
                    self.varint()?;
                }
                WireType::Fixed64 => {
                    self.take(8)?;
                }
                WireType::Fixed32 => {
                    self.take(4)?;
                }
                WireType::LengthDelimited => {
                    let len = self.varint()?;
                    self.take(usize::try_from(len).ok()?)?;
                }
                WireType::StartGroup => depth += 1,
                WireType::EndGroup if depth == 0 => {
                    return (tag.field_number() == field).then_some(&start[..body_len]);
                }
                WireType::EndGroup => depth -= 1,
            }
        }
    }
}

impl<'a> Iterator for UnknownFieldsIter<'a> {
    type Item = (Tag, UnknownValue<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let (raw, n) = decode_varint32(self.rest).ok()?;
        self.rest = &self.rest[n..];
        let tag = Tag::from_raw(raw).ok()?;

        let value = match tag.wire_type() {
            WireType::Varint => UnknownValue::Varint(self.varint()?),
            WireType::Fixed64 => {
                let bytes = self.take(8)?;
                UnknownValue::Fixed64(u64::from_le_bytes(bytes.try_into().ok()?))
            }
            WireType::Fixed32 => {
                let bytes = self.take(4)?;
                UnknownValue::Fixed32(u32::from_le_bytes(bytes.try_into().ok()?))
            }
            WireType::LengthDelimited => {
                let len = self.varint()?;
                UnknownValue::LengthDelimited(self.take(usize::try_from(len).ok()?)?)
            }
            WireType::StartGroup => UnknownValue::Group(self.group(tag.field_number())?),
            WireType::EndGroup => return None,
        };
        Some((tag, value))
    }
}

impl<'a> IntoIterator for &'a UnknownFields {
    type Item = (Tag, UnknownValue<'a>);
    type IntoIter = UnknownFieldsIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет запись и обход всех видов неизвестных полей.
    #[test]
    fn test_add_and_iterate() {
        let mut group = UnknownFields::new();
        group.add_varint(1, 7);

        let mut unknown = UnknownFields::new();
        unknown.add_varint(3, 300);
        unknown.add_fixed32(4, 0xAABB_CCDD);
        unknown.add_fixed64(5, 1);
        unknown.add_length_delimited(6, b"hi");
        unknown.add_group(7, &group);

        let fields: Vec<_> = unknown.iter().collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0], (Tag::new(3, WireType::Varint), UnknownValue::Varint(300)));
        assert_eq!(fields[1].1, UnknownValue::Fixed32(0xAABB_CCDD));
        assert_eq!(fields[2].1, UnknownValue::Fixed64(1));
        assert_eq!(fields[3].1, UnknownValue::LengthDelimited(b"hi"));
        assert_eq!(fields[4].1, UnknownValue::Group(&[0x08, 0x07]));
    }

    /// Тест проверяет точную байтовую форму и слияние.
    #[test]
    fn test_exact_bytes_and_merge() {
        let mut a = UnknownFields::new();
        a.add_varint(1, 300);
        assert_eq!(a.as_bytes(), &[0x08, 0xAC, 0x02]);

        let mut b = UnknownFields::new();
        b.add_varint(2, 1);
        a.merge_from(&b);
        assert_eq!(a.len(), 5);

        let mut out = Vec::new();
        a.encode(&mut out);
        assert_eq!(out, vec![0x08, 0xAC, 0x02, 0x10, 0x01]);

        a.clear();
        assert!(a.is_empty());
        assert_eq!(a.iter().count(), 0);
    }
}
