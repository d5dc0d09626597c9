//! Разбор и сериализация расширений, включая формат MessageSet.
//!
//! Сериализация идёт по возрастанию номера; [`ExtensionStore::serialize_range`]
//! пишет только полуинтервал номеров, чтобы сгенерированный код мог
//! чередовать расширения с обычными полями.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use pbwire_error::WireResult;

use super::{
    Extension, ExtensionInfo, ExtensionRegistry, ExtensionStore, ExtensionValue, FieldType,
    LazyMessage, RepeatedValue, ValueKind,
};
use crate::{
    codec::{
        self, bytes_field_len, encode_length_delimited, group_field_len, length_delimited_len,
        merge_from_bytes, message_field_len, packed_payload_len, write_bytes, write_group,
        write_message, write_packed_with_len, RawMessage, WireCodec,
    },
    stream::{ParseOptions, ParseSession, UnknownFields},
    wire::{encode_tag, encode_varint, encoded_len_varint, tag_len, Tag, WireType},
};

/// Номера полей элемента MessageSet.
const ITEM_FIELD: u32 = 1;
const TYPE_ID_FIELD: u32 = 2;
const MESSAGE_FIELD: u32 = 3;

/// Сопоставляет тип поля с маркером кодека и значением нужного
/// представления. Несовпадение представления - ветка `else`.
macro_rules! with_codec {
    ($field_type:expr, $value:expr, $Enum:ident, |$C:ident, $v:ident| $body:expr, else $fallback:expr) => {
        match ($field_type, $value) {
            (FieldType::Int32, $Enum::Int32($v)) => { type $C = codec::Int32; $body }
            (FieldType::SInt32, $Enum::Int32($v)) => { type $C = codec::SInt32; $body }
            (FieldType::SFixed32, $Enum::Int32($v)) => { type $C = codec::SFixed32; $body }
            (FieldType::Int64, $Enum::Int64($v)) => { type $C = codec::Int64; $body }
            (FieldType::SInt64, $Enum::Int64($v)) => { type $C = codec::SInt64; $body }
            (FieldType::SFixed64, $Enum::Int64($v)) => { type $C = codec::SFixed64; $body }
            (FieldType::UInt32, $Enum::UInt32($v)) => { type $C = codec::UInt32; $body }
            (FieldType::Fixed32, $Enum::UInt32($v)) => { type $C = codec::Fixed32; $body }
            (FieldType::UInt64, $Enum::UInt64($v)) => { type $C = codec::UInt64; $body }
            (FieldType::Fixed64, $Enum::UInt64($v)) => { type $C = codec::Fixed64; $body }
            (FieldType::Float, $Enum::Float($v)) => { type $C = codec::Float; $body }
            (FieldType::Double, $Enum::Double($v)) => { type $C = codec::Double; $body }
            (FieldType::Bool, $Enum::Bool($v)) => { type $C = codec::Bool; $body }
            (FieldType::Enum, $Enum::Enum($v)) => { type $C = codec::Enum; $body }
            _ => $fallback,
        }
    };
}

////////////////////////////////////////////////////////////////////////////////
// Размер и сериализация одной записи
////////////////////////////////////////////////////////////////////////////////

impl Extension {
    /// Размер записи на проводе вместе с тэгами.
    pub fn byte_size(
        &self,
        number: u32,
    ) -> usize {
        if self.is_repeated() {
            return self.repeated_byte_size(number);
        }
        if self.is_cleared() {
            return 0;
        }
        let field_type = self.field_type();
        match self.value() {
            ExtensionValue::String(s) => bytes_field_len(number, s.len()),
            ExtensionValue::Bytes(b) => bytes_field_len(number, b.len()),
            ExtensionValue::Message(m) if field_type == FieldType::Group => {
                group_field_len(number, &**m)
            }
            ExtensionValue::Message(m) => message_field_len(number, &**m),
            ExtensionValue::Lazy(lazy) => {
                let len = lazy.encoded_len();
                if field_type == FieldType::Group {
                    2 * tag_len(number) + len
                } else {
                    bytes_field_len(number, len)
                }
            }
            value => with_codec!(
                field_type,
                value,
                ExtensionValue,
                |C, v| tag_len(number) + C::size(*v),
                else mismatch(number, field_type)
            ),
        }
    }

    fn repeated_byte_size(
        &self,
        number: u32,
    ) -> usize {
        let Some(rep) = self.repeated_value() else {
            return 0;
        };
        let field_type = self.field_type();
        match rep {
            RepeatedValue::String(v) => v.iter().map(|s| bytes_field_len(number, s.len())).sum(),
            RepeatedValue::Bytes(v) => v.iter().map(|b| bytes_field_len(number, b.len())).sum(),
            RepeatedValue::Message(v) if field_type == FieldType::Group => {
                v.iter().map(|m| group_field_len(number, &**m)).sum()
            }
            RepeatedValue::Message(v) => v.iter().map(|m| message_field_len(number, &**m)).sum(),
            rep if self.is_packed() => {
                let payload = with_codec!(
                    field_type,
                    rep,
                    RepeatedValue,
                    |C, v| packed_payload_len::<C>(v.as_slice()),
                    else mismatch(number, field_type)
                );
                self.set_cached_size(payload);
                if payload == 0 {
                    0
                } else {
                    tag_len(number) + encoded_len_varint(payload as u64) + payload
                }
            }
            rep => with_codec!(
                field_type,
                rep,
                RepeatedValue,
                |C, v| codec::repeated_len::<C>(number, v.as_slice()),
                else mismatch(number, field_type)
            ),
        }
    }

    /// Пишет запись с тэгами.
    pub fn serialize(
        &self,
        number: u32,
        buf: &mut BytesMut,
    ) {
        if self.is_repeated() {
            self.serialize_repeated(number, buf);
            return;
        }
        if self.is_cleared() {
            return;
        }
        let field_type = self.field_type();
        match self.value() {
            ExtensionValue::String(s) => write_bytes(number, s.as_bytes(), buf),
            ExtensionValue::Bytes(b) => write_bytes(number, b, buf),
            ExtensionValue::Message(m) if field_type == FieldType::Group => {
                write_group(number, &**m, buf)
            }
            ExtensionValue::Message(m) => write_message(number, &**m, buf),
            ExtensionValue::Lazy(lazy) if field_type == FieldType::Group => {
                encode_tag(number, WireType::StartGroup, buf);
                lazy.encode(buf);
                encode_tag(number, WireType::EndGroup, buf);
            }
            ExtensionValue::Lazy(lazy) => {
                encode_tag(number, WireType::LengthDelimited, buf);
                encode_varint(lazy.encoded_len() as u64, buf);
                lazy.encode(buf);
            }
            value => with_codec!(
                field_type,
                value,
                ExtensionValue,
                |C, v| codec::write_field::<C>(number, *v, buf),
                else mismatch(number, field_type)
            ),
        }
    }

    fn serialize_repeated(
        &self,
        number: u32,
        buf: &mut BytesMut,
    ) {
        let Some(rep) = self.repeated_value() else {
            return;
        };
        let field_type = self.field_type();
        match rep {
            RepeatedValue::String(v) => v.iter().for_each(|s| write_bytes(number, s.as_bytes(), buf)),
            RepeatedValue::Bytes(v) => v.iter().for_each(|b| write_bytes(number, b, buf)),
            RepeatedValue::Message(v) if field_type == FieldType::Group => {
                v.iter().for_each(|m| write_group(number, &**m, buf))
            }
            RepeatedValue::Message(v) => v.iter().for_each(|m| write_message(number, &**m, buf)),
            rep if self.is_packed() => with_codec!(
                field_type,
                rep,
                RepeatedValue,
                |C, v| {
                    if !v.is_empty() {
                        let payload = packed_payload_len::<C>(v.as_slice());
                        self.set_cached_size(payload);
                        write_packed_with_len::<C>(number, v.as_slice(), payload, buf);
                    }
                },
                else mismatch(number, field_type)
            ),
            rep => with_codec!(
                field_type,
                rep,
                RepeatedValue,
                |C, v| codec::write_repeated::<C>(number, v.as_slice(), buf),
                else mismatch(number, field_type)
            ),
        }
    }

    /// Размер записи в формате MessageSet.
    fn message_set_item_size(
        &self,
        number: u32,
    ) -> usize {
        if self.is_repeated() || self.field_type().value_kind() != ValueKind::Message {
            return self.byte_size(number);
        }
        if self.is_cleared() {
            return 0;
        }
        let payload = match self.value() {
            ExtensionValue::Message(m) => length_delimited_len(&**m),
            ExtensionValue::Lazy(lazy) => {
                let len = lazy.encoded_len();
                encoded_len_varint(len as u64) + len
            }
            _ => mismatch(number, self.field_type()),
        };
        2 * tag_len(ITEM_FIELD)
            + tag_len(TYPE_ID_FIELD)
            + encoded_len_varint(u64::from(number))
            + tag_len(MESSAGE_FIELD)
            + payload
    }

    fn serialize_message_set_item(
        &self,
        number: u32,
        buf: &mut BytesMut,
    ) {
        if self.is_repeated() || self.field_type().value_kind() != ValueKind::Message {
            self.serialize(number, buf);
            return;
        }
        if self.is_cleared() {
            return;
        }
        encode_tag(ITEM_FIELD, WireType::StartGroup, buf);
        encode_tag(TYPE_ID_FIELD, WireType::Varint, buf);
        encode_varint(u64::from(number), buf);
        encode_tag(MESSAGE_FIELD, WireType::LengthDelimited, buf);
        match self.value() {
            ExtensionValue::Message(m) => encode_length_delimited(&**m, buf),
            ExtensionValue::Lazy(lazy) => {
                encode_varint(lazy.encoded_len() as u64, buf);
                lazy.encode(buf);
            }
            _ => mismatch(number, self.field_type()),
        }
        encode_tag(ITEM_FIELD, WireType::EndGroup, buf);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Хранилище: размер, сериализация, разбор
////////////////////////////////////////////////////////////////////////////////

impl ExtensionStore {
    /// Суммарный размер всех расширений.
    pub fn byte_size(&self) -> usize {
        self.iter().map(|(n, ext)| ext.byte_size(n)).sum()
    }

    /// Пишет все расширения по возрастанию номера.
    pub fn serialize(
        &self,
        buf: &mut BytesMut,
    ) {
        for (number, ext) in self.iter() {
            ext.serialize(number, buf);
        }
    }

    /// Пишет расширения с номерами из `[start, end)`.
    pub fn serialize_range(
        &self,
        start: u32,
        end: u32,
        buf: &mut BytesMut,
    ) {
        for (number, ext) in self.range(start, end) {
            ext.serialize(number, buf);
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.byte_size());
        self.serialize(&mut buf);
        buf.freeze()
    }

    /// Разбирает одно поле, тэг которого уже прочитан.
    ///
    /// Номер без регистрации и wire type, не подходящий расширению,
    /// сохраняются в `unknown`. Повторяющиеся примитивы принимаются и в
    /// packed, и в обычной кодировке. Недопустимые значения перечисления
    /// тоже уходят в `unknown`.
    pub fn parse_field(
        &mut self,
        tag: Tag,
        session: &mut ParseSession<'_>,
        registry: &ExtensionRegistry,
        unknown: &mut UnknownFields,
    ) -> WireResult<()> {
        let Some(info) = registry.find(tag.field_number()) else {
            return session.skip_field(tag, Some(unknown));
        };
        let expected = info.field_type.wire_type();
        let packed_form = info.is_repeated
            && info.field_type.is_packable()
            && tag.wire_type() == WireType::LengthDelimited;

        if packed_form {
            return self.parse_packed(info, session, unknown);
        }
        if tag.wire_type() != expected {
            return session.skip_field(tag, Some(unknown));
        }

        let number = info.number;
        match info.field_type.value_kind() {
            ValueKind::String => {
                let value = session.read_string(number)?;
                if info.is_repeated {
                    self.add_string(number, info.field_type, value);
                } else {
                    self.set_string(number, info.field_type, value);
                }
            }
            ValueKind::Bytes => {
                let value = session.read_length_delimited()?.to_vec();
                if info.is_repeated {
                    self.add_bytes(number, info.field_type, value);
                } else {
                    self.set_bytes(number, info.field_type, value);
                }
            }
            ValueKind::Message => self.parse_message_field(tag, info, session)?,
            _ => {
                let value = read_scalar(info.field_type, session)?;
                self.store_scalar(info, value, unknown);
            }
        }
        Ok(())
    }

    fn parse_packed(
        &mut self,
        info: &Arc<ExtensionInfo>,
        session: &mut ParseSession<'_>,
        unknown: &mut UnknownFields,
    ) -> WireResult<()> {
        // слот создаётся даже для пустого блока
        self.slot_for(info);
        session.read_packed(|s| {
            let value = read_scalar(info.field_type, s)?;
            self.store_scalar(info, value, unknown);
            Ok(())
        })
    }

    fn parse_message_field(
        &mut self,
        tag: Tag,
        info: &Arc<ExtensionInfo>,
        session: &mut ParseSession<'_>,
    ) -> WireResult<()> {
        let prototype = info.prototype.unwrap_or(RawMessage::prototype);
        let is_group = info.field_type == FieldType::Group;

        if info.is_repeated {
            let msg = self.add_message(info.number, info.field_type, prototype);
            return if is_group {
                session.parse_group(tag, msg)
            } else {
                session.parse_message(msg)
            };
        }
        if info.is_lazy && !is_group {
            let data = session.read_length_delimited()?;
            let options = nested_options(session);
            return self.merge_lazy(info, data, options);
        }

        let (ext, _) = self.slot_for(info);
        ext.set_cleared(false);
        let msg = match ext.value_mut() {
            ExtensionValue::Message(m) => &mut **m,
            ExtensionValue::Lazy(lazy) => lazy.get_mut(),
            _ => mismatch(info.number, info.field_type),
        };
        if is_group {
            session.parse_group(tag, msg)
        } else {
            session.parse_message(msg)
        }
    }

    /// Дописывает сериализованное сообщение в ленивый слот.
    fn merge_lazy(
        &mut self,
        info: &Arc<ExtensionInfo>,
        data: Bytes,
        options: ParseOptions,
    ) -> WireResult<()> {
        let prototype = info.prototype.unwrap_or(RawMessage::prototype);
        let (ext, created) = self.insert(info.number, || {
            Extension::singular(
                info.field_type,
                ExtensionValue::Lazy(LazyMessage::new(Bytes::new(), prototype).with_options(options)),
            )
            .with_descriptor(Some(info.clone()))
        });
        let was_cleared = ext.is_cleared();
        ext.set_cleared(false);
        match ext.value_mut() {
            ExtensionValue::Lazy(lazy) => {
                if was_cleared && !created {
                    lazy.clear();
                }
                lazy.merge_bytes(data)
            }
            ExtensionValue::Message(m) => merge_from_bytes(&mut **m, data, &options),
            _ => mismatch(info.number, info.field_type),
        }
    }

    /// Слот под расширение из реестра.
    fn slot_for(
        &mut self,
        info: &Arc<ExtensionInfo>,
    ) -> (&mut Extension, bool) {
        self.insert(info.number, || {
            let ext = if info.is_repeated {
                Extension::repeated(info.field_type, info.is_packed)
            } else if info.field_type.value_kind() == ValueKind::Message {
                let prototype = info.prototype.unwrap_or(RawMessage::prototype);
                Extension::singular(info.field_type, ExtensionValue::Message(prototype()))
            } else {
                Extension::singular(info.field_type, default_scalar(info.field_type))
            };
            ext.with_descriptor(Some(info.clone()))
        })
    }

    fn store_scalar(
        &mut self,
        info: &Arc<ExtensionInfo>,
        value: ExtensionValue,
        unknown: &mut UnknownFields,
    ) {
        if let ExtensionValue::Enum(v) = value {
            if !info.is_valid_enum(v) {
                unknown.add_varint(info.number, v as i64 as u64);
                return;
            }
        }
        let (ext, _) = self.slot_for(info);
        if info.is_repeated {
            if let Some(rep) = ext.repeated_value_mut() {
                push_scalar(rep, value);
            }
        } else {
            *ext.value_mut() = value;
            ext.set_cleared(false);
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // MessageSet
    ////////////////////////////////////////////////////////////////////////////

    /// Разбирает тело сообщения в формате MessageSet.
    ///
    /// Элементы `Item { type_id = 2; message = 3 }` принимаются в любом
    /// порядке полей; элементы с незарегистрированным `type_id` сохраняются
    /// в `unknown`. Обычные поля-расширения тоже допускаются.
    pub fn parse_message_set(
        &mut self,
        session: &mut ParseSession<'_>,
        registry: &ExtensionRegistry,
        unknown: &mut UnknownFields,
    ) -> WireResult<()> {
        let item_tag = Tag::new(ITEM_FIELD, WireType::StartGroup);
        session.fields_with(|s, tag| {
            if tag == item_tag {
                self.parse_message_set_item(item_tag, s, registry, unknown)
            } else {
                self.parse_field(tag, s, registry, unknown)
            }
        })
    }

    fn parse_message_set_item(
        &mut self,
        item_tag: Tag,
        session: &mut ParseSession<'_>,
        registry: &ExtensionRegistry,
        unknown: &mut UnknownFields,
    ) -> WireResult<()> {
        let mut type_id = 0u32;
        let mut message: Option<Bytes> = None;
        session.group_with(item_tag, |s, tag| {
            match (tag.field_number(), tag.wire_type()) {
                (TYPE_ID_FIELD, WireType::Varint) => type_id = s.read_varint32()?,
                (MESSAGE_FIELD, WireType::LengthDelimited) => {
                    let data = s.read_length_delimited()?;
                    message = Some(match message.take() {
                        None => data,
                        Some(prev) => {
                            let mut buf = BytesMut::with_capacity(prev.len() + data.len());
                            buf.extend_from_slice(&prev);
                            buf.extend_from_slice(&data);
                            buf.freeze()
                        }
                    });
                }
                _ => s.skip_field(tag, None)?,
            }
            Ok(())
        })?;

        let Some(data) = message else {
            return Ok(());
        };
        let info = match registry.find(type_id) {
            Some(info) if info.field_type.value_kind() == ValueKind::Message && !info.is_repeated => {
                info
            }
            _ => {
                let mut item = UnknownFields::new();
                item.add_varint(TYPE_ID_FIELD, u64::from(type_id));
                item.add_length_delimited(MESSAGE_FIELD, &data);
                unknown.add_group(ITEM_FIELD, &item);
                return Ok(());
            }
        };

        let options = nested_options(session);
        if info.is_lazy {
            return self.merge_lazy(info, data, options);
        }
        let (ext, _) = self.slot_for(info);
        ext.set_cleared(false);
        match ext.value_mut() {
            ExtensionValue::Message(m) => merge_from_bytes(&mut **m, data, &options),
            ExtensionValue::Lazy(lazy) => lazy.merge_bytes(data),
            _ => mismatch(info.number, info.field_type),
        }
    }

    /// Пишет расширения в формате MessageSet.
    pub fn serialize_message_set(
        &self,
        buf: &mut BytesMut,
    ) {
        for (number, ext) in self.iter() {
            ext.serialize_message_set_item(number, buf);
        }
    }

    pub fn message_set_byte_size(&self) -> usize {
        self.iter()
            .map(|(number, ext)| ext.message_set_item_size(number))
            .sum()
    }
}

fn read_scalar(
    field_type: FieldType,
    session: &mut ParseSession<'_>,
) -> WireResult<ExtensionValue> {
    Ok(match field_type {
        FieldType::Int32 => ExtensionValue::Int32(codec::Int32::read(session)?),
        FieldType::SInt32 => ExtensionValue::Int32(codec::SInt32::read(session)?),
        FieldType::SFixed32 => ExtensionValue::Int32(codec::SFixed32::read(session)?),
        FieldType::Int64 => ExtensionValue::Int64(codec::Int64::read(session)?),
        FieldType::SInt64 => ExtensionValue::Int64(codec::SInt64::read(session)?),
        FieldType::SFixed64 => ExtensionValue::Int64(codec::SFixed64::read(session)?),
        FieldType::UInt32 => ExtensionValue::UInt32(codec::UInt32::read(session)?),
        FieldType::Fixed32 => ExtensionValue::UInt32(codec::Fixed32::read(session)?),
        FieldType::UInt64 => ExtensionValue::UInt64(codec::UInt64::read(session)?),
        FieldType::Fixed64 => ExtensionValue::UInt64(codec::Fixed64::read(session)?),
        FieldType::Float => ExtensionValue::Float(codec::Float::read(session)?),
        FieldType::Double => ExtensionValue::Double(codec::Double::read(session)?),
        FieldType::Bool => ExtensionValue::Bool(codec::Bool::read(session)?),
        FieldType::Enum => ExtensionValue::Enum(codec::Enum::read(session)?),
        other => panic!("{other:?} is not a scalar field type"),
    })
}

fn default_scalar(field_type: FieldType) -> ExtensionValue {
    match field_type.value_kind() {
        ValueKind::Int32 => ExtensionValue::Int32(0),
        ValueKind::Int64 => ExtensionValue::Int64(0),
        ValueKind::UInt32 => ExtensionValue::UInt32(0),
        ValueKind::UInt64 => ExtensionValue::UInt64(0),
        ValueKind::Float => ExtensionValue::Float(0.0),
        ValueKind::Double => ExtensionValue::Double(0.0),
        ValueKind::Bool => ExtensionValue::Bool(false),
        ValueKind::Enum => ExtensionValue::Enum(0),
        ValueKind::String => ExtensionValue::String(String::new()),
        ValueKind::Bytes => ExtensionValue::Bytes(Vec::new()),
        ValueKind::Message => ExtensionValue::Message(RawMessage::prototype()),
    }
}

fn push_scalar(
    rep: &mut RepeatedValue,
    value: ExtensionValue,
) {
    match (rep, value) {
        (RepeatedValue::Int32(a), ExtensionValue::Int32(v)) => a.push(v),
        (RepeatedValue::Int64(a), ExtensionValue::Int64(v)) => a.push(v),
        (RepeatedValue::UInt32(a), ExtensionValue::UInt32(v)) => a.push(v),
        (RepeatedValue::UInt64(a), ExtensionValue::UInt64(v)) => a.push(v),
        (RepeatedValue::Float(a), ExtensionValue::Float(v)) => a.push(v),
        (RepeatedValue::Double(a), ExtensionValue::Double(v)) => a.push(v),
        (RepeatedValue::Bool(a), ExtensionValue::Bool(v)) => a.push(v),
        (RepeatedValue::Enum(a), ExtensionValue::Enum(v)) => a.push(v),
        (rep, value) => panic!(
            "cannot push {:?} into repeated {:?}",
            value.kind(),
            rep.kind()
        ),
    }
}

/// Параметры разбора вложенного сообщения с оставшейся глубиной.
fn nested_options(session: &ParseSession<'_>) -> ParseOptions {
    ParseOptions::default().with_max_depth(session.depth().max(0) as u32)
}

#[cold]
#[track_caller]
fn mismatch(
    number: u32,
    field_type: FieldType,
) -> ! {
    panic!("extension {number} value does not match declared type {field_type:?}")
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
