//! Трейт сообщения и верхнеуровневые функции кодирования/декодирования.

use std::{any::Any, fmt, io::Read, mem};

use bytes::{Bytes, BytesMut};
use pbwire_error::{PbResult, ResultExt, StackError, WireResult};

use crate::{
    stream::{ChunkSource, ParseOptions, ParseSession, ReaderSource, UnknownFields},
    wire::{encode_varint, encoded_len_varint, Tag},
};

/// Сообщение, которое умеет разбирать свои поля и сериализоваться.
///
/// Реализуется сгенерированным кодом (внешний коллаборатор). Трейт
/// объектно-безопасен: расширения хранят вложенные сообщения как
/// `Box<dyn Message>`.
pub trait Message: Send + Sync + fmt::Debug + 'static {
    /// Разбирает значение одного поля, тэг которого уже прочитан.
    ///
    /// Нераспознанные поля реализация передаёт в
    /// [`ParseSession::skip_field`].
    fn merge_field(
        &mut self,
        tag: Tag,
        session: &mut ParseSession<'_>,
    ) -> WireResult<()>;

    /// Размер сериализованного сообщения без префикса длины.
    fn encoded_len(&self) -> usize;

    /// Пишет поля сообщения без префикса длины.
    fn encode_raw(
        &self,
        buf: &mut BytesMut,
    );

    /// Сбрасывает все поля.
    fn clear(&mut self);

    /// Память, занятая сообщением: сама структура и принадлежащая ей куча.
    ///
    /// Реализация по умолчанию учитывает только структуру.
    fn space_used(&self) -> usize {
        mem::size_of_val(self)
    }

    fn box_clone(&self) -> Box<dyn Message>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Сливает другое сообщение того же типа в `self`.
    ///
    /// По умолчанию `other` сериализуется и разбирается поверх `self`,
    /// что даёт стандартную семантику слияния wire-формата.
    fn merge_from_dyn(
        &mut self,
        other: &dyn Message,
    ) -> WireResult<()> {
        let data = encode_to_bytes(other);
        let mut session = ParseSession::from_bytes(data, &ParseOptions::default());
        session.merge_fields(self)?;
        session.finish()
    }
}

/// Фабрика пустого сообщения данного типа.
pub type MessagePrototype = fn() -> Box<dyn Message>;

/// Сообщение без известных полей: всё содержимое хранится как
/// неизвестные поля и сериализуется обратно байт в байт.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    unknown: UnknownFields,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl RawMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unknown_fields(&self) -> &UnknownFields {
        &self.unknown
    }

    pub fn unknown_fields_mut(&mut self) -> &mut UnknownFields {
        &mut self.unknown
    }

    /// Прототип для реестра расширений.
    pub fn prototype() -> Box<dyn Message> {
        Box::new(Self::default())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Message for RawMessage {
    fn merge_field(
        &mut self,
        tag: Tag,
        session: &mut ParseSession<'_>,
    ) -> WireResult<()> {
        session.skip_field(tag, Some(&mut self.unknown))
    }

    fn encoded_len(&self) -> usize {
        self.unknown.len()
    }

    fn encode_raw(
        &self,
        buf: &mut BytesMut,
    ) {
        self.unknown.encode(buf);
    }

    fn clear(&mut self) {
        self.unknown.clear();
    }

    fn space_used(&self) -> usize {
        mem::size_of::<Self>() + self.unknown.space_used_excluding_self()
    }

    fn box_clone(&self) -> Box<dyn Message> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Clone for Box<dyn Message> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Верхнеуровневые функции
////////////////////////////////////////////////////////////////////////////////

/// Сериализует сообщение в новый буфер.
pub fn encode_to_bytes(msg: &(impl Message + ?Sized)) -> Bytes {
    let mut buf = BytesMut::with_capacity(msg.encoded_len());
    msg.encode_raw(&mut buf);
    buf.freeze()
}

pub fn encode_to_vec(msg: &(impl Message + ?Sized)) -> Vec<u8> {
    encode_to_bytes(msg).to_vec()
}

/// Пишет сообщение с префиксом длины.
pub fn encode_length_delimited(
    msg: &(impl Message + ?Sized),
    buf: &mut BytesMut,
) {
    let len = msg.encoded_len();
    buf.reserve(encoded_len_varint(len as u64) + len);
    encode_varint(len as u64, buf);
    msg.encode_raw(buf);
}

/// Размер сообщения с префиксом длины.
pub fn length_delimited_len(msg: &(impl Message + ?Sized)) -> usize {
    let len = msg.encoded_len();
    encoded_len_varint(len as u64) + len
}

/// Разбирает все поля сессии в `msg` и проверяет корректное окончание.
pub fn merge_from_session<M: Message + ?Sized>(
    msg: &mut M,
    session: &mut ParseSession<'_>,
) -> WireResult<()> {
    session.merge_fields(msg)?;
    session.finish()
}

/// Сливает сериализованные данные в `msg`.
pub fn merge_from_bytes<M: Message + ?Sized>(
    msg: &mut M,
    data: impl Into<Bytes>,
    options: &ParseOptions,
) -> WireResult<()> {
    let mut session = ParseSession::from_bytes(data, options);
    merge_from_session(msg, &mut session)
}

/// Декодирует новое сообщение из буфера.
pub fn decode<M: Message + Default>(
    data: impl Into<Bytes>,
    options: &ParseOptions,
) -> WireResult<M> {
    let mut msg = M::default();
    merge_from_bytes(&mut msg, data, options)?;
    Ok(msg)
}

/// Декодирует сообщение с префиксом длины из начала `session`.
pub fn decode_length_delimited<M: Message + Default>(
    session: &mut ParseSession<'_>,
) -> WireResult<M> {
    let mut msg = M::default();
    session.parse_message(&mut msg)?;
    Ok(msg)
}

/// Сливает в `msg` всё содержимое `reader`, читая порциями по
/// `chunk_size` байт.
pub fn merge_from_reader<M, R>(
    msg: &mut M,
    reader: R,
    chunk_size: usize,
    options: &ParseOptions,
) -> PbResult<()>
where
    M: Message + ?Sized,
    R: Read,
{
    let mut source = ReaderSource::with_chunk_size(reader, chunk_size);
    let result = {
        let mut session = ParseSession::new(&mut source, options);
        merge_from_session(msg, &mut session)
    };
    if let Some(err) = source.take_error() {
        return Err(StackError::from(err)).context("failed to read message stream");
    }
    let consumed = source.byte_count();
    result.with_context(|| format!("failed to decode message after {consumed} bytes"))
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pbwire_error::{StatusCode, WireError};

    use super::*;

    /// Тест проверяет побайтовый round-trip сырого сообщения.
    #[test]
    fn test_raw_message_round_trip() {
        let data = [0x08, 0x96, 0x01, 0x12, 0x03, b'a', b'b', b'c'];
        let msg: RawMessage = decode(Bytes::copy_from_slice(&data), &ParseOptions::default()).unwrap();
        assert_eq!(msg.encoded_len(), data.len());
        assert_eq!(encode_to_vec(&msg), data);
    }

    /// Тест проверяет, что память сообщения считается по ёмкости буфера,
    /// а не по размеру на проводе.
    #[test]
    fn test_raw_message_space_used() {
        let mut msg = RawMessage::new();
        assert_eq!(msg.space_used(), std::mem::size_of::<RawMessage>());

        msg.unknown_fields_mut().add_varint(1, 1);
        let capacity = msg.unknown_fields().space_used_excluding_self();
        assert!(capacity >= msg.encoded_len());
        assert_eq!(msg.space_used(), std::mem::size_of::<RawMessage>() + capacity);
    }

    /// Тест проверяет префикс длины.
    #[test]
    fn test_length_delimited() {
        let mut inner = RawMessage::new();
        inner.unknown_fields_mut().add_varint(1, 1);

        let mut buf = BytesMut::new();
        encode_length_delimited(&inner, &mut buf);
        assert_eq!(&buf[..], &[0x02, 0x08, 0x01]);
        assert_eq!(length_delimited_len(&inner), 3);

        let mut session = ParseSession::from_bytes(buf.freeze(), &ParseOptions::default());
        let decoded: RawMessage = decode_length_delimited(&mut session).unwrap();
        assert_eq!(decoded, inner);
    }

    /// Тест проверяет слияние через сериализацию.
    #[test]
    fn test_merge_from_dyn_appends_unknown() {
        let mut a = RawMessage::new();
        a.unknown_fields_mut().add_varint(1, 1);
        let mut b = RawMessage::new();
        b.unknown_fields_mut().add_varint(2, 2);

        a.merge_from_dyn(&b).unwrap();
        assert_eq!(encode_to_vec(&a), vec![0x08, 0x01, 0x10, 0x02]);
    }

    /// Тест проверяет чтение из `Read` и контекст ошибки.
    #[test]
    fn test_merge_from_reader() {
        let mut msg = RawMessage::new();
        merge_from_reader(
            &mut msg,
            Cursor::new(vec![0x08, 0x01, 0x10, 0x02]),
            1,
            &ParseOptions::default(),
        )
        .unwrap();
        assert_eq!(msg.encoded_len(), 4);

        let err = merge_from_reader(
            &mut RawMessage::new(),
            Cursor::new(vec![0x08]),
            3,
            &ParseOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::Truncated);
        assert_eq!(err.contexts().len(), 1);
        assert!(err.downcast_ref::<WireError>().is_some());
    }
}
