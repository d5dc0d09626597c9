//! Сессия разбора: глубина вложенности, лимиты, цикл по полям.
//!
//! [`ParseSession`] оборачивает [`ChunkedByteCursor`] и ведёт два счётчика:
//! оставшуюся глубину вложенности (защита от рекурсии) и глубину групп
//! (нужна только для того, чтобы отличить конец буфера, совпавший с
//! end-group, от настоящего конца данных).

use bytes::Bytes;
use pbwire_error::{WireError, WireResult};
use tracing::debug;

use super::{BytesSource, ChunkSource, ChunkedByteCursor, LastTag, UnknownFields, MAX_LENGTH};
use crate::{
    codec::Message,
    wire::{Tag, WireType},
};

/// Глубина вложенности по умолчанию.
pub const DEFAULT_MAX_DEPTH: u32 = 100;

/// Общий лимит размера по умолчанию.
pub const DEFAULT_SIZE_LIMIT: usize = i32::MAX as usize;

/// Параметры разбора.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Максимальная глубина вложенных сообщений и групп
    pub max_depth: u32,
    /// Максимальный объём данных
    pub size_limit: usize,
    /// Разрешить окончание верхнего уровня на тэге 0 и не тянуть лишние
    /// порции, если разбор заканчивается в запасе
    pub track_correct_ending: bool,
}

/// Сессия разбора одного сообщения верхнего уровня.
#[derive(Debug)]
pub struct ParseSession<'s> {
    cursor: ChunkedByteCursor<'s>,
    depth: i32,
    max_depth: u32,
    group_depth: i32,
    track_correct_ending: bool,
    size_limit: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ParseOptions {
    pub fn with_max_depth(
        mut self,
        max_depth: u32,
    ) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_size_limit(
        mut self,
        size_limit: usize,
    ) -> Self {
        self.size_limit = size_limit;
        self
    }

    pub fn with_track_correct_ending(
        mut self,
        track: bool,
    ) -> Self {
        self.track_correct_ending = track;
        self
    }
}

impl<'s> ParseSession<'s> {
    pub fn new(
        source: impl ChunkSource + 's,
        options: &ParseOptions,
    ) -> Self {
        let max_depth = options.max_depth.min(i32::MAX as u32);
        Self {
            cursor: ChunkedByteCursor::new(Box::new(source), options.size_limit),
            depth: max_depth as i32,
            max_depth,
            group_depth: if options.track_correct_ending {
                0
            } else {
                i32::MIN
            },
            track_correct_ending: options.track_correct_ending,
            size_limit: options.size_limit,
        }
    }

    /// Сессия поверх одного буфера.
    pub fn from_bytes(
        data: impl Into<Bytes>,
        options: &ParseOptions,
    ) -> Self {
        Self::new(BytesSource::new(data), options)
    }

    /// Сессия поверх среза (данные копируются один раз).
    pub fn from_slice(
        data: &[u8],
        options: &ParseOptions,
    ) -> Self {
        Self::from_bytes(Bytes::copy_from_slice(data), options)
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn cursor(&self) -> &ChunkedByteCursor<'s> {
        &self.cursor
    }

    /// `true`, если текущий уровень разобран.
    #[inline]
    pub fn done(&mut self) -> WireResult<bool> {
        self.cursor.done(self.group_depth)
    }

    /// Сырой тэг (может быть 0).
    #[inline]
    pub fn read_tag(&mut self) -> WireResult<u32> {
        self.cursor.read_varint32()
    }

    #[inline]
    pub fn read_varint64(&mut self) -> WireResult<u64> {
        self.cursor.read_varint64()
    }

    /// Varint, усечённый до 32 бит (int32, uint32, enum).
    #[inline]
    pub fn read_varint32(&mut self) -> WireResult<u32> {
        Ok(self.cursor.read_varint64()? as u32)
    }

    #[inline]
    pub fn read_bool(&mut self) -> WireResult<bool> {
        Ok(self.cursor.read_varint64()? != 0)
    }

    #[inline]
    pub fn read_fixed32(&mut self) -> WireResult<u32> {
        self.cursor.read_fixed32()
    }

    #[inline]
    pub fn read_fixed64(&mut self) -> WireResult<u64> {
        self.cursor.read_fixed64()
    }

    /// Длина length-delimited значения.
    pub fn read_length(&mut self) -> WireResult<usize> {
        let len = self.cursor.read_varint32()? as usize;
        if len > MAX_LENGTH {
            return Err(self.cursor.fail(WireError::LengthTooLarge {
                length: len as u64,
            }));
        }
        Ok(len)
    }

    pub fn read_bytes(
        &mut self,
        n: usize,
    ) -> WireResult<Bytes> {
        self.cursor.read_bytes(n)
    }

    /// Length-delimited байты.
    pub fn read_length_delimited(&mut self) -> WireResult<Bytes> {
        let len = self.read_length()?;
        self.cursor.read_bytes(len)
    }

    /// Length-delimited строка с проверкой UTF-8.
    pub fn read_string(
        &mut self,
        field: u32,
    ) -> WireResult<String> {
        let len = self.read_length()?;
        let mut buf = Vec::new();
        self.cursor.read_into(len, &mut buf)?;
        String::from_utf8(buf).map_err(|_| self.cursor.fail(WireError::InvalidUtf8 { field }))
    }

    pub fn skip(
        &mut self,
        n: usize,
    ) -> WireResult<()> {
        self.cursor.skip(n)
    }

    /// Разбирает length-delimited вложенное сообщение в `msg`.
    pub fn parse_message<M: Message + ?Sized>(
        &mut self,
        msg: &mut M,
    ) -> WireResult<()> {
        let len = self.read_length()?;
        self.enter()?;
        let token = self.cursor.push_limit(len)?;
        let result = self.merge_fields(msg);
        self.depth += 1;
        result?;
        self.cursor.pop_limit(token)
    }

    /// Разбирает группу, чей start-group тэг `start` уже прочитан.
    pub fn parse_group<M: Message + ?Sized>(
        &mut self,
        start: Tag,
        msg: &mut M,
    ) -> WireResult<()> {
        self.group_with(start, |session, tag| msg.merge_field(tag, session))
    }

    /// Цикл по полям текущего уровня.
    ///
    /// Заканчивается на лимите, в конце потока, на тэге 0 или end-group
    /// (последние два запоминаются в курсоре).
    pub fn merge_fields<M: Message + ?Sized>(
        &mut self,
        msg: &mut M,
    ) -> WireResult<()> {
        self.fields_with(|session, tag| msg.merge_field(tag, session))
    }

    /// Пропускает значение поля по его wire type.
    ///
    /// Если передан `unknown`, поле сохраняется в нём. Varint и fixed
    /// хранятся как значения и выводятся в канонической кодировке,
    /// length-delimited копируется байт в байт, содержимое групп
    /// сохраняется по тем же правилам.
    pub fn skip_field(
        &mut self,
        tag: Tag,
        unknown: Option<&mut UnknownFields>,
    ) -> WireResult<()> {
        let field = tag.field_number();
        match tag.wire_type() {
            WireType::Varint => {
                let value = self.read_varint64()?;
                if let Some(unknown) = unknown {
                    unknown.add_varint(field, value);
                }
            }
            WireType::Fixed64 => {
                let value = self.read_fixed64()?;
                if let Some(unknown) = unknown {
                    unknown.add_fixed64(field, value);
                }
            }
            WireType::Fixed32 => {
                let value = self.read_fixed32()?;
                if let Some(unknown) = unknown {
                    unknown.add_fixed32(field, value);
                }
            }
            WireType::LengthDelimited => {
                let len = self.read_length()?;
                match unknown {
                    Some(unknown) => {
                        let value = self.cursor.read_bytes(len)?;
                        unknown.add_length_delimited(field, &value);
                    }
                    None => self.cursor.skip(len)?,
                }
            }
            WireType::StartGroup => match unknown {
                Some(unknown) => {
                    let mut group = UnknownFields::new();
                    self.group_with(tag, |session, inner| {
                        session.skip_field(inner, Some(&mut group))
                    })?;
                    unknown.add_group(field, &group);
                }
                None => self.group_with(tag, |session, inner| session.skip_field(inner, None))?,
            },
            WireType::EndGroup => {
                return Err(self.cursor.fail(WireError::MismatchedEndGroup { field }));
            }
        }
        Ok(())
    }

    /// Читает packed-поле: длина, затем `read_one` до конца лимита.
    pub fn read_packed<F>(
        &mut self,
        mut read_one: F,
    ) -> WireResult<()>
    where
        F: FnMut(&mut Self) -> WireResult<()>,
    {
        let len = self.read_length()?;
        let token = self.cursor.push_limit(len)?;
        while !self.done()? {
            read_one(self)?;
        }
        self.cursor.pop_limit(token)
    }

    /// Завершает разбор верхнего уровня.
    ///
    /// Успех, только если поток закончился (или, при отслеживании
    /// окончания, встречен тэг 0). Непрочитанный хвост возвращается
    /// источнику.
    pub fn finish(&mut self) -> WireResult<()> {
        let result = match self.cursor.last_tag() {
            LastTag::EndOfStream => Ok(()),
            LastTag::Tag(0) if self.track_correct_ending => Ok(()),
            LastTag::Limit => Err(WireError::SizeLimit {
                limit: self.size_limit,
            }),
            LastTag::Tag(tag) => Err(WireError::UnexpectedEndOfMessage { tag }),
        };
        match result {
            Ok(()) => {
                self.cursor.back_up_unconsumed();
                Ok(())
            }
            Err(e) => Err(self.cursor.fail(e)),
        }
    }

    pub(crate) fn fields_with<F>(
        &mut self,
        mut on_field: F,
    ) -> WireResult<()>
    where
        F: FnMut(&mut Self, Tag) -> WireResult<()>,
    {
        while !self.done()? {
            let raw = self.read_tag()?;
            if raw == 0 || raw & 7 == WireType::EndGroup as u32 {
                self.cursor.set_last_tag(raw);
                return Ok(());
            }
            let tag = Tag::from_raw(raw).map_err(|e| self.cursor.fail(e))?;
            on_field(self, tag)?;
        }
        Ok(())
    }

    pub(crate) fn group_with<F>(
        &mut self,
        start: Tag,
        on_field: F,
    ) -> WireResult<()>
    where
        F: FnMut(&mut Self, Tag) -> WireResult<()>,
    {
        self.enter()?;
        self.group_depth += 1;
        let result = self.fields_with(on_field);
        self.group_depth -= 1;
        self.depth += 1;
        result?;

        if self.cursor.ended_at_end_of_stream() {
            return Err(self.cursor.fail(WireError::Truncated { context: "group" }));
        }
        if !self.cursor.consume_end_group(start.raw()) {
            return Err(self.cursor.fail(WireError::MismatchedEndGroup {
                field: start.field_number(),
            }));
        }
        Ok(())
    }

    fn enter(&mut self) -> WireResult<()> {
        self.depth -= 1;
        if self.depth < 0 {
            self.depth += 1;
            debug!(max_depth = self.max_depth, "nesting depth limit reached");
            return Err(self.cursor.fail(WireError::RecursionLimit {
                max: self.max_depth,
            }));
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            size_limit: DEFAULT_SIZE_LIMIT,
            track_correct_ending: false,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::RawMessage, stream::UnknownValue};

    fn parse_raw(
        data: &[u8],
        options: &ParseOptions,
    ) -> WireResult<RawMessage> {
        let mut msg = RawMessage::default();
        let mut session = ParseSession::from_slice(data, options);
        session.merge_fields(&mut msg)?;
        session.finish()?;
        Ok(msg)
    }

    /// Тест проверяет, что [0x08, 0xAC, 0x02] читается как поле 1 = 300.
    #[test]
    fn test_field_one_is_300() {
        let mut session = ParseSession::from_slice(&[0x08, 0xAC, 0x02], &ParseOptions::default());
        assert!(!session.done().unwrap());
        let tag = Tag::from_raw(session.read_tag().unwrap()).unwrap();
        assert_eq!(tag, Tag::new(1, WireType::Varint));
        assert_eq!(session.read_varint64().unwrap(), 300);
        assert!(session.done().unwrap());
        session.finish().unwrap();
    }

    /// Тест проверяет, что неизвестные поля сохраняются байт в байт,
    /// включая вложенные группы.
    #[test]
    fn test_skip_field_preserves_bytes() {
        let data = [
            0x08, 0x96, 0x01, // 1: varint 150
            0x13, 0x08, 0x01, 0x1B, 0x10, 0x02, 0x1C, 0x14, // 2: group { 1: 1, 3: group { 2: 2 } }
            0x1A, 0x02, b'h', b'i', // 3: "hi"
            0x25, 1, 2, 3, 4, // 4: fixed32
        ];
        let msg = parse_raw(&data, &ParseOptions::default()).unwrap();
        assert_eq!(msg.unknown_fields().as_bytes(), &data);
    }

    /// Тест проверяет, что неизвестный varint с лишними байтами сохраняет
    /// значение и выводится канонически, а байты length-delimited не
    /// меняются.
    #[test]
    fn test_skip_field_canonicalizes_varint() {
        let data = [
            0x08, 0x96, 0x81, 0x00, // 1: varint 150 в трёх байтах
            0x12, 0x03, 0x96, 0x81, 0x00, // 2: те же байты внутри bytes
        ];
        let msg = parse_raw(&data, &ParseOptions::default()).unwrap();
        assert_eq!(
            msg.unknown_fields().as_bytes(),
            &[0x08, 0x96, 0x01, 0x12, 0x03, 0x96, 0x81, 0x00]
        );
        let fields: Vec<_> = msg.unknown_fields().iter().collect();
        assert_eq!(
            fields[0],
            (Tag::new(1, WireType::Varint), UnknownValue::Varint(150))
        );
    }

    /// Тест проверяет отказ при несовпадающем end-group.
    #[test]
    fn test_mismatched_end_group() {
        // start group 2, end group 3
        let data = [0x13, 0x08, 0x01, 0x1C];
        assert_eq!(
            parse_raw(&data, &ParseOptions::default()).unwrap_err(),
            WireError::MismatchedEndGroup { field: 2 }
        );
    }

    /// Тест проверяет, что незакрытая группа - это обрезанный поток.
    #[test]
    fn test_unterminated_group() {
        let data = [0x13, 0x08, 0x01];
        assert_eq!(
            parse_raw(&data, &ParseOptions::default()).unwrap_err(),
            WireError::Truncated { context: "group" }
        );
    }

    /// Тест проверяет ограничение глубины на вложенных группах.
    #[test]
    fn test_group_depth_limit() {
        let depth = 10;
        let mut data = vec![0x0B; depth];
        data.extend(std::iter::repeat(0x0C).take(depth));

        assert!(parse_raw(&data, &ParseOptions::default()).is_ok());
        assert_eq!(
            parse_raw(&data, &ParseOptions::default().with_max_depth(9)).unwrap_err(),
            WireError::RecursionLimit { max: 9 }
        );
    }

    /// Тест проверяет, что end-group на верхнем уровне - ошибка.
    #[test]
    fn test_top_level_end_group_fails() {
        let data = [0x08, 0x01, 0x0C];
        assert_eq!(
            parse_raw(&data, &ParseOptions::default()).unwrap_err(),
            WireError::UnexpectedEndOfMessage { tag: 0x0C }
        );
    }

    /// Тест проверяет окончание на тэге 0 при отслеживании окончания.
    #[test]
    fn test_zero_tag_ending() {
        let data = [0x08, 0x01, 0x00, 0xFF, 0xFF];
        assert_eq!(
            parse_raw(&data, &ParseOptions::default()).unwrap_err(),
            WireError::UnexpectedEndOfMessage { tag: 0 }
        );

        let options = ParseOptions::default().with_track_correct_ending(true);
        let msg = parse_raw(&data, &options).unwrap();
        assert_eq!(msg.unknown_fields().as_bytes(), &[0x08, 0x01]);
    }

    /// Тест проверяет отказ на wire type 6/7.
    #[test]
    fn test_invalid_wire_type() {
        let data = [0x0E, 0x00];
        assert_eq!(
            parse_raw(&data, &ParseOptions::default()).unwrap_err(),
            WireError::InvalidWireType {
                field: 1,
                wire_type: 6
            }
        );
    }

    /// Тест проверяет packed-чтение и пустой packed-блок.
    #[test]
    fn test_read_packed() {
        let data = [0x03, 0x01, 0x96, 0x01, 0x00];
        let mut session = ParseSession::from_slice(&data, &ParseOptions::default());
        let mut values = Vec::new();
        session
            .read_packed(|s| {
                values.push(s.read_varint64()?);
                Ok(())
            })
            .unwrap();
        assert_eq!(values, vec![1, 150]);
        assert_eq!(session.read_length().unwrap(), 0);
    }

    /// Тест проверяет отказ на невалидном UTF-8 в строке.
    #[test]
    fn test_read_string_invalid_utf8() {
        let mut session = ParseSession::from_slice(&[0x02, 0xC3, 0x28], &ParseOptions::default());
        assert_eq!(
            session.read_string(7).unwrap_err(),
            WireError::InvalidUtf8 { field: 7 }
        );
    }

    /// Тест проверяет отказ при превышении общего лимита размера.
    #[test]
    fn test_size_limit() {
        let data = [0x08, 0x01, 0x10, 0x02];
        let options = ParseOptions::default().with_size_limit(2);
        assert_eq!(
            parse_raw(&data, &options).unwrap_err(),
            WireError::SizeLimit { limit: 2 }
        );
    }
}
