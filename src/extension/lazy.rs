//! Отложенный разбор вложенного сообщения.
//!
//! [`LazyMessage`] хранит сырые байты и прототип до первого обращения.
//! Нетронутая капсула сериализуется обратно байт в байт; после изменяющего
//! доступа источником истины становится разобранное сообщение.

use bytes::{Bytes, BytesMut};
use once_cell::sync::OnceCell;
use pbwire_error::WireResult;
use tracing::warn;

use crate::{
    codec::{encode_to_bytes, merge_from_bytes, Message, MessagePrototype},
    stream::ParseOptions,
};

/// Капсула вложенного сообщения с отложенным разбором.
#[derive(Debug, Clone)]
pub struct LazyMessage {
    raw: Bytes,
    prototype: MessagePrototype,
    options: ParseOptions,
    parsed: OnceCell<Box<dyn Message>>,
    touched: bool,
}

impl LazyMessage {
    /// Капсула из сериализованных байт.
    pub fn new(
        raw: impl Into<Bytes>,
        prototype: MessagePrototype,
    ) -> Self {
        Self {
            raw: raw.into(),
            prototype,
            options: ParseOptions::default(),
            parsed: OnceCell::new(),
            touched: false,
        }
    }

    /// Параметры, с которыми капсула будет разобрана.
    pub fn with_options(
        mut self,
        options: ParseOptions,
    ) -> Self {
        self.options = options;
        self
    }

    /// Капсула, сразу содержащая разобранное сообщение.
    pub fn from_message(
        message: Box<dyn Message>,
        prototype: MessagePrototype,
    ) -> Self {
        Self {
            raw: Bytes::new(),
            prototype,
            options: ParseOptions::default(),
            parsed: OnceCell::with_value(message),
            touched: true,
        }
    }

    /// Сообщение уже разобрано.
    pub fn is_materialized(&self) -> bool {
        self.parsed.get().is_some()
    }

    /// Сырые байты нетронутой капсулы.
    pub fn raw_bytes(&self) -> Option<&Bytes> {
        (!self.touched).then_some(&self.raw)
    }

    pub fn prototype(&self) -> MessagePrototype {
        self.prototype
    }

    /// Разобранное сообщение или ошибка разбора.
    ///
    /// Ошибка не кэшируется: следующий вызов разбирает байты заново.
    pub fn try_get(&self) -> WireResult<&dyn Message> {
        if let Some(msg) = self.parsed.get() {
            return Ok(msg.as_ref());
        }
        let msg = self.parse()?;
        Ok(self.parsed.get_or_init(|| msg).as_ref())
    }

    /// Разобранное сообщение. Если байты не разбираются, возвращается
    /// пустое сообщение, а в журнал пишется предупреждение.
    pub fn get(&self) -> &dyn Message {
        self.parsed
            .get_or_init(|| match self.parse() {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, bytes = self.raw.len(), "lazy message failed to parse");
                    (self.prototype)()
                }
            })
            .as_ref()
    }

    /// Изменяемый доступ. После него капсула сериализует сообщение, а не
    /// исходные байты.
    pub fn get_mut(&mut self) -> &mut dyn Message {
        self.get();
        self.touched = true;
        self.raw = Bytes::new();
        match self.parsed.get_mut() {
            Some(msg) => msg.as_mut(),
            None => unreachable!("materialized above"),
        }
    }

    /// Забирает сообщение, разбирая его при необходимости.
    pub fn into_message(mut self) -> Box<dyn Message> {
        self.get();
        match self.parsed.take() {
            Some(msg) => msg,
            None => (self.prototype)(),
        }
    }

    /// Сбрасывает содержимое до пустого сообщения.
    pub fn clear(&mut self) {
        self.raw = Bytes::new();
        self.parsed = OnceCell::new();
        self.touched = false;
    }

    /// Сырые байты капсулы и разобранное сообщение, если оно есть.
    pub fn space_used_excluding_self(&self) -> usize {
        self.raw.len() + self.parsed.get().map_or(0, |msg| msg.space_used())
    }

    pub fn encoded_len(&self) -> usize {
        match self.parsed.get() {
            Some(msg) if self.touched => msg.encoded_len(),
            _ => self.raw.len(),
        }
    }

    pub fn encode(
        &self,
        buf: &mut BytesMut,
    ) {
        match self.parsed.get() {
            Some(msg) if self.touched => msg.encode_raw(buf),
            _ => buf.extend_from_slice(&self.raw),
        }
    }

    /// Сериализованная форма.
    pub fn to_bytes(&self) -> Bytes {
        match self.parsed.get() {
            Some(msg) if self.touched => encode_to_bytes(msg.as_ref()),
            _ => self.raw.clone(),
        }
    }

    /// Сливает другую капсулу. Две нетронутые капсулы склеиваются по
    /// байтам без разбора.
    pub fn merge_from(
        &mut self,
        other: &LazyMessage,
    ) -> WireResult<()> {
        if !self.touched && !other.touched {
            let mut buf = BytesMut::with_capacity(self.raw.len() + other.raw.len());
            buf.extend_from_slice(&self.raw);
            buf.extend_from_slice(&other.raw);
            self.raw = buf.freeze();
            self.parsed = OnceCell::new();
            return Ok(());
        }
        let other = other.get();
        self.get_mut().merge_from_dyn(other)
    }

    /// Дописывает сериализованные байты.
    pub fn merge_bytes(
        &mut self,
        data: Bytes,
    ) -> WireResult<()> {
        if !self.touched {
            if self.raw.is_empty() {
                self.raw = data;
            } else {
                let mut buf = BytesMut::with_capacity(self.raw.len() + data.len());
                buf.extend_from_slice(&self.raw);
                buf.extend_from_slice(&data);
                self.raw = buf.freeze();
            }
            self.parsed = OnceCell::new();
            return Ok(());
        }
        let options = self.options;
        merge_from_bytes(self.get_mut(), data, &options)
    }

    fn parse(&self) -> WireResult<Box<dyn Message>> {
        let mut msg = (self.prototype)();
        merge_from_bytes(msg.as_mut(), self.raw.clone(), &self.options)?;
        Ok(msg)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RawMessage;

    /// Тест проверяет побайтовую сериализацию нетронутой капсулы, даже
    /// если байты не в каноническом виде.
    #[test]
    fn test_untouched_is_byte_exact() {
        // varint 1 в избыточной 2-байтовой форме
        let raw = Bytes::from_static(&[0x08, 0x81, 0x00]);
        let lazy = LazyMessage::new(raw.clone(), RawMessage::prototype);
        assert!(!lazy.is_materialized());

        let _ = lazy.get();
        assert!(lazy.is_materialized());
        assert_eq!(lazy.to_bytes(), raw);
        assert_eq!(lazy.encoded_len(), 3);
    }

    /// Тест проверяет учёт памяти до и после разбора капсулы.
    #[test]
    fn test_space_used() {
        let lazy = LazyMessage::new(vec![0x08, 0x01], RawMessage::prototype);
        assert_eq!(lazy.space_used_excluding_self(), 2);

        let parsed = lazy.get().space_used();
        assert!(parsed >= std::mem::size_of::<RawMessage>());
        assert_eq!(lazy.space_used_excluding_self(), 2 + parsed);
    }

    /// Тест проверяет, что после изменения сериализуется сообщение.
    #[test]
    fn test_touched_serializes_message() {
        let mut lazy = LazyMessage::new(vec![0x08, 0x01], RawMessage::prototype);
        let msg = lazy.get_mut();
        let raw = msg.as_any_mut().downcast_mut::<RawMessage>().unwrap();
        raw.unknown_fields_mut().add_varint(2, 2);

        assert!(lazy.raw_bytes().is_none());
        assert_eq!(&lazy.to_bytes()[..], &[0x08, 0x01, 0x10, 0x02]);
    }

    /// Тест проверяет склейку двух нетронутых капсул.
    #[test]
    fn test_merge_untouched_concatenates() {
        let mut a = LazyMessage::new(vec![0x08, 0x01], RawMessage::prototype);
        let b = LazyMessage::new(vec![0x10, 0x02], RawMessage::prototype);
        a.merge_from(&b).unwrap();
        assert!(!a.is_materialized());
        assert_eq!(&a.to_bytes()[..], &[0x08, 0x01, 0x10, 0x02]);
    }

    /// Тест проверяет поведение при ошибке разбора.
    #[test]
    fn test_parse_failure() {
        let lazy = LazyMessage::new(vec![0x08], RawMessage::prototype);
        assert!(lazy.try_get().is_err());
        assert!(!lazy.is_materialized());

        assert_eq!(lazy.get().encoded_len(), 0);
        assert!(lazy.try_get().is_ok());
    }
}
