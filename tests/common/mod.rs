//! Общие тестовые сообщения, написанные вручную в том виде, в каком их
//! порождает генератор кода.

#![allow(dead_code)]

pub mod generators;

use std::any::Any;

use bytes::{Bytes, BytesMut};
use pbwire::{
    codec::{
        bytes_field_len, field_len, group_field_len, message_field_len, packed_len,
        read_repeated, write_field, write_group, write_message, write_packed, write_string, Bool,
        Double, Int32, SInt64,
    },
    ChunkListSource, Message, ParseSession, Tag, UnknownFields, WireCodec, WireResult, WireType,
};

/// Сообщение со всеми видами полей:
///
/// ```text
/// message Person {
///   int32 id = 1;
///   string name = 2;
///   repeated sint64 scores = 3 [packed = true];
///   Person child = 4;
///   repeated string emails = 5;
///   double ratio = 6;
///   bool active = 7;
///   group Legacy = 8 { ... same fields ... }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Person {
    pub id: i32,
    pub name: String,
    pub scores: Vec<i64>,
    pub child: Option<Box<Person>>,
    pub emails: Vec<String>,
    pub ratio: f64,
    pub active: bool,
    pub legacy: Option<Box<Person>>,
    pub unknown: UnknownFields,
}

impl Person {
    pub fn sample() -> Self {
        Self {
            id: 150,
            name: "Ada".to_string(),
            scores: vec![-1, 0, 1, i64::MIN, i64::MAX],
            child: Some(Box::new(Person {
                id: -1,
                emails: vec![String::new(), "a@b".to_string()],
                ..Default::default()
            })),
            emails: vec!["ada@example.com".to_string()],
            ratio: 0.5,
            active: true,
            legacy: Some(Box::new(Person {
                name: "old".to_string(),
                ..Default::default()
            })),
            unknown: UnknownFields::new(),
        }
    }

    /// Цепочка из `depth` вложенных сообщений через поле `child`.
    pub fn nested(depth: usize) -> Self {
        let mut person = Person {
            id: depth as i32,
            ..Default::default()
        };
        for level in (0..depth).rev() {
            person = Person {
                id: level as i32,
                child: Some(Box::new(person)),
                ..Default::default()
            };
        }
        person
    }

    /// То же через групповое поле `legacy`.
    pub fn nested_groups(depth: usize) -> Self {
        let mut person = Person::default();
        for _ in 0..depth {
            person = Person {
                legacy: Some(Box::new(person)),
                ..Default::default()
            };
        }
        person
    }

    pub fn prototype() -> Box<dyn Message> {
        Box::new(Self::default())
    }
}

impl Message for Person {
    fn merge_field(
        &mut self,
        tag: Tag,
        session: &mut ParseSession<'_>,
    ) -> WireResult<()> {
        match (tag.field_number(), tag.wire_type()) {
            (1, WireType::Varint) => self.id = Int32::read(session)?,
            (2, WireType::LengthDelimited) => self.name = session.read_string(2)?,
            (3, _) => {
                if !read_repeated::<SInt64>(tag, session, &mut self.scores)? {
                    session.skip_field(tag, Some(&mut self.unknown))?;
                }
            }
            (4, WireType::LengthDelimited) => {
                session.parse_message(&mut **self.child.get_or_insert_with(Default::default))?
            }
            (5, WireType::LengthDelimited) => self.emails.push(session.read_string(5)?),
            (6, WireType::Fixed64) => self.ratio = Double::read(session)?,
            (7, WireType::Varint) => self.active = Bool::read(session)?,
            (8, WireType::StartGroup) => {
                session.parse_group(tag, &mut **self.legacy.get_or_insert_with(Default::default))?
            }
            _ => session.skip_field(tag, Some(&mut self.unknown))?,
        }
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if self.id != 0 {
            len += field_len::<Int32>(1, self.id);
        }
        if !self.name.is_empty() {
            len += bytes_field_len(2, self.name.len());
        }
        len += packed_len::<SInt64>(3, &self.scores);
        if let Some(child) = &self.child {
            len += message_field_len(4, &**child);
        }
        len += self
            .emails
            .iter()
            .map(|e| bytes_field_len(5, e.len()))
            .sum::<usize>();
        if self.ratio != 0.0 {
            len += field_len::<Double>(6, self.ratio);
        }
        if self.active {
            len += field_len::<Bool>(7, true);
        }
        if let Some(legacy) = &self.legacy {
            len += group_field_len(8, &**legacy);
        }
        len + self.unknown.len()
    }

    fn encode_raw(
        &self,
        buf: &mut BytesMut,
    ) {
        if self.id != 0 {
            write_field::<Int32>(1, self.id, buf);
        }
        if !self.name.is_empty() {
            write_string(2, &self.name, buf);
        }
        write_packed::<SInt64>(3, &self.scores, buf);
        if let Some(child) = &self.child {
            write_message(4, &**child, buf);
        }
        for email in &self.emails {
            write_string(5, email, buf);
        }
        if self.ratio != 0.0 {
            write_field::<Double>(6, self.ratio, buf);
        }
        if self.active {
            write_field::<Bool>(7, true, buf);
        }
        if let Some(legacy) = &self.legacy {
            write_group(8, &**legacy, buf);
        }
        self.unknown.encode(buf);
    }

    fn clear(&mut self) {
        *self = Self::default();
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

/// Разбивает данные на порции фиксированного размера.
pub fn chunked(
    data: &[u8],
    size: usize,
) -> ChunkListSource {
    ChunkListSource::new(
        data.chunks(size.max(1))
            .map(Bytes::copy_from_slice)
            .collect::<Vec<_>>(),
    )
}

/// Разбивает данные в двух точках на три порции.
pub fn split_at(
    data: &[u8],
    first: usize,
    second: usize,
) -> ChunkListSource {
    ChunkListSource::new(vec![
        Bytes::copy_from_slice(&data[..first]),
        Bytes::copy_from_slice(&data[first..second]),
        Bytes::copy_from_slice(&data[second..]),
    ])
}
