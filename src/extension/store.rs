//! Хранилище расширений: разреженное отображение номер поля -> значение.
//!
//! Пока записей немного, они лежат в отсортированном векторе (поиск
//! бинарный, вставка сдвигом). Ёмкость вектора удваивается до
//! [`MAX_FLAT_CAPACITY`]; при переполнении записи один раз переносятся в
//! `BTreeMap`, и хранилище больше не возвращается к вектору. Обход всегда
//! идёт по возрастанию номера.

use std::{
    collections::{btree_map, BTreeMap},
    mem, slice,
};

use pbwire_error::WireResult;
use tracing::debug;

use super::{Extension, ExtensionValue, FieldType, RepeatedValue, ValueKind};
use crate::codec::{Message, MessagePrototype};

/// Предел плоского представления.
pub const MAX_FLAT_CAPACITY: usize = 256;

/// Хранилище расширений одного сообщения.
#[derive(Debug, Clone)]
pub struct ExtensionStore {
    repr: Repr,
}

#[derive(Debug, Clone)]
enum Repr {
    Flat(Vec<(u32, Extension)>),
    Large(BTreeMap<u32, Extension>),
}

/// Итератор по записям в порядке возрастания номера.
pub struct Iter<'a> {
    inner: IterInner<'a>,
}

enum IterInner<'a> {
    Flat(slice::Iter<'a, (u32, Extension)>),
    Large(btree_map::Range<'a, u32, Extension>),
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ExtensionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Записи хранятся в отсортированном векторе.
    pub fn is_flat(&self) -> bool {
        matches!(self.repr, Repr::Flat(_))
    }

    /// Кол-во слотов, включая сброшенные.
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Flat(flat) => flat.len(),
            Repr::Large(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn extension(
        &self,
        number: u32,
    ) -> Option<&Extension> {
        match &self.repr {
            Repr::Flat(flat) => flat
                .binary_search_by_key(&number, |(n, _)| *n)
                .ok()
                .map(|pos| &flat[pos].1),
            Repr::Large(map) => map.get(&number),
        }
    }

    pub fn extension_mut(
        &mut self,
        number: u32,
    ) -> Option<&mut Extension> {
        match &mut self.repr {
            Repr::Flat(flat) => match flat.binary_search_by_key(&number, |(n, _)| *n) {
                Ok(pos) => Some(&mut flat[pos].1),
                Err(_) => None,
            },
            Repr::Large(map) => map.get_mut(&number),
        }
    }

    /// Находит слот или создаёт его через `make`. Второй элемент - `true`,
    /// если слот новый.
    pub fn insert(
        &mut self,
        number: u32,
        make: impl FnOnce() -> Extension,
    ) -> (&mut Extension, bool) {
        if let Repr::Flat(flat) = &self.repr {
            if flat.len() >= MAX_FLAT_CAPACITY
                && flat.binary_search_by_key(&number, |(n, _)| *n).is_err()
            {
                self.migrate_to_large();
            }
        }

        match &mut self.repr {
            Repr::Flat(flat) => match flat.binary_search_by_key(&number, |(n, _)| *n) {
                Ok(pos) => (&mut flat[pos].1, false),
                Err(pos) => {
                    grow_flat(flat);
                    flat.insert(pos, (number, make()));
                    (&mut flat[pos].1, true)
                }
            },
            Repr::Large(map) => match map.entry(number) {
                btree_map::Entry::Occupied(e) => (e.into_mut(), false),
                btree_map::Entry::Vacant(e) => (e.insert(make()), true),
            },
        }
    }

    /// Удаляет слот целиком.
    pub fn erase(
        &mut self,
        number: u32,
    ) -> Option<Extension> {
        match &mut self.repr {
            Repr::Flat(flat) => flat
                .binary_search_by_key(&number, |(n, _)| *n)
                .ok()
                .map(|pos| flat.remove(pos).1),
            Repr::Large(map) => map.remove(&number),
        }
    }

    pub fn iter(&self) -> Iter<'_> {
        let inner = match &self.repr {
            Repr::Flat(flat) => IterInner::Flat(flat.iter()),
            Repr::Large(map) => IterInner::Large(map.range(..)),
        };
        Iter { inner }
    }

    /// Записи с номерами из `[start, end)`.
    pub fn range(
        &self,
        start: u32,
        end: u32,
    ) -> Iter<'_> {
        let inner = match &self.repr {
            Repr::Flat(flat) => {
                let lo = flat.partition_point(|(n, _)| *n < start);
                let hi = flat.partition_point(|(n, _)| *n < end).max(lo);
                IterInner::Flat(flat[lo..hi].iter())
            }
            Repr::Large(map) if start < end => IterInner::Large(map.range(start..end)),
            Repr::Large(map) => IterInner::Large(map.range(start..start)),
        };
        Iter { inner }
    }

    pub fn for_each(
        &self,
        mut f: impl FnMut(u32, &Extension),
    ) {
        for (number, ext) in self.iter() {
            f(number, ext);
        }
    }

    /// Значение присутствует: одиночное не сброшено, повторяющееся не пусто.
    pub fn has(
        &self,
        number: u32,
    ) -> bool {
        self.extension(number).is_some_and(Extension::is_present)
    }

    /// Кол-во присутствующих расширений.
    pub fn num_extensions(&self) -> usize {
        self.iter().filter(|(_, ext)| ext.is_present()).count()
    }

    pub fn extension_size(
        &self,
        number: u32,
    ) -> usize {
        self.extension(number).map_or(0, Extension::len)
    }

    pub fn extension_type(
        &self,
        number: u32,
    ) -> Option<FieldType> {
        self.extension(number).map(Extension::field_type)
    }

    pub fn clear_extension(
        &mut self,
        number: u32,
    ) {
        if let Some(ext) = self.extension_mut(number) {
            ext.clear();
        }
    }

    /// Сбрасывает все значения; слоты остаются для повторного
    /// использования.
    pub fn clear(&mut self) {
        match &mut self.repr {
            Repr::Flat(flat) => flat.iter_mut().for_each(|(_, ext)| ext.clear()),
            Repr::Large(map) => map.values_mut().for_each(Extension::clear),
        }
    }

    pub fn remove_last(
        &mut self,
        number: u32,
    ) {
        self.repeated_mut(number).remove_last();
    }

    pub fn swap_elements(
        &mut self,
        number: u32,
        a: usize,
        b: usize,
    ) {
        self.repeated_mut(number).swap_elements(a, b);
    }

    /// Сливает расширения `other` по правилам типа каждого поля.
    pub fn merge_from(
        &mut self,
        other: &ExtensionStore,
    ) -> WireResult<()> {
        for (number, ext) in other.iter() {
            if ext.is_repeated() {
                let (slot, _) = self.insert(number, || {
                    Extension::repeated(ext.field_type(), ext.is_packed())
                        .with_descriptor(ext.descriptor().cloned())
                });
                slot.merge_from(ext)?;
            } else if !ext.is_cleared() {
                let (slot, created) = self.insert(number, || ext.clone());
                if !created {
                    slot.merge_from(ext)?;
                }
            }
        }
        Ok(())
    }

    pub fn swap(
        &mut self,
        other: &mut ExtensionStore,
    ) {
        mem::swap(self, other);
    }

    /// Обменивает одно расширение между хранилищами.
    pub fn swap_extension(
        &mut self,
        other: &mut ExtensionStore,
        number: u32,
    ) {
        let mine = self.erase(number);
        let theirs = other.erase(number);
        if let Some(ext) = theirs {
            self.insert(number, || ext);
        }
        if let Some(ext) = mine {
            other.insert(number, || ext);
        }
    }

    /// Байты, занятые хранилищем, без самой структуры.
    pub fn space_used_excluding_self(&self) -> usize {
        let slots = match &self.repr {
            Repr::Flat(flat) => flat.capacity() * mem::size_of::<(u32, Extension)>(),
            Repr::Large(map) => map.len() * mem::size_of::<(u32, Extension)>(),
        };
        let payload: usize = self
            .iter()
            .map(|(_, ext)| match ext.value() {
                ExtensionValue::String(s) => s.capacity(),
                ExtensionValue::Bytes(b) => b.capacity(),
                ExtensionValue::Message(m) => m.space_used(),
                ExtensionValue::Lazy(l) => l.space_used_excluding_self(),
                ExtensionValue::Repeated(r) => repeated_space(r),
                _ => 0,
            })
            .sum();
        slots + payload
    }

    ////////////////////////////////////////////////////////////////////////////
    // Строки и байты
    ////////////////////////////////////////////////////////////////////////////

    pub fn get_string<'a>(
        &'a self,
        number: u32,
        default: &'a str,
    ) -> &'a str {
        match self.extension(number) {
            Some(ext) if !ext.is_cleared() => match ext.value() {
                ExtensionValue::String(s) => s.as_str(),
                other => type_mismatch(number, ValueKind::String, other),
            },
            _ => default,
        }
    }

    pub fn set_string(
        &mut self,
        number: u32,
        field_type: FieldType,
        value: impl Into<String>,
    ) {
        *self.mutable_string(number, field_type) = value.into();
    }

    /// Изменяемая строка; слот создаётся при необходимости.
    pub fn mutable_string(
        &mut self,
        number: u32,
        field_type: FieldType,
    ) -> &mut String {
        check_kind(field_type, ValueKind::String);
        let (ext, _) = self.insert(number, || {
            Extension::singular(field_type, ExtensionValue::String(String::new()))
        });
        ext.set_cleared(false);
        match ext.value_mut() {
            ExtensionValue::String(s) => s,
            other => type_mismatch(number, ValueKind::String, other),
        }
    }

    pub fn add_string(
        &mut self,
        number: u32,
        field_type: FieldType,
        value: impl Into<String>,
    ) {
        check_kind(field_type, ValueKind::String);
        match self.repeated_slot(number, field_type, false) {
            RepeatedValue::String(v) => v.push(value.into()),
            other => type_mismatch_repeated(number, ValueKind::String, other),
        }
    }

    pub fn get_repeated_string(
        &self,
        number: u32,
        index: usize,
    ) -> &str {
        match self.repeated_ref(number) {
            RepeatedValue::String(v) => &v[index],
            other => type_mismatch_repeated(number, ValueKind::String, other),
        }
    }

    pub fn set_repeated_string(
        &mut self,
        number: u32,
        index: usize,
        value: impl Into<String>,
    ) {
        match self.repeated_mut(number) {
            RepeatedValue::String(v) => v[index] = value.into(),
            other => type_mismatch_repeated(number, ValueKind::String, other),
        }
    }

    pub fn repeated_string(
        &self,
        number: u32,
    ) -> &[String] {
        match self.extension(number).and_then(Extension::repeated_value) {
            Some(RepeatedValue::String(v)) => v.as_slice(),
            Some(other) => type_mismatch_repeated(number, ValueKind::String, other),
            None => &[],
        }
    }

    pub fn get_bytes<'a>(
        &'a self,
        number: u32,
        default: &'a [u8],
    ) -> &'a [u8] {
        match self.extension(number) {
            Some(ext) if !ext.is_cleared() => match ext.value() {
                ExtensionValue::Bytes(b) => b.as_slice(),
                other => type_mismatch(number, ValueKind::Bytes, other),
            },
            _ => default,
        }
    }

    pub fn set_bytes(
        &mut self,
        number: u32,
        field_type: FieldType,
        value: impl Into<Vec<u8>>,
    ) {
        *self.mutable_bytes(number, field_type) = value.into();
    }

    pub fn mutable_bytes(
        &mut self,
        number: u32,
        field_type: FieldType,
    ) -> &mut Vec<u8> {
        check_kind(field_type, ValueKind::Bytes);
        let (ext, _) = self.insert(number, || {
            Extension::singular(field_type, ExtensionValue::Bytes(Vec::new()))
        });
        ext.set_cleared(false);
        match ext.value_mut() {
            ExtensionValue::Bytes(b) => b,
            other => type_mismatch(number, ValueKind::Bytes, other),
        }
    }

    pub fn add_bytes(
        &mut self,
        number: u32,
        field_type: FieldType,
        value: impl Into<Vec<u8>>,
    ) {
        check_kind(field_type, ValueKind::Bytes);
        match self.repeated_slot(number, field_type, false) {
            RepeatedValue::Bytes(v) => v.push(value.into()),
            other => type_mismatch_repeated(number, ValueKind::Bytes, other),
        }
    }

    pub fn get_repeated_bytes(
        &self,
        number: u32,
        index: usize,
    ) -> &[u8] {
        match self.repeated_ref(number) {
            RepeatedValue::Bytes(v) => &v[index],
            other => type_mismatch_repeated(number, ValueKind::Bytes, other),
        }
    }

    pub fn set_repeated_bytes(
        &mut self,
        number: u32,
        index: usize,
        value: impl Into<Vec<u8>>,
    ) {
        match self.repeated_mut(number) {
            RepeatedValue::Bytes(v) => v[index] = value.into(),
            other => type_mismatch_repeated(number, ValueKind::Bytes, other),
        }
    }

    pub fn repeated_bytes(
        &self,
        number: u32,
    ) -> &[Vec<u8>] {
        match self.extension(number).and_then(Extension::repeated_value) {
            Some(RepeatedValue::Bytes(v)) => v.as_slice(),
            Some(other) => type_mismatch_repeated(number, ValueKind::Bytes, other),
            None => &[],
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Сообщения
    ////////////////////////////////////////////////////////////////////////////

    /// Вложенное сообщение, если оно присутствует. Ленивое сообщение
    /// разбирается при первом обращении.
    pub fn get_message(
        &self,
        number: u32,
    ) -> Option<&dyn Message> {
        let ext = self.extension(number).filter(|ext| !ext.is_cleared())?;
        match ext.value() {
            ExtensionValue::Message(m) => Some(m.as_ref()),
            ExtensionValue::Lazy(lazy) => Some(lazy.get()),
            other => type_mismatch(number, ValueKind::Message, other),
        }
    }

    /// Изменяемое вложенное сообщение; создаётся из `prototype`, если слота
    /// нет.
    pub fn mutable_message(
        &mut self,
        number: u32,
        field_type: FieldType,
        prototype: MessagePrototype,
    ) -> &mut dyn Message {
        check_kind(field_type, ValueKind::Message);
        let (ext, _) = self.insert(number, || {
            Extension::singular(field_type, ExtensionValue::Message(prototype()))
        });
        ext.set_cleared(false);
        match ext.value_mut() {
            ExtensionValue::Message(m) => m.as_mut(),
            ExtensionValue::Lazy(lazy) => lazy.get_mut(),
            other => type_mismatch(number, ValueKind::Message, other),
        }
    }

    /// Передаёт владение сообщением хранилищу. `None` сбрасывает поле.
    pub fn set_allocated_message(
        &mut self,
        number: u32,
        field_type: FieldType,
        message: Option<Box<dyn Message>>,
    ) {
        check_kind(field_type, ValueKind::Message);
        let Some(message) = message else {
            self.clear_extension(number);
            return;
        };
        match self.extension_mut(number) {
            Some(ext) => {
                match ext.value() {
                    ExtensionValue::Message(_) | ExtensionValue::Lazy(_) => {}
                    other => type_mismatch(number, ValueKind::Message, other),
                }
                *ext.value_mut() = ExtensionValue::Message(message);
                ext.set_cleared(false);
            }
            None => {
                self.insert(number, move || {
                    Extension::singular(field_type, ExtensionValue::Message(message))
                });
            }
        }
    }

    /// Забирает сообщение и удаляет слот.
    pub fn release_message(
        &mut self,
        number: u32,
    ) -> Option<Box<dyn Message>> {
        let ext = self.erase(number)?;
        if ext.is_cleared() {
            return None;
        }
        match ext.into_value() {
            ExtensionValue::Message(m) => Some(m),
            ExtensionValue::Lazy(lazy) => Some(lazy.into_message()),
            other => type_mismatch(number, ValueKind::Message, &other),
        }
    }

    /// Добавляет элемент повторяющегося сообщения.
    pub fn add_message(
        &mut self,
        number: u32,
        field_type: FieldType,
        prototype: MessagePrototype,
    ) -> &mut dyn Message {
        check_kind(field_type, ValueKind::Message);
        match self.repeated_slot(number, field_type, false) {
            RepeatedValue::Message(v) => {
                v.push(prototype());
                let last = v.len() - 1;
                v[last].as_mut()
            }
            other => type_mismatch_repeated(number, ValueKind::Message, other),
        }
    }

    pub fn get_repeated_message(
        &self,
        number: u32,
        index: usize,
    ) -> &dyn Message {
        match self.repeated_ref(number) {
            RepeatedValue::Message(v) => v[index].as_ref(),
            other => type_mismatch_repeated(number, ValueKind::Message, other),
        }
    }

    pub fn mutable_repeated_message(
        &mut self,
        number: u32,
        index: usize,
    ) -> &mut dyn Message {
        match self.repeated_mut(number) {
            RepeatedValue::Message(v) => v[index].as_mut(),
            other => type_mismatch_repeated(number, ValueKind::Message, other),
        }
    }

    pub fn repeated_message(
        &self,
        number: u32,
    ) -> &[Box<dyn Message>] {
        match self.extension(number).and_then(Extension::repeated_value) {
            Some(RepeatedValue::Message(v)) => v.as_slice(),
            Some(other) => type_mismatch_repeated(number, ValueKind::Message, other),
            None => &[],
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Внутренние помощники
    ////////////////////////////////////////////////////////////////////////////

    /// Повторяющийся контейнер, создаваемый при первом добавлении.
    pub(crate) fn repeated_slot(
        &mut self,
        number: u32,
        field_type: FieldType,
        is_packed: bool,
    ) -> &mut RepeatedValue {
        let (ext, _) = self.insert(number, || Extension::repeated(field_type, is_packed));
        match ext.repeated_value_mut() {
            Some(r) => r,
            None => panic!("extension {number} is singular, not repeated"),
        }
    }

    #[track_caller]
    fn repeated_ref(
        &self,
        number: u32,
    ) -> &RepeatedValue {
        match self.extension(number).and_then(Extension::repeated_value) {
            Some(r) => r,
            None => panic!("extension {number} is not a present repeated field"),
        }
    }

    #[track_caller]
    fn repeated_mut(
        &mut self,
        number: u32,
    ) -> &mut RepeatedValue {
        match self
            .extension_mut(number)
            .and_then(Extension::repeated_value_mut)
        {
            Some(r) => r,
            None => panic!("extension {number} is not a present repeated field"),
        }
    }

    fn migrate_to_large(&mut self) {
        let Repr::Flat(flat) = &mut self.repr else {
            return;
        };
        let entries = mem::take(flat);
        debug!(
            entries = entries.len(),
            "extension store switched to tree representation"
        );
        self.repr = Repr::Large(entries.into_iter().collect());
    }
}

macro_rules! scalar_accessors {
    ($($kind:ident: $ty:ty => $get:ident, $set:ident, $get_rep:ident, $set_rep:ident, $add:ident, $rep:ident;)*) => {
        impl ExtensionStore {
            $(
                #[doc = concat!("Значение `", stringify!($ty), "` или `default`, если поля нет.")]
                pub fn $get(
                    &self,
                    number: u32,
                    default: $ty,
                ) -> $ty {
                    match self.extension(number) {
                        Some(ext) if !ext.is_cleared() => match ext.value() {
                            ExtensionValue::$kind(v) => *v,
                            other => type_mismatch(number, ValueKind::$kind, other),
                        },
                        _ => default,
                    }
                }

                pub fn $set(
                    &mut self,
                    number: u32,
                    field_type: FieldType,
                    value: $ty,
                ) {
                    check_kind(field_type, ValueKind::$kind);
                    let (ext, _) = self.insert(number, || {
                        Extension::singular(field_type, ExtensionValue::$kind(value))
                    });
                    match ext.value_mut() {
                        ExtensionValue::$kind(slot) => *slot = value,
                        other => type_mismatch(number, ValueKind::$kind, other),
                    }
                    ext.set_cleared(false);
                }

                pub fn $get_rep(
                    &self,
                    number: u32,
                    index: usize,
                ) -> $ty {
                    match self.repeated_ref(number) {
                        RepeatedValue::$kind(v) => v[index],
                        other => type_mismatch_repeated(number, ValueKind::$kind, other),
                    }
                }

                pub fn $set_rep(
                    &mut self,
                    number: u32,
                    index: usize,
                    value: $ty,
                ) {
                    match self.repeated_mut(number) {
                        RepeatedValue::$kind(v) => v.set(index, value),
                        other => type_mismatch_repeated(number, ValueKind::$kind, other),
                    }
                }

                #[doc = concat!("Добавляет элемент повторяющегося `", stringify!($ty), "`.")]
                pub fn $add(
                    &mut self,
                    number: u32,
                    field_type: FieldType,
                    is_packed: bool,
                    value: $ty,
                ) {
                    check_kind(field_type, ValueKind::$kind);
                    match self.repeated_slot(number, field_type, is_packed) {
                        RepeatedValue::$kind(v) => v.push(value),
                        other => type_mismatch_repeated(number, ValueKind::$kind, other),
                    }
                }

                pub fn $rep(
                    &self,
                    number: u32,
                ) -> &[$ty] {
                    match self.extension(number).and_then(Extension::repeated_value) {
                        Some(RepeatedValue::$kind(v)) => v.as_slice(),
                        Some(other) => type_mismatch_repeated(number, ValueKind::$kind, other),
                        None => &[],
                    }
                }
            )*
        }
    };
}

scalar_accessors! {
    Int32: i32 => get_int32, set_int32, get_repeated_int32, set_repeated_int32, add_int32, repeated_int32;
    Int64: i64 => get_int64, set_int64, get_repeated_int64, set_repeated_int64, add_int64, repeated_int64;
    UInt32: u32 => get_uint32, set_uint32, get_repeated_uint32, set_repeated_uint32, add_uint32, repeated_uint32;
    UInt64: u64 => get_uint64, set_uint64, get_repeated_uint64, set_repeated_uint64, add_uint64, repeated_uint64;
    Float: f32 => get_float, set_float, get_repeated_float, set_repeated_float, add_float, repeated_float;
    Double: f64 => get_double, set_double, get_repeated_double, set_repeated_double, add_double, repeated_double;
    Bool: bool => get_bool, set_bool, get_repeated_bool, set_repeated_bool, add_bool, repeated_bool;
    Enum: i32 => get_enum, set_enum, get_repeated_enum, set_repeated_enum, add_enum, repeated_enum;
}

fn grow_flat(flat: &mut Vec<(u32, Extension)>) {
    let capacity = flat.capacity();
    if flat.len() < capacity {
        return;
    }
    let new_capacity = (capacity * 2).clamp(1, MAX_FLAT_CAPACITY);
    flat.reserve_exact(new_capacity - flat.len());
}

fn repeated_space(value: &RepeatedValue) -> usize {
    match value {
        RepeatedValue::Int32(v) | RepeatedValue::Enum(v) => v.space_used_excluding_self(),
        RepeatedValue::Int64(v) => v.space_used_excluding_self(),
        RepeatedValue::UInt32(v) => v.space_used_excluding_self(),
        RepeatedValue::UInt64(v) => v.space_used_excluding_self(),
        RepeatedValue::Float(v) => v.space_used_excluding_self(),
        RepeatedValue::Double(v) => v.space_used_excluding_self(),
        RepeatedValue::Bool(v) => v.space_used_excluding_self(),
        RepeatedValue::String(v) => {
            v.capacity() * mem::size_of::<String>() + v.iter().map(String::capacity).sum::<usize>()
        }
        RepeatedValue::Bytes(v) => {
            v.capacity() * mem::size_of::<Vec<u8>>() + v.iter().map(Vec::capacity).sum::<usize>()
        }
        RepeatedValue::Message(v) => {
            v.capacity() * mem::size_of::<Box<dyn Message>>()
                + v.iter().map(|m| m.space_used()).sum::<usize>()
        }
    }
}

#[track_caller]
fn check_kind(
    field_type: FieldType,
    kind: ValueKind,
) {
    assert_eq!(
        field_type.value_kind(),
        kind,
        "field type {field_type:?} cannot hold {kind:?}"
    );
}

#[cold]
#[track_caller]
fn type_mismatch(
    number: u32,
    expected: ValueKind,
    found: &ExtensionValue,
) -> ! {
    match found.kind() {
        Some(kind) => panic!("extension {number} accessed as {expected:?}, but holds {kind:?}"),
        None => panic!("extension {number} accessed as singular {expected:?}, but is repeated"),
    }
}

#[cold]
#[track_caller]
fn type_mismatch_repeated(
    number: u32,
    expected: ValueKind,
    found: &RepeatedValue,
) -> ! {
    panic!(
        "extension {number} accessed as repeated {expected:?}, but holds repeated {:?}",
        found.kind()
    )
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for ExtensionStore {
    fn default() -> Self {
        Self {
            repr: Repr::Flat(Vec::new()),
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (u32, &'a Extension);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterInner::Flat(it) => it.next().map(|(n, ext)| (*n, ext)),
            IterInner::Large(it) => it.next().map(|(n, ext)| (*n, ext)),
        }
    }
}

impl<'a> IntoIterator for &'a ExtensionStore {
    type Item = (u32, &'a Extension);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
