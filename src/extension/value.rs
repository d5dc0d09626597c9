//! Значения расширений: тип поля, тегированное значение, повторяющиеся
//! контейнеры.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use pbwire_error::WireResult;

use super::{ExtensionInfo, LazyMessage};
use crate::{codec::Message, collections::GrowableArray, wire::WireType};

/// Объявленный тип поля. Нумерация совпадает с дескрипторами protobuf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FieldType {
    Double = 1,
    Float = 2,
    Int64 = 3,
    UInt64 = 4,
    Int32 = 5,
    Fixed64 = 6,
    Fixed32 = 7,
    Bool = 8,
    String = 9,
    Group = 10,
    Message = 11,
    Bytes = 12,
    UInt32 = 13,
    Enum = 14,
    SFixed32 = 15,
    SFixed64 = 16,
    SInt32 = 17,
    SInt64 = 18,
}

/// Представление значения в памяти; несколько типов поля делят одно
/// представление (например, int32, sint32 и sfixed32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    Bool,
    Enum,
    String,
    Bytes,
    Message,
}

/// Значение одиночного расширения.
#[derive(Debug, Clone)]
pub enum ExtensionValue {
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Enum(i32),
    String(String),
    Bytes(Vec<u8>),
    Message(Box<dyn Message>),
    Lazy(LazyMessage),
    Repeated(RepeatedValue),
}

/// Однородный контейнер повторяющегося расширения.
#[derive(Debug, Clone)]
pub enum RepeatedValue {
    Int32(GrowableArray<i32>),
    Int64(GrowableArray<i64>),
    UInt32(GrowableArray<u32>),
    UInt64(GrowableArray<u64>),
    Float(GrowableArray<f32>),
    Double(GrowableArray<f64>),
    Bool(GrowableArray<bool>),
    Enum(GrowableArray<i32>),
    String(Vec<String>),
    Bytes(Vec<Vec<u8>>),
    Message(Vec<Box<dyn Message>>),
}

/// Одна запись хранилища расширений.
pub struct Extension {
    field_type: FieldType,
    is_repeated: bool,
    is_packed: bool,
    is_cleared: bool,
    cached_size: AtomicUsize,
    descriptor: Option<Arc<ExtensionInfo>>,
    value: ExtensionValue,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl FieldType {
    /// Wire type неупакованного значения.
    pub const fn wire_type(self) -> WireType {
        match self {
            Self::Double | Self::Fixed64 | Self::SFixed64 => WireType::Fixed64,
            Self::Float | Self::Fixed32 | Self::SFixed32 => WireType::Fixed32,
            Self::Int64
            | Self::UInt64
            | Self::Int32
            | Self::Bool
            | Self::UInt32
            | Self::Enum
            | Self::SInt32
            | Self::SInt64 => WireType::Varint,
            Self::String | Self::Message | Self::Bytes => WireType::LengthDelimited,
            Self::Group => WireType::StartGroup,
        }
    }

    pub const fn value_kind(self) -> ValueKind {
        match self {
            Self::Int32 | Self::SInt32 | Self::SFixed32 => ValueKind::Int32,
            Self::Int64 | Self::SInt64 | Self::SFixed64 => ValueKind::Int64,
            Self::UInt32 | Self::Fixed32 => ValueKind::UInt32,
            Self::UInt64 | Self::Fixed64 => ValueKind::UInt64,
            Self::Float => ValueKind::Float,
            Self::Double => ValueKind::Double,
            Self::Bool => ValueKind::Bool,
            Self::Enum => ValueKind::Enum,
            Self::String => ValueKind::String,
            Self::Bytes => ValueKind::Bytes,
            Self::Message | Self::Group => ValueKind::Message,
        }
    }

    /// Может ли повторяющееся поле этого типа быть packed.
    pub const fn is_packable(self) -> bool {
        !matches!(
            self,
            Self::String | Self::Bytes | Self::Message | Self::Group
        )
    }
}

impl ExtensionValue {
    pub fn kind(&self) -> Option<ValueKind> {
        Some(match self {
            Self::Int32(_) => ValueKind::Int32,
            Self::Int64(_) => ValueKind::Int64,
            Self::UInt32(_) => ValueKind::UInt32,
            Self::UInt64(_) => ValueKind::UInt64,
            Self::Float(_) => ValueKind::Float,
            Self::Double(_) => ValueKind::Double,
            Self::Bool(_) => ValueKind::Bool,
            Self::Enum(_) => ValueKind::Enum,
            Self::String(_) => ValueKind::String,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Message(_) | Self::Lazy(_) => ValueKind::Message,
            Self::Repeated(_) => return None,
        })
    }
}

impl RepeatedValue {
    /// Пустой контейнер для данного представления.
    pub fn empty(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int32 => Self::Int32(GrowableArray::new()),
            ValueKind::Int64 => Self::Int64(GrowableArray::new()),
            ValueKind::UInt32 => Self::UInt32(GrowableArray::new()),
            ValueKind::UInt64 => Self::UInt64(GrowableArray::new()),
            ValueKind::Float => Self::Float(GrowableArray::new()),
            ValueKind::Double => Self::Double(GrowableArray::new()),
            ValueKind::Bool => Self::Bool(GrowableArray::new()),
            ValueKind::Enum => Self::Enum(GrowableArray::new()),
            ValueKind::String => Self::String(Vec::new()),
            ValueKind::Bytes => Self::Bytes(Vec::new()),
            ValueKind::Message => Self::Message(Vec::new()),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int32(_) => ValueKind::Int32,
            Self::Int64(_) => ValueKind::Int64,
            Self::UInt32(_) => ValueKind::UInt32,
            Self::UInt64(_) => ValueKind::UInt64,
            Self::Float(_) => ValueKind::Float,
            Self::Double(_) => ValueKind::Double,
            Self::Bool(_) => ValueKind::Bool,
            Self::Enum(_) => ValueKind::Enum,
            Self::String(_) => ValueKind::String,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Message(_) => ValueKind::Message,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Int32(v) | Self::Enum(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::UInt32(v) => v.len(),
            Self::UInt64(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Bytes(v) => v.len(),
            Self::Message(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    pub fn truncate(
        &mut self,
        len: usize,
    ) {
        match self {
            Self::Int32(v) | Self::Enum(v) => v.truncate(len),
            Self::Int64(v) => v.truncate(len),
            Self::UInt32(v) => v.truncate(len),
            Self::UInt64(v) => v.truncate(len),
            Self::Float(v) => v.truncate(len),
            Self::Double(v) => v.truncate(len),
            Self::Bool(v) => v.truncate(len),
            Self::String(v) => v.truncate(len),
            Self::Bytes(v) => v.truncate(len),
            Self::Message(v) => v.truncate(len),
        }
    }

    /// Удаляет последний элемент.
    ///
    /// # Panics
    /// Если контейнер пуст.
    pub fn remove_last(&mut self) {
        let len = self.len();
        assert!(len > 0, "remove_last on an empty repeated extension");
        self.truncate(len - 1);
    }

    pub fn swap_elements(
        &mut self,
        a: usize,
        b: usize,
    ) {
        match self {
            Self::Int32(v) | Self::Enum(v) => v.swap_elements(a, b),
            Self::Int64(v) => v.swap_elements(a, b),
            Self::UInt32(v) => v.swap_elements(a, b),
            Self::UInt64(v) => v.swap_elements(a, b),
            Self::Float(v) => v.swap_elements(a, b),
            Self::Double(v) => v.swap_elements(a, b),
            Self::Bool(v) => v.swap_elements(a, b),
            Self::String(v) => v.swap(a, b),
            Self::Bytes(v) => v.swap(a, b),
            Self::Message(v) => v.swap(a, b),
        }
    }

    /// Дописывает элементы другого контейнера того же представления.
    ///
    /// # Panics
    /// Если представления различаются.
    pub fn merge_from(
        &mut self,
        other: &RepeatedValue,
    ) {
        match (self, other) {
            (Self::Int32(a), Self::Int32(b)) | (Self::Enum(a), Self::Enum(b)) => a.merge_from(b),
            (Self::Int64(a), Self::Int64(b)) => a.merge_from(b),
            (Self::UInt32(a), Self::UInt32(b)) => a.merge_from(b),
            (Self::UInt64(a), Self::UInt64(b)) => a.merge_from(b),
            (Self::Float(a), Self::Float(b)) => a.merge_from(b),
            (Self::Double(a), Self::Double(b)) => a.merge_from(b),
            (Self::Bool(a), Self::Bool(b)) => a.merge_from(b),
            (Self::String(a), Self::String(b)) => a.extend_from_slice(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.extend_from_slice(b),
            (Self::Message(a), Self::Message(b)) => a.extend(b.iter().cloned()),
            (a, b) => panic!(
                "cannot merge repeated {:?} into {:?}",
                b.kind(),
                a.kind()
            ),
        }
    }
}

impl Extension {
    /// Одиночное расширение.
    ///
    /// # Panics
    /// Если представление `value` не соответствует `field_type`.
    pub fn singular(
        field_type: FieldType,
        value: ExtensionValue,
    ) -> Self {
        assert_eq!(
            value.kind(),
            Some(field_type.value_kind()),
            "value does not match field type {field_type:?}"
        );
        Self::with_value(field_type, false, false, value)
    }

    /// Пустое повторяющееся расширение.
    pub fn repeated(
        field_type: FieldType,
        is_packed: bool,
    ) -> Self {
        let value = ExtensionValue::Repeated(RepeatedValue::empty(field_type.value_kind()));
        Self::with_value(field_type, true, is_packed && field_type.is_packable(), value)
    }

    fn with_value(
        field_type: FieldType,
        is_repeated: bool,
        is_packed: bool,
        value: ExtensionValue,
    ) -> Self {
        Self {
            field_type,
            is_repeated,
            is_packed,
            is_cleared: false,
            cached_size: AtomicUsize::new(0),
            descriptor: None,
            value,
        }
    }

    pub fn with_descriptor(
        mut self,
        descriptor: Option<Arc<ExtensionInfo>>,
    ) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_repeated(&self) -> bool {
        self.is_repeated
    }

    pub fn is_packed(&self) -> bool {
        self.is_packed
    }

    /// Одиночное значение сброшено, но слот сохранён.
    pub fn is_cleared(&self) -> bool {
        self.is_cleared
    }

    pub fn descriptor(&self) -> Option<&Arc<ExtensionInfo>> {
        self.descriptor.as_ref()
    }

    pub fn value(&self) -> &ExtensionValue {
        &self.value
    }

    pub(crate) fn value_mut(&mut self) -> &mut ExtensionValue {
        &mut self.value
    }

    pub(crate) fn into_value(self) -> ExtensionValue {
        self.value
    }

    pub(crate) fn set_cleared(
        &mut self,
        cleared: bool,
    ) {
        self.is_cleared = cleared;
    }

    /// Присутствует ли значение.
    pub fn is_present(&self) -> bool {
        if self.is_repeated {
            self.len() > 0
        } else {
            !self.is_cleared
        }
    }

    /// Кол-во элементов: для одиночного 0 или 1.
    pub fn len(&self) -> usize {
        match &self.value {
            ExtensionValue::Repeated(r) => r.len(),
            _ if self.is_cleared => 0,
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn repeated_value(&self) -> Option<&RepeatedValue> {
        match &self.value {
            ExtensionValue::Repeated(r) => Some(r),
            _ => None,
        }
    }

    pub fn repeated_value_mut(&mut self) -> Option<&mut RepeatedValue> {
        match &mut self.value {
            ExtensionValue::Repeated(r) => Some(r),
            _ => None,
        }
    }

    /// Сбрасывает значение. Одиночное помечается как сброшенное,
    /// повторяющееся усекается до нуля; слот остаётся.
    pub fn clear(&mut self) {
        match &mut self.value {
            ExtensionValue::Repeated(r) => r.clear(),
            ExtensionValue::String(s) => {
                s.clear();
                self.is_cleared = true;
            }
            ExtensionValue::Bytes(b) => {
                b.clear();
                self.is_cleared = true;
            }
            ExtensionValue::Message(m) => {
                m.clear();
                self.is_cleared = true;
            }
            ExtensionValue::Lazy(lazy) => {
                lazy.clear();
                self.is_cleared = true;
            }
            _ => self.is_cleared = true,
        }
    }

    /// Сливает `other` в `self` по правилам типа: повторяющиеся
    /// конкатенируются, одиночные скаляры и строки перезаписываются,
    /// сообщения сливаются рекурсивно.
    ///
    /// # Panics
    /// Если тип или повторяемость различаются.
    pub fn merge_from(
        &mut self,
        other: &Extension,
    ) -> WireResult<()> {
        assert_eq!(
            (self.field_type.value_kind(), self.is_repeated),
            (other.field_type.value_kind(), other.is_repeated),
            "merging extensions of different types"
        );
        if self.descriptor.is_none() {
            self.descriptor = other.descriptor.clone();
        }
        if other.is_repeated {
            if let (ExtensionValue::Repeated(a), ExtensionValue::Repeated(b)) =
                (&mut self.value, &other.value)
            {
                a.merge_from(b);
            }
            return Ok(());
        }
        if other.is_cleared {
            return Ok(());
        }

        match (&mut self.value, &other.value) {
            (ExtensionValue::Lazy(a), ExtensionValue::Lazy(b)) => a.merge_from(b)?,
            (ExtensionValue::Lazy(a), ExtensionValue::Message(b)) => {
                a.get_mut().merge_from_dyn(b.as_ref())?
            }
            (ExtensionValue::Message(a), ExtensionValue::Lazy(b)) => a.merge_from_dyn(b.get())?,
            (ExtensionValue::Message(a), ExtensionValue::Message(b)) => {
                a.merge_from_dyn(b.as_ref())?
            }
            (slot, value) => *slot = value.clone(),
        }
        self.is_cleared = false;
        Ok(())
    }

    /// Размер, посчитанный последним вызовом сериализации или подсчёта
    /// размера (для packed - размер полезной нагрузки).
    pub fn cached_size(&self) -> usize {
        self.cached_size.load(Ordering::Relaxed)
    }

    pub(crate) fn set_cached_size(
        &self,
        size: usize,
    ) {
        self.cached_size.store(size, Ordering::Relaxed);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Clone for Extension {
    fn clone(&self) -> Self {
        Self {
            field_type: self.field_type,
            is_repeated: self.is_repeated,
            is_packed: self.is_packed,
            is_cleared: self.is_cleared,
            cached_size: AtomicUsize::new(self.cached_size()),
            descriptor: self.descriptor.clone(),
            value: self.value.clone(),
        }
    }
}

impl fmt::Debug for Extension {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Extension")
            .field("field_type", &self.field_type)
            .field("is_repeated", &self.is_repeated)
            .field("is_packed", &self.is_packed)
            .field("is_cleared", &self.is_cleared)
            .field("value", &self.value)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет соответствие типов поля wire type и представлению.
    #[test]
    fn test_field_type_mapping() {
        assert_eq!(FieldType::try_from(17u8).unwrap(), FieldType::SInt32);
        assert!(FieldType::try_from(19u8).is_err());
        assert_eq!(FieldType::SFixed64.wire_type(), WireType::Fixed64);
        assert_eq!(FieldType::Group.wire_type(), WireType::StartGroup);
        assert_eq!(FieldType::Fixed32.value_kind(), ValueKind::UInt32);
        assert!(!FieldType::Bytes.is_packable());
        assert!(FieldType::Enum.is_packable());
    }

    /// Тест проверяет семантику сброса одиночных и повторяющихся значений.
    #[test]
    fn test_clear_keeps_slot() {
        let mut single = Extension::singular(FieldType::Int32, ExtensionValue::Int32(5));
        assert!(single.is_present());
        single.clear();
        assert!(single.is_cleared());
        assert!(!single.is_present());
        assert_eq!(single.len(), 0);

        let mut rep = Extension::repeated(FieldType::Fixed32, true);
        if let Some(RepeatedValue::UInt32(v)) = rep.repeated_value_mut() {
            v.push(1);
            v.push(2);
        }
        assert_eq!(rep.len(), 2);
        rep.clear();
        assert_eq!(rep.len(), 0);
        assert!(!rep.is_cleared());
    }

    /// Тест проверяет слияние: повторяющиеся конкатенируются, скаляры
    /// перезаписываются, сброшенный источник ничего не меняет.
    #[test]
    fn test_merge_rules() {
        let mut a = Extension::repeated(FieldType::String, false);
        let mut b = Extension::repeated(FieldType::String, false);
        if let Some(RepeatedValue::String(v)) = a.repeated_value_mut() {
            v.push("x".into());
        }
        if let Some(RepeatedValue::String(v)) = b.repeated_value_mut() {
            v.push("y".into());
        }
        a.merge_from(&b).unwrap();
        assert_eq!(a.len(), 2);

        let mut x = Extension::singular(FieldType::Double, ExtensionValue::Double(1.0));
        let y = Extension::singular(FieldType::Double, ExtensionValue::Double(2.0));
        x.merge_from(&y).unwrap();
        assert!(matches!(x.value(), ExtensionValue::Double(v) if *v == 2.0));

        let mut cleared = y.clone();
        cleared.clear();
        x.merge_from(&cleared).unwrap();
        assert!(matches!(x.value(), ExtensionValue::Double(v) if *v == 2.0));
    }

    /// Тест проверяет, что packed сбрасывается для непакуемых типов.
    #[test]
    fn test_packed_only_for_packable() {
        assert!(Extension::repeated(FieldType::SInt64, true).is_packed());
        assert!(!Extension::repeated(FieldType::Bytes, true).is_packed());
    }

    /// Тест проверяет отказ при несовпадении значения и типа.
    #[test]
    #[should_panic(expected = "does not match field type")]
    fn test_singular_type_mismatch_panics() {
        let _ = Extension::singular(FieldType::Bool, ExtensionValue::Int32(1));
    }
}
