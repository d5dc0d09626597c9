//! `GrowableArray<T>` - непрерывный растущий массив элементов одного типа
//! с учётом владения ареной.
//!
//! # Политика роста
//! При переполнении новая ёмкость равна `max(2 * старая + HEADER/size_of(T),
//! запрошенная)`. Самое маленькое выделение вмещает не меньше
//! `HEADER_BYTES / size_of(T)` элементов (минимум 1), верхняя граница
//! защищает арифметику ёмкости от переполнения.
//!
//! # Владение
//! Хранилище всегда в куче. Массив с [`Ownership::Arena`] отражает свои
//! выделения и возвраты в учёте арены. Обмен массивов из разных доменов
//! перемещает элементы, но каждый массив сохраняет свой тег владения.

use std::{
    fmt,
    mem,
    ops::{Index, IndexMut},
    slice,
};

use super::Arena;

/// Размер заголовка выделения, учитываемый политикой роста.
pub const HEADER_BYTES: usize = 8;

// Верхняя граница байтового размера хранилища.
const MAX_BYTES: usize = i32::MAX as usize;

/// Кто владеет хранилищем массива.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Ownership {
    #[default]
    Owned,
    Arena(Arena),
}

/// Растущий массив элементов фиксированного размера.
pub struct GrowableArray<T> {
    data: Vec<T>,
    ownership: Ownership,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<T> GrowableArray<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            ownership: Ownership::Owned,
        }
    }

    /// Пустой массив, чьи выделения учитываются в `arena`.
    pub fn with_arena(arena: Arena) -> Self {
        Self {
            data: Vec::new(),
            ownership: Ownership::Arena(arena),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut array = Self::new();
        array.reserve(capacity);
        array
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    pub fn arena(&self) -> Option<&Arena> {
        match &self.ownership {
            Ownership::Owned => None,
            Ownership::Arena(arena) => Some(arena),
        }
    }

    #[inline]
    pub fn get(
        &self,
        index: usize,
    ) -> Option<&T> {
        self.data.get(index)
    }

    #[inline]
    pub fn get_mut(
        &mut self,
        index: usize,
    ) -> Option<&mut T> {
        self.data.get_mut(index)
    }

    /// Заменяет элемент.
    ///
    /// # Panics
    /// Если `index >= len`.
    pub fn set(
        &mut self,
        index: usize,
        value: T,
    ) {
        self.check_index(index);
        self.data[index] = value;
    }

    /// Добавляет элемент в конец.
    #[inline]
    pub fn push(
        &mut self,
        value: T,
    ) {
        if self.data.len() == self.data.capacity() {
            self.grow(self.data.len() + 1);
        }
        self.data.push(value);
    }

    /// Удаляет и возвращает последний элемент.
    ///
    /// # Panics
    /// Если массив пуст.
    pub fn remove_last(&mut self) -> T {
        match self.data.pop() {
            Some(value) => value,
            None => panic!("remove_last on an empty GrowableArray"),
        }
    }

    /// Укорачивает массив до `new_len` элементов.
    ///
    /// # Panics
    /// Если `new_len > len`.
    pub fn truncate(
        &mut self,
        new_len: usize,
    ) {
        assert!(
            new_len <= self.data.len(),
            "truncate to {new_len} beyond length {}",
            self.data.len()
        );
        self.data.truncate(new_len);
    }

    /// Гарантирует ёмкость не меньше `new_capacity` (общую, не
    /// дополнительную).
    pub fn reserve(
        &mut self,
        new_capacity: usize,
    ) {
        if new_capacity > self.data.capacity() {
            self.grow(new_capacity);
        }
    }

    /// Обменивает содержимое двух массивов.
    ///
    /// Элементы перемещаются, теги владения остаются на месте; учёт арен
    /// переносится вместе с хранилищем.
    pub fn swap(
        &mut self,
        other: &mut Self,
    ) {
        let (mine, theirs) = (self.footprint(), other.footprint());
        mem::swap(&mut self.data, &mut other.data);
        if self.ownership != other.ownership {
            if let Some(arena) = self.arena() {
                arena.record_reclaim(mine);
                arena.record_alloc(theirs);
            }
            if let Some(arena) = other.arena() {
                arena.record_reclaim(theirs);
                arena.record_alloc(mine);
            }
        }
    }

    /// Обмен массивов одной арены без пересчёта учёта.
    ///
    /// # Panics
    /// Если массивы принадлежат разным доменам владения.
    pub fn swap_same_arena(
        &mut self,
        other: &mut Self,
    ) {
        assert_eq!(
            self.ownership, other.ownership,
            "swap_same_arena across ownership domains"
        );
        mem::swap(&mut self.data, &mut other.data);
    }

    /// Меняет местами два элемента.
    pub fn swap_elements(
        &mut self,
        a: usize,
        b: usize,
    ) {
        self.check_index(a);
        self.check_index(b);
        self.data.swap(a, b);
    }

    /// Удаляет все элементы, ёмкость сохраняется.
    ///
    /// Для типов без drop glue деструкторы не вызываются.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Извлекает `count` элементов начиная с `start`, сдвигая хвост.
    pub fn extract_subrange(
        &mut self,
        start: usize,
        count: usize,
    ) -> Vec<T> {
        assert!(
            start + count <= self.data.len(),
            "subrange {start}..{} out of range for length {}",
            start + count,
            self.data.len()
        );
        self.data.drain(start..start + count).collect()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.data.iter_mut()
    }

    /// Байты хранилища без учёта самой структуры.
    pub fn space_used_excluding_self(&self) -> usize {
        self.footprint()
    }

    /// Новая ёмкость по политике роста.
    pub fn calculate_new_capacity(
        old_capacity: usize,
        requested: usize,
    ) -> usize {
        let lower = Self::min_capacity();
        if requested < lower {
            return lower;
        }
        let max = Self::max_capacity();
        let doubled = old_capacity
            .checked_mul(2)
            .and_then(|d| d.checked_add(HEADER_BYTES / Self::elem_size()))
            .unwrap_or(max)
            .min(max);
        doubled.max(requested)
    }

    fn grow(
        &mut self,
        requested: usize,
    ) {
        assert!(
            requested <= Self::max_capacity(),
            "GrowableArray capacity overflow: {requested}"
        );
        let old_footprint = self.footprint();
        let new_capacity = Self::calculate_new_capacity(self.data.capacity(), requested);
        self.data.reserve_exact(new_capacity - self.data.len());

        if let Some(arena) = self.arena() {
            if old_footprint > 0 {
                arena.record_reclaim(old_footprint);
            }
            arena.record_alloc(self.footprint());
        }
    }

    fn footprint(&self) -> usize {
        if self.data.capacity() == 0 {
            0
        } else {
            HEADER_BYTES + self.data.capacity() * mem::size_of::<T>()
        }
    }

    // ZST считаются размером 1 байт.
    fn elem_size() -> usize {
        mem::size_of::<T>().max(1)
    }

    fn min_capacity() -> usize {
        (HEADER_BYTES / Self::elem_size()).max(1)
    }

    fn max_capacity() -> usize {
        (MAX_BYTES - HEADER_BYTES) / Self::elem_size()
    }

    #[inline]
    fn check_index(
        &self,
        index: usize,
    ) {
        assert!(
            index < self.data.len(),
            "index {index} out of range for GrowableArray of length {}",
            self.data.len()
        );
    }
}

impl<T: Clone> GrowableArray<T> {
    /// Добавляет `n` копий `value`.
    pub fn add_n(
        &mut self,
        value: T,
        n: usize,
    ) {
        self.reserve(self.data.len() + n);
        self.data.extend(std::iter::repeat(value).take(n));
    }

    /// Меняет длину, дополняя копиями `value`.
    pub fn resize(
        &mut self,
        new_len: usize,
        value: T,
    ) {
        self.reserve(new_len);
        self.data.resize(new_len, value);
    }

    pub fn extend_from_slice(
        &mut self,
        values: &[T],
    ) {
        self.reserve(self.data.len() + values.len());
        self.data.extend_from_slice(values);
    }

    /// Дописывает элементы `other` в конец.
    pub fn merge_from(
        &mut self,
        other: &GrowableArray<T>,
    ) {
        self.extend_from_slice(&other.data);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl<T> Default for GrowableArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for GrowableArray<T> {
    /// Копия всегда владеет своим хранилищем.
    fn clone(&self) -> Self {
        let mut array = Self::new();
        array.extend_from_slice(&self.data);
        array
    }
}

impl<T: fmt::Debug> fmt::Debug for GrowableArray<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_list().entries(self.data.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for GrowableArray<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.data == other.data
    }
}

impl<T> Index<usize> for GrowableArray<T> {
    type Output = T;

    fn index(
        &self,
        index: usize,
    ) -> &T {
        self.check_index(index);
        &self.data[index]
    }
}

impl<T> IndexMut<usize> for GrowableArray<T> {
    fn index_mut(
        &mut self,
        index: usize,
    ) -> &mut T {
        self.check_index(index);
        &mut self.data[index]
    }
}

impl<T> Extend<T> for GrowableArray<T> {
    fn extend<I: IntoIterator<Item = T>>(
        &mut self,
        iter: I,
    ) {
        for value in iter {
            self.push(value);
        }
    }
}

impl<T> FromIterator<T> for GrowableArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut array = Self::new();
        array.extend(iter);
        array
    }
}

impl<'a, T> IntoIterator for &'a GrowableArray<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl<T> IntoIterator for GrowableArray<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
