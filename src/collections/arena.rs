//! Дескриптор внешней арены.
//!
//! Арена - внешний коллаборатор с семантикой массового освобождения.
//! Память массивов всегда остаётся в куче; арена ведёт только учёт
//! выделенных и возвращённых байт, чтобы вызывающий код мог оценивать
//! потребление по группе объектов.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// Разделяемый дескриптор арены. Клоны ссылаются на одну и ту же арену.
#[derive(Clone, Default)]
pub struct Arena {
    inner: Arc<ArenaStats>,
}

#[derive(Default)]
struct ArenaStats {
    allocated: AtomicUsize,
    reclaimed: AtomicUsize,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Учитывает выделение `bytes` байт.
    pub fn record_alloc(
        &self,
        bytes: usize,
    ) {
        self.inner.allocated.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Учитывает блок, возвращённый арене для повторного использования.
    pub fn record_reclaim(
        &self,
        bytes: usize,
    ) {
        self.inner.reclaimed.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Всего выделено байт.
    pub fn space_allocated(&self) -> usize {
        self.inner.allocated.load(Ordering::Relaxed)
    }

    /// Всего возвращено байт.
    pub fn space_reclaimed(&self) -> usize {
        self.inner.reclaimed.load(Ordering::Relaxed)
    }

    /// Живые байты: выделено минус возвращено.
    pub fn space_used(&self) -> usize {
        self.space_allocated()
            .saturating_sub(self.space_reclaimed())
    }

    /// Один и тот же экземпляр арены.
    pub fn same_as(
        &self,
        other: &Arena,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Arena {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.same_as(other)
    }
}

impl Eq for Arena {}

impl fmt::Debug for Arena {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Arena")
            .field("allocated", &self.space_allocated())
            .field("reclaimed", &self.space_reclaimed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет учёт байт и идентичность клонов.
    #[test]
    fn test_accounting_and_identity() {
        let arena = Arena::new();
        let clone = arena.clone();
        clone.record_alloc(64);
        arena.record_reclaim(16);

        assert_eq!(arena.space_allocated(), 64);
        assert_eq!(arena.space_used(), 48);
        assert_eq!(arena, clone);
        assert_ne!(arena, Arena::new());
    }
}
