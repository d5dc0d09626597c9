//! Источники байт для потокового декодера.
//!
//! Декодер тянет данные порциями (chunk) по требованию и может вернуть
//! непрочитанный хвост последней порции обратно источнику (`back_up`), чтобы
//! вызывающий код продолжил чтение с точного места окончания сообщения.

use std::{
    collections::VecDeque,
    io::{self, Read},
};

use bytes::{Bytes, BytesMut};
use tracing::trace;

/// Размер порции по умолчанию для [`ReaderSource`].
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Pull-источник порций байт.
pub trait ChunkSource {
    /// Следующая порция. `None` означает конец потока. Пустые порции
    /// допустимы.
    fn next_chunk(&mut self) -> Option<Bytes>;

    /// Возвращает последние `count` байт последней выданной порции.
    ///
    /// `count` не может превышать длину последней порции.
    fn back_up(
        &mut self,
        count: usize,
    );

    /// Сколько байт выдано на данный момент (за вычетом возвращённых).
    fn byte_count(&self) -> u64;
}

/// Источник поверх одного `Bytes`, опционально нарезанного на порции
/// фиксированного размера.
#[derive(Debug, Clone)]
pub struct BytesSource {
    data: Bytes,
    pos: usize,
    chunk_size: usize,
    last_len: usize,
}

/// Источник поверх заранее известного списка порций.
#[derive(Debug, Clone, Default)]
pub struct ChunkListSource {
    chunks: VecDeque<Bytes>,
    last: Bytes,
    count: u64,
}

/// Источник поверх любого `std::io::Read`.
///
/// Ошибка ввода-вывода завершает поток; её можно забрать через
/// [`ReaderSource::take_error`] после разбора.
#[derive(Debug)]
pub struct ReaderSource<R: Read> {
    reader: R,
    chunk_size: usize,
    pending: Option<Bytes>,
    last: Bytes,
    count: u64,
    error: Option<io::Error>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl BytesSource {
    /// Весь буфер одной порцией.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let chunk_size = data.len().max(1);
        Self {
            data,
            pos: 0,
            chunk_size,
            last_len: 0,
        }
    }

    /// Буфер порциями по `chunk_size` байт (минимум 1).
    pub fn chunked(
        data: impl Into<Bytes>,
        chunk_size: usize,
    ) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            chunk_size: chunk_size.max(1),
            last_len: 0,
        }
    }

    /// Кол-во ещё не выданных байт.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl ChunkListSource {
    pub fn new<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            last: Bytes::new(),
            count: 0,
        }
    }
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(
        reader: R,
        chunk_size: usize,
    ) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            pending: None,
            last: Bytes::new(),
            count: 0,
            error: None,
        }
    }

    /// Забирает ошибку чтения, если она была.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// Возвращает внутренний reader.
    ///
    /// Данные, возвращённые через `back_up` и ещё не выданные, теряются.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

////////////////////////////////////////////////////////////////////////////////
// Реализация ChunkSource
////////////////////////////////////////////////////////////////////////////////

impl ChunkSource for BytesSource {
    fn next_chunk(&mut self) -> Option<Bytes> {
        if self.pos >= self.data.len() {
            return None;
        }
        let end = (self.pos + self.chunk_size).min(self.data.len());
        let chunk = self.data.slice(self.pos..end);
        self.last_len = chunk.len();
        self.pos = end;
        Some(chunk)
    }

    fn back_up(
        &mut self,
        count: usize,
    ) {
        assert!(
            count <= self.last_len,
            "back_up({count}) exceeds last chunk of {} bytes",
            self.last_len
        );
        self.pos -= count;
        self.last_len -= count;
    }

    fn byte_count(&self) -> u64 {
        self.pos as u64
    }
}

impl ChunkSource for ChunkListSource {
    fn next_chunk(&mut self) -> Option<Bytes> {
        let chunk = self.chunks.pop_front()?;
        self.count += chunk.len() as u64;
        if !chunk.is_empty() {
            self.last = chunk.clone();
        }
        Some(chunk)
    }

    fn back_up(
        &mut self,
        count: usize,
    ) {
        assert!(count <= self.last.len(), "back_up past last chunk");
        if count == 0 {
            return;
        }
        let tail = self.last.split_off(self.last.len() - count);
        self.count -= count as u64;
        self.chunks.push_front(tail);
    }

    fn byte_count(&self) -> u64 {
        self.count
    }
}

impl<R: Read> ChunkSource for ReaderSource<R> {
    fn next_chunk(&mut self) -> Option<Bytes> {
        if let Some(pending) = self.pending.take() {
            self.count += pending.len() as u64;
            self.last = pending.clone();
            return Some(pending);
        }
        if self.error.is_some() {
            return None;
        }

        let mut buf = BytesMut::zeroed(self.chunk_size);
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return None,
                Ok(n) => {
                    buf.truncate(n);
                    let chunk = buf.freeze();
                    self.count += n as u64;
                    self.last = chunk.clone();
                    trace!(bytes = n, total = self.count, "pulled chunk from reader");
                    return Some(chunk);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.error = Some(e);
                    return None;
                }
            }
        }
    }

    fn back_up(
        &mut self,
        count: usize,
    ) {
        assert!(count <= self.last.len(), "back_up past last chunk");
        if count == 0 {
            return;
        }
        let tail = self.last.split_off(self.last.len() - count);
        self.count -= count as u64;
        self.pending = Some(tail);
    }

    fn byte_count(&self) -> u64 {
        self.count
    }
}

impl<S: ChunkSource + ?Sized> ChunkSource for &mut S {
    fn next_chunk(&mut self) -> Option<Bytes> {
        (**self).next_chunk()
    }

    fn back_up(
        &mut self,
        count: usize,
    ) {
        (**self).back_up(count)
    }

    fn byte_count(&self) -> u64 {
        (**self).byte_count()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn drain(source: &mut impl ChunkSource) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = source.next_chunk() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    /// Тест проверяет нарезку буфера на порции.
    #[test]
    fn test_bytes_source_chunked() {
        let mut src = BytesSource::chunked(vec![1u8, 2, 3, 4, 5], 2);
        assert_eq!(src.next_chunk().unwrap(), Bytes::from_static(&[1, 2]));
        assert_eq!(src.next_chunk().unwrap(), Bytes::from_static(&[3, 4]));
        assert_eq!(src.next_chunk().unwrap(), Bytes::from_static(&[5]));
        assert!(src.next_chunk().is_none());
        assert_eq!(src.byte_count(), 5);
    }

    /// Тест проверяет, что back_up возвращает хвост в поток.
    #[test]
    fn test_back_up_returns_tail() {
        let mut src = BytesSource::chunked(vec![1u8, 2, 3, 4], 3);
        let _ = src.next_chunk();
        src.back_up(1);
        assert_eq!(src.byte_count(), 2);
        assert_eq!(drain(&mut src), vec![3, 4]);

        let mut list = ChunkListSource::new(vec![vec![1u8, 2, 3], vec![4]]);
        let _ = list.next_chunk();
        list.back_up(2);
        assert_eq!(list.byte_count(), 1);
        assert_eq!(drain(&mut list), vec![2, 3, 4]);
    }

    /// Тест проверяет чтение из `Read` и возврат хвоста.
    #[test]
    fn test_reader_source() {
        let mut src = ReaderSource::with_chunk_size(Cursor::new(vec![9u8; 10]), 4);
        assert_eq!(src.next_chunk().unwrap().len(), 4);
        src.back_up(3);
        assert_eq!(src.next_chunk().unwrap().len(), 3);
        assert_eq!(drain(&mut src).len(), 6);
        assert_eq!(src.byte_count(), 10);
        assert!(src.take_error().is_none());
    }

    /// Тест проверяет, что ошибка чтения завершает поток и сохраняется.
    #[test]
    fn test_reader_error_is_kept() {
        struct Failing;
        impl Read for Failing {
            fn read(
                &mut self,
                _buf: &mut [u8],
            ) -> io::Result<usize> {
                Err(io::Error::other("disk on fire"))
            }
        }

        let mut src = ReaderSource::new(Failing);
        assert!(src.next_chunk().is_none());
        assert!(src.take_error().is_some());
    }

    /// Тест проверяет, что back_up больше последней порции паникует.
    #[test]
    #[should_panic(expected = "exceeds last chunk")]
    fn test_back_up_too_far_panics() {
        let mut src = BytesSource::new(vec![1u8, 2]);
        let _ = src.next_chunk();
        src.back_up(3);
    }
}
