//! Курсор по последовательности порций с гарантированным запасом чтения.
//!
//! Порции из [`ChunkSource`] склеиваются в один логический поток. За
//! логическим концом текущего буфера (`end`) всегда доступно не меньше
//! [`SLOP_BYTES`] байт, поэтому тэг, varint и fixed32/64 читаются без
//! проверки границ на каждом байте. Когда позиция уходит за `end`, буфер
//! "переключается": хвост старого буфера и голова следующей порции
//! склеиваются в patch-буфере размером `2 * SLOP_BYTES`.
//!
//! Все позиции - индексы в текущем буфере (порция или patch). Лимит
//! хранится относительно `end`: `limit = позиция_лимита - end`.

use bytes::Bytes;
use pbwire_error::{WireError, WireResult};
use tracing::trace;

use super::ChunkSource;
use crate::wire::{decode_varint, decode_varint32};

/// Гарантированный запас байт за логическим концом буфера.
pub const SLOP_BYTES: usize = 16;

/// Максимальная длина length-delimited значения.
pub const MAX_LENGTH: usize = i32::MAX as usize - SLOP_BYTES;

const PATCH_LEN: usize = 2 * SLOP_BYTES;

// Больше этого заранее не резервируем: объявленной длине нельзя доверять.
const SAFE_RESERVE: usize = 50_000_000;

/// Откуда читается текущий буфер.
#[derive(Debug)]
enum Backing {
    Patch,
    Chunk(Bytes),
}

/// Что станет буфером после текущего.
#[derive(Debug)]
enum NextChunk {
    /// Следующий буфер собирается в patch.
    Patch,
    /// Большая порция, голова которой уже скопирована в patch.
    Chunk(Bytes),
    /// Источник исчерпан.
    Exhausted,
}

/// Чем закончился последний цикл разбора полей.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastTag {
    /// Достигнут лимит вложенного сообщения (или общий лимит размера)
    Limit,
    /// Поток закончился
    EndOfStream,
    /// Встречен тэг 0 или end-group
    Tag(u32),
}

/// Непрозрачный токен `push_limit`: разница с охватывающим лимитом.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a pushed limit must be popped"]
pub struct LimitToken(isize);

/// Курсор по порциям с гарантированным запасом чтения.
pub struct ChunkedByteCursor<'s> {
    source: Box<dyn ChunkSource + 's>,
    patch: [u8; PATCH_LEN],
    backing: Backing,
    pos: usize,
    end: usize,
    limit_end: usize,
    limit: isize,
    next_chunk: NextChunk,
    /// Размер последней порции из источника (0 после исчерпания)
    size: usize,
    /// Размер последней непустой порции
    last_chunk_len: usize,
    /// Сколько байт ещё можно тянуть из источника
    overall_limit: isize,
    last_tag: LastTag,
    poisoned: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<'s> ChunkedByteCursor<'s> {
    /// Создаёт курсор и забирает первую порцию.
    ///
    /// Порция не длиннее `SLOP_BYTES` копируется в хвост patch-буфера.
    /// `size_limit` ограничивает общий объём разбираемых данных.
    pub fn new(
        source: Box<dyn ChunkSource + 's>,
        size_limit: usize,
    ) -> Self {
        let size_limit = size_limit.min(i32::MAX as usize) as isize;
        let mut cursor = Self {
            source,
            patch: [0; PATCH_LEN],
            backing: Backing::Patch,
            pos: 0,
            end: 0,
            limit_end: 0,
            limit: size_limit,
            next_chunk: NextChunk::Patch,
            size: 0,
            last_chunk_len: 0,
            overall_limit: size_limit,
            last_tag: LastTag::Limit,
            poisoned: false,
        };

        match cursor.pull_chunk() {
            Some(chunk) if chunk.len() > SLOP_BYTES => {
                cursor.end = chunk.len() - SLOP_BYTES;
                cursor.backing = Backing::Chunk(chunk);
            }
            Some(chunk) => {
                cursor.pos = PATCH_LEN - chunk.len();
                cursor.patch[cursor.pos..].copy_from_slice(&chunk);
                cursor.end = SLOP_BYTES;
            }
            None => {
                cursor.overall_limit = 0;
                cursor.next_chunk = NextChunk::Exhausted;
            }
        }

        cursor.limit = size_limit - (cursor.end as isize - cursor.pos as isize);
        cursor.update_limit_end();
        cursor
    }

    /// `true`, если разбор текущего уровня закончен: достигнут лимит или
    /// конец потока.
    ///
    /// Если позиция ушла за логический конец буфера, буфер переключается.
    /// Выход за лимит или за конец потока - ошибка.
    pub fn done(
        &mut self,
        group_depth: i32,
    ) -> WireResult<bool> {
        self.check_usable();
        if self.pos < self.limit_end {
            return Ok(false);
        }

        let overrun = self.overrun();
        if overrun == self.limit {
            // Лимит совпал с позицией, но позиция за концом исчерпанного потока.
            if overrun > 0 && matches!(self.next_chunk, NextChunk::Exhausted) {
                return Err(self.fail(WireError::Truncated {
                    context: "end of stream",
                }));
            }
            return Ok(true);
        }
        self.done_fallback(overrun, group_depth)
    }

    fn done_fallback(
        &mut self,
        mut overrun: isize,
        group_depth: i32,
    ) -> WireResult<bool> {
        if overrun > self.limit {
            return Err(self.fail(WireError::LimitExceeded));
        }

        loop {
            let Some(p) = self.next_buffer(overrun as usize, group_depth) else {
                if overrun != 0 {
                    return Err(self.fail(WireError::Truncated {
                        context: "end of stream",
                    }));
                }
                self.limit_end = self.end;
                self.last_tag = LastTag::EndOfStream;
                return Ok(true);
            };

            self.limit -= (self.end - p) as isize;
            self.pos = p + overrun as usize;
            overrun = self.overrun();
            if overrun < 0 {
                break;
            }
        }

        self.update_limit_end();
        Ok(false)
    }

    /// Переключается на следующий буфер и возвращает индекс его начала.
    ///
    /// `None` - поток закончился и запас текущего буфера уже отдан.
    fn next_buffer(
        &mut self,
        overrun: usize,
        group_depth: i32,
    ) -> Option<usize> {
        match std::mem::replace(&mut self.next_chunk, NextChunk::Patch) {
            NextChunk::Exhausted => {
                self.next_chunk = NextChunk::Exhausted;
                return None;
            }
            NextChunk::Chunk(chunk) => {
                self.end = chunk.len() - SLOP_BYTES;
                self.backing = Backing::Chunk(chunk);
                trace!(end = self.end, "switched to chunk");
                return Some(0);
            }
            NextChunk::Patch => {}
        }

        // Запас старого буфера становится началом patch.
        match &self.backing {
            Backing::Patch => self
                .patch
                .copy_within(self.end..self.end + SLOP_BYTES, 0),
            Backing::Chunk(chunk) => self.patch[..SLOP_BYTES]
                .copy_from_slice(&chunk[self.end..self.end + SLOP_BYTES]),
        }
        self.backing = Backing::Patch;

        if self.overall_limit > 0
            && (group_depth < 0 || !self.parse_ends_in_slop_region(overrun, group_depth))
        {
            while let Some(chunk) = self.pull_chunk() {
                let size = chunk.len();
                if size > SLOP_BYTES {
                    self.patch[SLOP_BYTES..].copy_from_slice(&chunk[..SLOP_BYTES]);
                    self.next_chunk = NextChunk::Chunk(chunk);
                    self.end = SLOP_BYTES;
                    trace!(size, "patched head of large chunk");
                    return Some(0);
                } else if size > 0 {
                    self.patch[SLOP_BYTES..SLOP_BYTES + size].copy_from_slice(&chunk);
                    self.end = size;
                    trace!(size, "copied small chunk into patch");
                    return Some(0);
                }
            }
            self.overall_limit = 0;
        }

        self.next_chunk = NextChunk::Exhausted;
        self.end = SLOP_BYTES;
        self.size = 0;
        Some(0)
    }

    /// Разбирает поля, лежащие в запасе, и проверяет, заканчивается ли
    /// разбор внутри него (тэг 0 или end-group на глубине `depth`).
    fn parse_ends_in_slop_region(
        &self,
        overrun: usize,
        mut depth: i32,
    ) -> bool {
        let end = SLOP_BYTES;
        let mut ptr = overrun;

        while ptr < end {
            let Ok((tag, n)) = decode_varint32(&self.patch[ptr..]) else {
                return false;
            };
            ptr += n;
            if ptr > end {
                return false;
            }
            if tag == 0 {
                return true;
            }
            match tag & 7 {
                0 => match decode_varint(&self.patch[ptr..]) {
                    Ok((_, n)) => ptr += n,
                    Err(_) => return false,
                },
                1 => ptr += 8,
                2 => {
                    let Ok((size, n)) = decode_varint32(&self.patch[ptr..]) else {
                        return false;
                    };
                    ptr += n;
                    if size as usize > end.saturating_sub(ptr) {
                        return false;
                    }
                    ptr += size as usize;
                }
                3 => depth += 1,
                4 => {
                    depth -= 1;
                    if depth < 0 {
                        return true;
                    }
                }
                5 => ptr += 4,
                _ => return false,
            }
        }
        false
    }

    fn pull_chunk(&mut self) -> Option<Bytes> {
        let chunk = self.source.next_chunk()?;
        self.size = chunk.len();
        if !chunk.is_empty() {
            self.last_chunk_len = chunk.len();
        }
        self.overall_limit -= chunk.len() as isize;
        Some(chunk)
    }

    /// Переход к следующему буферу при массовом чтении.
    fn next(&mut self) -> WireResult<usize> {
        match self.next_buffer(0, -1) {
            Some(p) => {
                self.limit -= (self.end - p) as isize;
                self.update_limit_end();
                Ok(p)
            }
            None => {
                self.limit_end = self.end;
                self.last_tag = LastTag::EndOfStream;
                Err(self.fail(WireError::Truncated { context: "bytes" }))
            }
        }
    }

    /// Передаёт `size` байт в `out` (или пропускает их), пересекая границы
    /// порций.
    fn append_size(
        &mut self,
        mut size: usize,
        mut out: Option<&mut Vec<u8>>,
    ) -> WireResult<()> {
        let mut chunk_size = self.available();
        while size > chunk_size {
            if matches!(self.next_chunk, NextChunk::Exhausted) {
                return Err(self.fail(WireError::Truncated { context: "bytes" }));
            }
            if let Some(out) = out.as_deref_mut() {
                out.extend_from_slice(&self.buf()[self.pos..self.pos + chunk_size]);
            }
            self.pos += chunk_size;
            size -= chunk_size;

            if self.limit <= SLOP_BYTES as isize {
                return Err(self.fail(WireError::LimitExceeded));
            }
            let p = self.next()?;
            self.pos = p + SLOP_BYTES;
            chunk_size = self.available();
            if self.past_stream_end(size) {
                return Err(self.fail(WireError::Truncated { context: "bytes" }));
            }
        }

        if let Some(out) = out {
            out.extend_from_slice(&self.buf()[self.pos..self.pos + size]);
        }
        self.pos += size;
        Ok(())
    }

    /// Пропускает `n` байт.
    pub fn skip(
        &mut self,
        n: usize,
    ) -> WireResult<()> {
        self.check_range(n)?;
        if n <= self.available() {
            self.pos += n;
            return Ok(());
        }
        self.append_size(n, None)
    }

    /// Читает `n` байт.
    ///
    /// Если диапазон лежит внутри одной порции, возвращается её срез без
    /// копирования.
    pub fn read_bytes(
        &mut self,
        n: usize,
    ) -> WireResult<Bytes> {
        self.check_range(n)?;
        if n <= self.available() {
            let out = match &self.backing {
                Backing::Chunk(chunk) => chunk.slice(self.pos..self.pos + n),
                Backing::Patch => Bytes::copy_from_slice(&self.patch[self.pos..self.pos + n]),
            };
            self.pos += n;
            return Ok(out);
        }

        let mut out = Vec::new();
        self.read_fallback(n, &mut out)?;
        Ok(Bytes::from(out))
    }

    /// Читает `n` байт в `out`, заменяя его содержимое.
    pub fn read_into(
        &mut self,
        n: usize,
        out: &mut Vec<u8>,
    ) -> WireResult<()> {
        out.clear();
        self.append_into(n, out)
    }

    /// Дописывает `n` байт в конец `out`.
    pub fn append_into(
        &mut self,
        n: usize,
        out: &mut Vec<u8>,
    ) -> WireResult<()> {
        self.check_range(n)?;
        if n <= self.available() {
            out.extend_from_slice(&self.buf()[self.pos..self.pos + n]);
            self.pos += n;
            return Ok(());
        }
        self.read_fallback(n, out)
    }

    fn read_fallback(
        &mut self,
        n: usize,
        out: &mut Vec<u8>,
    ) -> WireResult<()> {
        if (n as isize) <= -self.overrun() + self.limit {
            out.reserve(n.min(SAFE_RESERVE));
        }
        self.append_size(n, Some(out))
    }

    /// Читает varint (до 10 байт).
    pub fn read_varint64(&mut self) -> WireResult<u64> {
        self.check_usable();
        match decode_varint(self.window()) {
            Ok((value, n)) => {
                self.pos += n;
                Ok(value)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Читает varint не длиннее 5 байт (тэги и длины).
    pub fn read_varint32(&mut self) -> WireResult<u32> {
        self.check_usable();
        match decode_varint32(self.window()) {
            Ok((value, n)) => {
                self.pos += n;
                Ok(value)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub fn read_fixed32(&mut self) -> WireResult<u32> {
        let bytes = self.read_array::<4>("fixed32")?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_fixed64(&mut self) -> WireResult<u64> {
        let bytes = self.read_array::<8>("fixed64")?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn read_array<const N: usize>(
        &mut self,
        context: &'static str,
    ) -> WireResult<[u8; N]> {
        self.check_usable();
        let bytes = self
            .window()
            .get(..N)
            .and_then(|s| <[u8; N]>::try_from(s).ok());
        match bytes {
            Some(bytes) => {
                self.pos += N;
                Ok(bytes)
            }
            None => Err(self.fail(WireError::Truncated { context })),
        }
    }

    /// Устанавливает лимит в `n` байт от текущей позиции.
    ///
    /// Новый лимит не может выходить за охватывающий.
    pub fn push_limit(
        &mut self,
        n: usize,
    ) -> WireResult<LimitToken> {
        self.check_usable();
        debug_assert!(n <= MAX_LENGTH);
        let new_limit = n as isize + self.overrun();
        let delta = self.limit - new_limit;
        if delta < 0 {
            return Err(self.fail(WireError::LimitExceeded));
        }
        self.limit = new_limit;
        self.update_limit_end();
        Ok(LimitToken(delta))
    }

    /// Восстанавливает охватывающий лимит.
    ///
    /// Ошибка, если разбор закончился не ровно на лимите.
    pub fn pop_limit(
        &mut self,
        token: LimitToken,
    ) -> WireResult<()> {
        self.limit += token.0;
        if !self.ended_at_limit() {
            return Err(self.fail(WireError::UnterminatedMessage));
        }
        self.update_limit_end();
        Ok(())
    }

    pub fn set_last_tag(
        &mut self,
        tag: u32,
    ) {
        self.last_tag = LastTag::Tag(tag);
    }

    pub fn last_tag(&self) -> LastTag {
        self.last_tag
    }

    pub fn ended_at_limit(&self) -> bool {
        self.last_tag == LastTag::Limit
    }

    pub fn ended_at_end_of_stream(&self) -> bool {
        self.last_tag == LastTag::EndOfStream
    }

    /// Проверяет, что последний тэг - end-group для `start_tag`, и
    /// сбрасывает маркер.
    pub fn consume_end_group(
        &mut self,
        start_tag: u32,
    ) -> bool {
        let matched = self.last_tag == LastTag::Tag(start_tag + 1);
        self.last_tag = LastTag::Limit;
        matched
    }

    /// Возвращает источнику всё, что было вытянуто, но не прочитано.
    pub fn back_up_unconsumed(&mut self) {
        let count = match self.next_chunk {
            NextChunk::Patch => self.available() as isize,
            _ => self.size as isize + self.end as isize - self.pos as isize,
        };
        let count = count.min(self.last_chunk_len as isize);
        if count > 0 {
            self.source.back_up(count as usize);
            self.overall_limit += count;
        }
    }

    /// Байты, доступные для чтения без проверки границ.
    ///
    /// После `done() == false` их не меньше `SLOP_BYTES`.
    pub fn lookahead(&self) -> &[u8] {
        let start = self.pos.min(self.end + SLOP_BYTES);
        &self.buf()[start..self.end + SLOP_BYTES]
    }

    /// Сколько байт уже выдал источник.
    pub fn source_byte_count(&self) -> u64 {
        self.source.byte_count()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Помечает курсор как непригодный и возвращает ошибку.
    pub(crate) fn fail(
        &mut self,
        err: WireError,
    ) -> WireError {
        self.poisoned = true;
        err
    }

    /// Проверяет, что `n` байт от позиции не выходят за лимит и за уже
    /// известный конец потока.
    fn check_range(
        &mut self,
        n: usize,
    ) -> WireResult<()> {
        self.check_usable();
        if n as isize > self.limit - self.overrun() {
            return Err(self.fail(WireError::LimitExceeded));
        }
        if self.past_stream_end(n) {
            return Err(self.fail(WireError::Truncated { context: "bytes" }));
        }
        Ok(())
    }

    fn past_stream_end(
        &self,
        n: usize,
    ) -> bool {
        matches!(self.next_chunk, NextChunk::Exhausted) && self.pos + n > self.end
    }

    fn check_usable(&self) {
        debug_assert!(!self.poisoned, "cursor used after a parse failure");
    }

    fn buf(&self) -> &[u8] {
        match &self.backing {
            Backing::Patch => &self.patch,
            Backing::Chunk(chunk) => chunk,
        }
    }

    /// Читаемые байты от позиции до конца запаса.
    fn window(&self) -> &[u8] {
        self.buf()
            .get(self.pos..self.end + SLOP_BYTES)
            .unwrap_or(&[])
    }

    fn available(&self) -> usize {
        (self.end + SLOP_BYTES).saturating_sub(self.pos)
    }

    fn overrun(&self) -> isize {
        self.pos as isize - self.end as isize
    }

    fn update_limit_end(&mut self) {
        self.limit_end = (self.end as isize + self.limit.min(0)).max(0) as usize;
    }
}

impl std::fmt::Debug for ChunkedByteCursor<'_> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ChunkedByteCursor")
            .field("backing", &self.backing)
            .field("pos", &self.pos)
            .field("end", &self.end)
            .field("limit", &self.limit)
            .field("next_chunk", &self.next_chunk)
            .field("last_tag", &self.last_tag)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
