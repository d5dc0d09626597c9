use std::io::{self, Cursor, Read};

use pbwire::{
    codec::merge_from_session, encode_to_vec, merge_from_reader, ErrorExt, ParseOptions,
    ParseSession, RawMessage, StatusCode, WireError,
};

mod common;
use common::{chunked, split_at, Person};

fn parse_from(
    source: impl pbwire::ChunkSource,
    options: &ParseOptions,
) -> Result<Person, WireError> {
    let mut person = Person::default();
    let mut session = ParseSession::new(source, options);
    merge_from_session(&mut person, &mut session)?;
    Ok(person)
}

/// Тест проверяет, что результат не зависит от разбиения на порции:
/// все размеры порций и все разрезы на три части.
#[test]
fn test_chunking_transparency() {
    let person = Person::sample();
    let data = encode_to_vec(&person);
    let options = ParseOptions::default();

    for size in 1..=data.len() {
        assert_eq!(parse_from(chunked(&data, size), &options).unwrap(), person, "chunk size {size}");
    }
    for first in 0..=data.len() {
        for second in first..=data.len() {
            assert_eq!(
                parse_from(split_at(&data, first, second), &options).unwrap(),
                person,
                "split at {first}/{second}"
            );
        }
    }
}

/// Тест проверяет разбор из `Read` с маленькими порциями.
#[test]
fn test_reader_source_small_chunks() {
    let person = Person::nested(20);
    let data = encode_to_vec(&person);
    for chunk_size in [1, 2, 3, 7, 64] {
        let mut parsed = Person::default();
        merge_from_reader(&mut parsed, Cursor::new(&data), chunk_size, &ParseOptions::default())
            .unwrap();
        assert_eq!(parsed, person);
    }
}

/// Тест проверяет отказ на любом префиксе, обрывающем вложенное
/// сообщение.
#[test]
fn test_truncated_nested_message() {
    let person = Person {
        child: Some(Box::new(Person::sample())),
        ..Default::default()
    };
    let data = encode_to_vec(&person);
    for len in 1..data.len() {
        let result = parse_from(chunked(&data[..len], 3), &ParseOptions::default());
        assert!(result.is_err(), "prefix of {len} bytes was accepted");
    }
}

/// Тест проверяет отказ на обрезанных вложенных группах.
#[test]
fn test_truncated_nested_groups() {
    let data = encode_to_vec(&Person::nested_groups(4));
    for len in 1..data.len() {
        let err = parse_from(chunked(&data[..len], 1), &ParseOptions::default()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::Truncated, "prefix of {len} bytes");
    }
}

/// Тест проверяет предел глубины для сообщений и групп.
#[test]
fn test_recursion_limit() {
    for person in [Person::nested(10), Person::nested_groups(10)] {
        let data = encode_to_vec(&person);
        let exact = ParseOptions::default().with_max_depth(10);
        assert_eq!(parse_from(chunked(&data, 4), &exact).unwrap(), person);

        let tight = ParseOptions::default().with_max_depth(9);
        let err = parse_from(chunked(&data, 4), &tight).unwrap_err();
        assert_eq!(err, WireError::RecursionLimit { max: 9 });
        assert!(err.is_resource_exhaustion());
    }
}

/// Тест проверяет, что глубокая вложенность не переполняет стек при
/// пределе по умолчанию.
#[test]
fn test_default_depth_limit_rejects_deep_input() {
    let data = encode_to_vec(&Person::nested(101));
    let err = parse_from(chunked(&data, 16), &ParseOptions::default()).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::DepthLimit);
}

/// Тест проверяет общий лимит размера, попадающий на границу поля.
#[test]
fn test_size_limit() {
    let person = Person {
        id: 1,
        name: "abcdef".to_string(),
        ..Default::default()
    };
    let data = encode_to_vec(&person);
    // первое поле занимает 2 байта
    let options = ParseOptions::default().with_size_limit(2);
    let err = parse_from(chunked(&data, 5), &options).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::SizeLimit);

    let options = ParseOptions::default().with_size_limit(data.len());
    assert_eq!(parse_from(chunked(&data, 5), &options).unwrap(), person);
}

/// Тест проверяет, что пустой вход даёт пустое сообщение.
#[test]
fn test_empty_input() {
    let parsed = parse_from(chunked(&[], 1), &ParseOptions::default()).unwrap();
    assert_eq!(parsed, Person::default());
}

/// Тест проверяет окончание на тэге 0 при отслеживании окончания.
#[test]
fn test_zero_tag_ending() {
    let mut data = encode_to_vec(&Person::sample());
    data.extend_from_slice(&[0x00, 0xFF, 0xFF]);

    let tracked = ParseOptions::default().with_track_correct_ending(true);
    assert_eq!(parse_from(chunked(&data, 2), &tracked).unwrap(), Person::sample());

    let err = parse_from(chunked(&data, 2), &ParseOptions::default()).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::UnterminatedMessage);
}

/// Источник, который после нескольких байт возвращает ошибку ввода-вывода.
struct FailingReader {
    data: Vec<u8>,
    pos: usize,
    fail_at: usize,
}

impl Read for FailingReader {
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        if self.pos >= self.fail_at {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "link down"));
        }
        let end = (self.pos + buf.len()).min(self.fail_at).min(self.data.len());
        let n = end - self.pos;
        buf[..n].copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(n)
    }
}

/// Тест проверяет, что ошибка чтения всплывает как ошибка ввода-вывода.
#[test]
fn test_reader_error_is_reported() {
    let data = encode_to_vec(&Person::sample());
    let reader = FailingReader {
        data,
        pos: 0,
        fail_at: 5,
    };
    let mut raw = RawMessage::new();
    let err = merge_from_reader(&mut raw, reader, 2, &ParseOptions::default()).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::Io);
    assert!(err.to_string().contains("failed to read message stream"));
}
