#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use pbwire::{
    codec::merge_from_session, encode_to_vec, ChunkListSource, ParseOptions, ParseSession,
    RawMessage,
};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    data: Vec<u8>,
    /// Размеры порций; пустой список - один буфер
    splits: Vec<u8>,
    max_depth: u8,
    track_correct_ending: bool,
}

fn split(
    data: &[u8],
    splits: &[u8],
) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    let mut rest = data;
    for &size in splits {
        let n = (size as usize).min(rest.len());
        chunks.push(Bytes::copy_from_slice(&rest[..n]));
        rest = &rest[n..];
    }
    chunks.push(Bytes::copy_from_slice(rest));
    chunks
}

fuzz_target!(|input: FuzzInput| {
    let options = ParseOptions::default()
        .with_max_depth(u32::from(input.max_depth))
        .with_track_correct_ending(input.track_correct_ending);

    // Декодер не должен паниковать ни на каких данных и разбиениях.
    let mut chunked = RawMessage::new();
    let chunked_result = {
        let source = ChunkListSource::new(split(&input.data, &input.splits));
        let mut session = ParseSession::new(source, &options);
        merge_from_session(&mut chunked, &mut session)
    };

    // Разбиение не влияет на результат.
    let mut whole = RawMessage::new();
    let whole_result = {
        let mut session = ParseSession::from_slice(&input.data, &options);
        merge_from_session(&mut whole, &mut session)
    };
    assert_eq!(chunked_result.is_ok(), whole_result.is_ok());
    if chunked_result.is_ok() {
        assert_eq!(encode_to_vec(&chunked), encode_to_vec(&whole));
    }
});
