/// Growable field containers and arena accounting.
pub mod collections;
/// Message trait, per-field-type codecs, top-level encode/decode helpers.
pub mod codec;
/// Codec settings loading.
pub mod config;
/// Extension registry, sparse extension storage, lazy sub-messages.
pub mod extension;
/// Logging setup on top of tracing-subscriber.
pub mod logging;
/// Chunk sources, the lookahead cursor and the parse session.
pub mod stream;
/// Varint, zigzag and tag primitives.
pub mod wire;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Arena-aware growable array.
pub use collections::{Arena, GrowableArray, Ownership};
/// Message trait and encode/decode entry points.
pub use codec::{
    decode, decode_length_delimited, encode_length_delimited, encode_to_bytes, encode_to_vec,
    merge_from_bytes, merge_from_reader, Message, MessagePrototype, RawMessage, WireCodec,
};
/// config
pub use config::CodecSettings;
/// Extension storage.
pub use extension::{
    Extension, ExtensionInfo, ExtensionRegistry, ExtensionStore, ExtensionValue, FieldType,
    LazyMessage, RepeatedValue,
};
/// Logging.
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingHandle};
/// Error types.
pub use pbwire_error::{ErrorExt, PbResult, StackError, StatusCode, WireError, WireResult};
/// Streaming decoder.
pub use stream::{
    BytesSource, ChunkListSource, ChunkSource, ChunkedByteCursor, ParseOptions, ParseSession,
    ReaderSource, UnknownFields,
};
/// Wire primitives.
pub use wire::{Tag, WireType};
