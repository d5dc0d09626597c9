#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use pbwire::{
    stream::UnknownFields, ExtensionInfo, ExtensionRegistry, ExtensionStore, FieldType,
    ParseOptions, ParseSession, RawMessage, Tag, WireResult,
};

fn registry() -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::new();
    let infos = [
        ExtensionInfo::singular(1, FieldType::Int32),
        ExtensionInfo::repeated(2, FieldType::SInt64, true),
        ExtensionInfo::singular(3, FieldType::String),
        ExtensionInfo::message(4, RawMessage::prototype),
        ExtensionInfo::message(5, RawMessage::prototype).with_lazy(true),
        ExtensionInfo::repeated(6, FieldType::Group, false).with_prototype(RawMessage::prototype),
        ExtensionInfo::singular(7, FieldType::Enum).with_enum_validator(|v| v < 4),
        ExtensionInfo::repeated(8, FieldType::Fixed64, false),
    ];
    for info in infos {
        let _ = registry.register(info);
    }
    registry
}

fn parse(
    data: &[u8],
    registry: &ExtensionRegistry,
    store: &mut ExtensionStore,
    unknown: &mut UnknownFields,
) -> WireResult<()> {
    let mut session = ParseSession::from_slice(data, &ParseOptions::default());
    while !session.done()? {
        let tag = Tag::from_raw(session.read_tag()?)?;
        store.parse_field(tag, &mut session, registry, unknown)?;
    }
    session.finish()
}

fuzz_target!(|data: &[u8]| {
    let registry = registry();
    let mut store = ExtensionStore::new();
    let mut unknown = UnknownFields::new();

    // Сериализация разобранного не должна паниковать и должна совпадать
    // с посчитанным размером.
    if parse(data, &registry, &mut store, &mut unknown).is_ok() {
        assert_eq!(store.to_bytes().len(), store.byte_size());
        let mut set = BytesMut::new();
        store.serialize_message_set(&mut set);
        assert_eq!(set.len(), store.message_set_byte_size());
    }
});
