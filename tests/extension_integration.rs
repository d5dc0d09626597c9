use bytes::BytesMut;
use pbwire::{
    encode_to_vec, stream::UnknownFields, ExtensionInfo, ExtensionRegistry, ExtensionStore,
    ExtensionValue, FieldType, ParseOptions, ParseSession, Tag,
};

mod common;
use common::Person;

fn registry() -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::new();
    for info in [
        ExtensionInfo::singular(100, FieldType::Int32),
        ExtensionInfo::singular(101, FieldType::String),
        ExtensionInfo::repeated(102, FieldType::SInt64, true),
        ExtensionInfo::repeated(103, FieldType::Fixed32, false),
        ExtensionInfo::message(104, Person::prototype),
        ExtensionInfo::message(105, Person::prototype).with_lazy(true),
        ExtensionInfo::repeated(106, FieldType::Group, false).with_prototype(Person::prototype),
        ExtensionInfo::singular(107, FieldType::Enum).with_enum_validator(|v| (0..=2).contains(&v)),
        ExtensionInfo::repeated(108, FieldType::Bytes, false),
    ] {
        registry.register(info).unwrap();
    }
    registry
}

fn parse(
    data: &[u8],
    registry: &ExtensionRegistry,
) -> (ExtensionStore, UnknownFields) {
    let mut store = ExtensionStore::new();
    let mut unknown = UnknownFields::new();
    let mut session = ParseSession::from_slice(data, &ParseOptions::default());
    while !session.done().unwrap() {
        let tag = Tag::from_raw(session.read_tag().unwrap()).unwrap();
        store
            .parse_field(tag, &mut session, registry, &mut unknown)
            .unwrap();
    }
    session.finish().unwrap();
    (store, unknown)
}

fn sample_store() -> ExtensionStore {
    let mut store = ExtensionStore::new();
    store.set_int32(100, FieldType::Int32, -5);
    store.set_string(101, FieldType::String, "ext");
    for v in [i64::MIN, -1, 0, 1, i64::MAX] {
        store.add_int64(102, FieldType::SInt64, true, v);
    }
    store.add_uint32(103, FieldType::Fixed32, false, 7);
    store.add_uint32(103, FieldType::Fixed32, false, u32::MAX);
    store.set_allocated_message(104, FieldType::Message, Some(Box::new(Person::sample())));
    store.add_message(106, FieldType::Group, Person::prototype);
    store.set_enum(107, FieldType::Enum, 2);
    store.add_bytes(108, FieldType::Bytes, vec![0u8, 1, 2]);
    store
}

/// Тест проверяет round-trip всех видов расширений через реестр.
#[test]
fn test_round_trip_through_registry() {
    let store = sample_store();
    let bytes = store.to_bytes();
    assert_eq!(bytes.len(), store.byte_size());

    let (parsed, unknown) = parse(&bytes, &registry());
    assert!(unknown.is_empty());
    assert_eq!(parsed.get_int32(100, 0), -5);
    assert_eq!(parsed.get_string(101, ""), "ext");
    assert_eq!(parsed.repeated_int64(102), &[i64::MIN, -1, 0, 1, i64::MAX]);
    assert_eq!(parsed.repeated_uint32(103), &[7, u32::MAX]);
    assert_eq!(parsed.get_enum(107, 0), 2);
    assert_eq!(parsed.extension_size(106), 1);

    let person = parsed
        .get_message(104)
        .unwrap()
        .as_any()
        .downcast_ref::<Person>()
        .unwrap();
    assert_eq!(person, &Person::sample());
    assert_eq!(parsed.to_bytes(), bytes);
}

/// Тест проверяет, что сериализация идёт по возрастанию номера
/// независимо от порядка вставки.
#[test]
fn test_serialization_order() {
    let mut store = ExtensionStore::new();
    for n in [5u32, 1, 3] {
        store.set_uint32(n, FieldType::UInt32, n);
    }
    assert_eq!(
        store.iter().map(|(n, _)| n).collect::<Vec<_>>(),
        vec![1, 3, 5]
    );
    assert_eq!(&store.to_bytes()[..], &[0x08, 0x01, 0x18, 0x03, 0x28, 0x05]);
}

/// Тест проверяет переход на дерево с 300 ключами.
#[test]
fn test_large_representation_round_trip() {
    let mut registry = ExtensionRegistry::new();
    let mut store = ExtensionStore::new();
    for n in (1..=300u32).rev() {
        registry
            .register(ExtensionInfo::singular(n, FieldType::UInt64))
            .unwrap();
        store.set_uint64(n, FieldType::UInt64, u64::from(n) * 1000);
    }
    assert!(!store.is_flat());
    assert_eq!(store.len(), 300);

    let bytes = store.to_bytes();
    let (parsed, _) = parse(&bytes, &registry);
    assert!(!parsed.is_flat());
    for n in 1..=300u32 {
        assert_eq!(parsed.get_uint64(n, 0), u64::from(n) * 1000);
    }
    assert_eq!(parsed.to_bytes(), bytes);
}

/// Тест проверяет идемпотентность сброса.
#[test]
fn test_clear_idempotence() {
    let mut store = sample_store();
    store.clear();
    for n in 100..=108 {
        assert!(!store.has(n));
    }
    assert_eq!(store.byte_size(), 0);
    store.clear();
    assert_eq!(store.byte_size(), 0);
    assert!(store.to_bytes().is_empty());
}

/// Тест проверяет, что ленивое расширение не разбирается при разборе
/// контейнера и выдаётся побайтно.
#[test]
fn test_lazy_extension() {
    let person = Person::sample();
    let mut buf = BytesMut::new();
    pbwire::codec::write_message(105, &person, &mut buf);

    let (mut store, _) = parse(&buf, &registry());
    match store.extension(105).unwrap().value() {
        ExtensionValue::Lazy(lazy) => assert!(!lazy.is_materialized()),
        other => panic!("expected lazy value, got {other:?}"),
    }
    assert_eq!(store.to_bytes(), buf.clone().freeze());

    let parsed = store
        .get_message(105)
        .unwrap()
        .as_any()
        .downcast_ref::<Person>()
        .unwrap()
        .clone();
    assert_eq!(parsed, person);

    let msg = store.mutable_message(105, FieldType::Message, Person::prototype);
    msg.as_any_mut().downcast_mut::<Person>().unwrap().id = 1;
    let mut expected = person.clone();
    expected.id = 1;
    let mut expected_buf = BytesMut::new();
    pbwire::codec::write_message(105, &expected, &mut expected_buf);
    assert_eq!(store.to_bytes(), expected_buf.freeze());
}

/// Тест проверяет слияние двух хранилищ.
#[test]
fn test_merge_stores() {
    let mut a = ExtensionStore::new();
    a.set_int32(100, FieldType::Int32, 1);
    a.add_int64(102, FieldType::SInt64, true, 1);

    let mut b = ExtensionStore::new();
    b.set_int32(100, FieldType::Int32, 2);
    b.add_int64(102, FieldType::SInt64, true, 2);
    b.set_string(101, FieldType::String, "b");

    a.merge_from(&b).unwrap();
    assert_eq!(a.get_int32(100, 0), 2);
    assert_eq!(a.repeated_int64(102), &[1, 2]);
    assert_eq!(a.get_string(101, ""), "b");

    let mut concatenated = ExtensionStore::new();
    let mut data = sample_store().to_bytes().to_vec();
    data.extend_from_slice(&sample_store().to_bytes());
    let (parsed, _) = parse(&data, &registry());
    concatenated.merge_from(&parsed).unwrap();
    assert_eq!(concatenated.repeated_uint32(103).len(), 4);
}

/// Тест проверяет недопустимое значение перечисления.
#[test]
fn test_unknown_enum_value() {
    // поле 107 = 5
    let data = [0xD8, 0x06, 0x05];
    let (store, unknown) = parse(&data, &registry());
    assert!(!store.has(107));
    assert_eq!(unknown.as_bytes(), &data);
}

/// Тест проверяет MessageSet с сообщением Person.
#[test]
fn test_message_set_round_trip() {
    let mut registry = ExtensionRegistry::new();
    registry
        .register(ExtensionInfo::message(1_000_000, Person::prototype))
        .unwrap();

    let mut store = ExtensionStore::new();
    store.set_allocated_message(1_000_000, FieldType::Message, Some(Box::new(Person::sample())));
    let mut buf = BytesMut::new();
    store.serialize_message_set(&mut buf);
    assert_eq!(buf.len(), store.message_set_byte_size());

    let mut parsed = ExtensionStore::new();
    let mut unknown = UnknownFields::new();
    let mut session = ParseSession::from_bytes(buf.clone().freeze(), &ParseOptions::default());
    parsed
        .parse_message_set(&mut session, &registry, &mut unknown)
        .unwrap();
    session.finish().unwrap();

    let person = parsed
        .get_message(1_000_000)
        .unwrap()
        .as_any()
        .downcast_ref::<Person>()
        .unwrap();
    assert_eq!(encode_to_vec(person), encode_to_vec(&Person::sample()));
}
