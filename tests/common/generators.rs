//! Генераторы для property-based тестирования.

use proptest::{collection::vec, option, prelude::*};

use super::Person;

/// Операция над хранилищем расширений.
#[derive(Debug, Clone)]
pub enum StoreOp {
    Set(u32, u64),
    Clear(u32),
    Erase(u32),
}

/// Операция над растущим массивом.
#[derive(Debug, Clone)]
pub enum ArrayOp {
    Push(u32),
    RemoveLast,
    Truncate(usize),
    Extend(Vec<u32>),
}

/// Значения около границ размеров varint.
pub fn varint_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        any::<u64>(),
        (0u32..64).prop_map(|shift| 1u64 << shift),
        (1u32..64).prop_map(|shift| (1u64 << shift) - 1),
        Just(0u64),
        Just(u64::MAX),
    ]
}

fn leaf_person() -> impl Strategy<Value = Person> {
    (
        any::<i32>(),
        "[a-zA-Z0-9 ]{0,12}",
        vec(any::<i64>(), 0..6),
        vec("\\PC{0,6}", 0..3),
        -1.0e12f64..1.0e12,
        any::<bool>(),
    )
        .prop_map(|(id, name, scores, emails, ratio, active)| Person {
            id,
            name,
            scores,
            emails,
            ratio,
            active,
            ..Default::default()
        })
}

/// Сообщения с вложенностью через поля `child` и `legacy`.
pub fn person_strategy() -> impl Strategy<Value = Person> {
    leaf_person().prop_recursive(4, 24, 2, |inner| {
        (leaf_person(), option::of(inner.clone()), option::of(inner)).prop_map(
            |(mut person, child, legacy)| {
                person.child = child.map(Box::new);
                person.legacy = legacy.map(Box::new);
                person
            },
        )
    })
}

pub fn store_ops_strategy() -> impl Strategy<Value = Vec<StoreOp>> {
    let number = 1u32..400;
    vec(
        prop_oneof![
            6 => (number.clone(), any::<u64>()).prop_map(|(n, v)| StoreOp::Set(n, v)),
            1 => number.clone().prop_map(StoreOp::Clear),
            1 => number.prop_map(StoreOp::Erase),
        ],
        0..600,
    )
}

pub fn array_ops_strategy() -> impl Strategy<Value = Vec<ArrayOp>> {
    vec(
        prop_oneof![
            6 => any::<u32>().prop_map(ArrayOp::Push),
            1 => Just(ArrayOp::RemoveLast),
            1 => (0usize..64).prop_map(ArrayOp::Truncate),
            2 => vec(any::<u32>(), 0..40).prop_map(ArrayOp::Extend),
        ],
        0..200,
    )
}
