//! Расширения сообщений: реестр, хранилище, ленивые вложенные сообщения
//! и их сериализация.

pub mod lazy;
pub mod registry;
pub mod store;
pub mod value;
pub mod wire;

pub use lazy::*;
pub use registry::*;
pub use store::*;
pub use value::*;
