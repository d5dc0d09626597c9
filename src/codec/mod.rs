pub mod field;
pub mod message;

pub use field::*;
pub use message::*;
