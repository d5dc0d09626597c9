pub mod tag;
pub mod varint;

pub use tag::*;
pub use varint::*;
