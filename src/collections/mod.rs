pub mod arena;
pub mod growable;

pub use arena::*;
pub use growable::*;
