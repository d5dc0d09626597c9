pub mod cursor;
pub mod session;
pub mod source;
pub mod unknown;

pub use cursor::*;
pub use session::*;
pub use source::*;
pub use unknown::*;
