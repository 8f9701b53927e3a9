pub mod cursor;
pub mod entry;
pub mod error;

pub use cursor::*;
pub use entry::*;
pub use error::*;
