pub mod index;

pub use index::{decode_index, encode_index, IndexEntryExternal, IndexError, IndexExternal};
