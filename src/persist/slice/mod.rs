//! Bounds-checked byte-slice wrappers used by the record codecs.
//!
//! Wire layouts in this crate are packed little-endian structures; the
//! wrappers give codecs typed `read_*`/`write_*` accessors with explicit
//! panic-on-overrun semantics instead of open-coded `from_le_bytes` calls.

mod macros;
mod ro;
mod wo;

pub use ro::ROSlice;
pub use wo::WOSlice;
