//! Byte-level buffer utilities.
//!
//! - [`DataBuffer`]: growable, position-tracked buffer with big-endian
//!   primitive access and modified-UTF strings. Every serializer and spill
//!   path in the crate goes through it.
//! - [`BufferedReadableByteChannel`] / [`BufferedWritableByteChannel`]:
//!   block-buffered adapters used for spill files.

mod channel;
mod data;
mod utf;

pub use channel::{BufferedReadableByteChannel, BufferedWritableByteChannel, DEFAULT_BLOCK_SIZE};
pub use data::{DataBuffer, DEFAULT_INITIAL_CAPACITY};
