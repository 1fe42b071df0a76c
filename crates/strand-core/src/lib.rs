//! # strand-core
//!
//! Core types, pooled byte buffers, and error handling shared by the Strand
//! encoder, decoder, and playback crates.

pub mod buffer;
pub mod error;
pub mod types;

pub use buffer::{BufferPool, ByteBuffer};
pub use error::{Error, Result};
pub use types::*;
