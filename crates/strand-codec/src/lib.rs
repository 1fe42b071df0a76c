//! # strand-codec
//!
//! Encoder and decoder pipelines between the canonical interleaved 16-bit PCM
//! contract and the native sample layout of a codec backend.
//!
//! Features:
//! - Pluggable codec backends behind the [`backend::Codec`] trait
//! - Built-in PCM backends for every supported layout, Opus behind the `opus` feature
//! - Send/receive drain loop producing zero or more pooled packets per frame

pub mod backend;
pub mod convert;
pub mod decoder;
pub mod encoder;
pub mod frame;

pub use backend::{BackendError, BuiltinCodecs, Codec, CodecId, CodecParams, CodecRegistry};
pub use decoder::AudioDecoder;
pub use encoder::AudioEncoder;
pub use frame::{NativeFrame, Packet};
