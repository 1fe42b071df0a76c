//! Codec backend interface.
//!
//! A backend is an external codec implementation reached through a
//! send/receive state machine: frames (or packets) are submitted, then
//! outputs are pulled until the backend reports [`BackendError::Again`] or
//! [`BackendError::Eof`]. The encoder and decoder pipelines only talk to
//! these traits, so any codec library can be plugged in.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

pub mod pcm;

#[cfg(feature = "opus")]
pub mod opus;

use std::fmt;
use std::sync::Arc;

use strand_core::{AudioCodec, SampleFormat};
use thiserror::Error;

use crate::frame::{NativeFrame, Packet};

pub use pcm::PcmCodec;

#[cfg(feature = "opus")]
pub use self::opus::OpusCodec;

/// Backend codec identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    PcmS16Le,
    PcmS16LePlanar,
    PcmF32Le,
    PcmF32LePlanar,
    Opus,
}

impl CodecId {
    /// Map a logical codec to its backend id and native sample format.
    pub const fn for_codec(codec: AudioCodec) -> Option<(Self, SampleFormat)> {
        match codec {
            AudioCodec::Pcm => Some((Self::PcmS16Le, SampleFormat::S16)),
            AudioCodec::PcmPlanar => Some((Self::PcmS16LePlanar, SampleFormat::S16Planar)),
            AudioCodec::PcmFloat => Some((Self::PcmF32Le, SampleFormat::F32)),
            AudioCodec::PcmFloatPlanar => Some((Self::PcmF32LePlanar, SampleFormat::F32Planar)),
            AudioCodec::Opus => Some((Self::Opus, SampleFormat::F32)),
            AudioCodec::None => None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PcmS16Le => "pcm_s16le",
            Self::PcmS16LePlanar => "pcm_s16le_planar",
            Self::PcmF32Le => "pcm_f32le",
            Self::PcmF32LePlanar => "pcm_f32le_planar",
            Self::Opus => "opus",
        };
        f.write_str(name)
    }
}

/// Parameters a codec context is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecParams {
    pub codec_id: CodecId,
    pub sample_rate: u32,
    pub bit_rate: u64,
    pub sample_format: SampleFormat,
    pub channels: usize,
}

/// Outcome of a backend call that did not succeed.
///
/// `Again` and `Eof` are flow-control signals, not failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend needs more input")]
    Again,

    #[error("end of stream")]
    Eof,

    #[error("{0}")]
    Failed(String),
}

impl BackendError {
    /// Whether this ends a drain loop normally.
    pub const fn ends_drain(&self) -> bool {
        matches!(self, Self::Again | Self::Eof)
    }
}

impl From<BackendError> for strand_core::Error {
    fn from(err: BackendError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// A resolved codec that can open encoder and decoder contexts.
pub trait Codec: Send + Sync {
    /// Backend identifier.
    fn id(&self) -> CodecId;

    /// Human readable name.
    fn name(&self) -> &'static str;

    /// Accepted sample rates, `None` meaning any.
    fn supported_sample_rates(&self) -> Option<&[u32]>;

    /// Accepted native sample formats.
    fn supported_formats(&self) -> &[SampleFormat];

    fn supports_sample_rate(&self, sample_rate: u32) -> bool {
        sample_rate > 0
            && self
                .supported_sample_rates()
                .map_or(true, |rates| rates.contains(&sample_rate))
    }

    fn supports_format(&self, format: SampleFormat) -> bool {
        self.supported_formats().contains(&format)
    }

    /// Open an encoder context.
    fn open_encoder(&self, params: &CodecParams) -> Result<Box<dyn EncoderContext>, BackendError>;

    /// Open a decoder context, optionally primed with the encoder's extradata.
    fn open_decoder(
        &self,
        params: &CodecParams,
        extradata: Option<&[u8]>,
    ) -> Result<Box<dyn DecoderContext>, BackendError>;
}

/// An opened encoder.
pub trait EncoderContext: Send {
    /// Required samples per channel per frame, 0 when any size is accepted.
    fn frame_size(&self) -> usize;

    /// Side-band initialization bytes for the decoder, if any.
    fn extradata(&self) -> Option<&[u8]> {
        None
    }

    /// Submit one frame.
    fn send_frame(&mut self, frame: &NativeFrame) -> Result<(), BackendError>;

    /// Signal that no more frames follow.
    fn send_eof(&mut self) -> Result<(), BackendError>;

    /// Pull the next packet into `packet`.
    fn receive_packet(&mut self, packet: &mut Packet) -> Result<(), BackendError>;
}

/// An opened decoder.
pub trait DecoderContext: Send {
    /// Submit one compressed packet.
    fn send_packet(&mut self, data: &[u8]) -> Result<(), BackendError>;

    /// Signal that no more packets follow.
    fn send_eof(&mut self) -> Result<(), BackendError>;

    /// Pull the next decoded frame.
    fn receive_frame(&mut self) -> Result<NativeFrame, BackendError>;
}

/// Lookup of codecs by identifier.
pub trait CodecRegistry: Send + Sync {
    fn find_encoder(&self, id: CodecId) -> Option<Arc<dyn Codec>>;

    fn find_decoder(&self, id: CodecId) -> Option<Arc<dyn Codec>>;
}

/// Registry of the codecs compiled into this crate.
pub struct BuiltinCodecs {
    codecs: Vec<Arc<dyn Codec>>,
}

impl BuiltinCodecs {
    /// Registry with every built-in codec.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for codec in PcmCodec::all() {
            registry.register(Arc::new(codec));
        }
        #[cfg(feature = "opus")]
        registry.register(Arc::new(OpusCodec));
        registry
    }

    /// Registry without any codec.
    pub const fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Add a codec, replacing any codec with the same id.
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.retain(|c| c.id() != codec.id());
        self.codecs.push(codec);
    }

    fn find(&self, id: CodecId) -> Option<Arc<dyn Codec>> {
        self.codecs.iter().find(|c| c.id() == id).cloned()
    }
}

impl Default for BuiltinCodecs {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecRegistry for BuiltinCodecs {
    fn find_encoder(&self, id: CodecId) -> Option<Arc<dyn Codec>> {
        self.find(id)
    }

    fn find_decoder(&self, id: CodecId) -> Option<Arc<dyn Codec>> {
        self.find(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_mapping() {
        assert_eq!(
            CodecId::for_codec(AudioCodec::PcmFloatPlanar),
            Some((CodecId::PcmF32LePlanar, SampleFormat::F32Planar))
        );
        assert_eq!(
            CodecId::for_codec(AudioCodec::Opus),
            Some((CodecId::Opus, SampleFormat::F32))
        );
        assert_eq!(CodecId::for_codec(AudioCodec::None), None);
    }

    #[test]
    fn test_builtin_registry() {
        let registry = BuiltinCodecs::new();
        for id in [
            CodecId::PcmS16Le,
            CodecId::PcmS16LePlanar,
            CodecId::PcmF32Le,
            CodecId::PcmF32LePlanar,
        ] {
            let codec = registry.find_encoder(id).unwrap();
            assert_eq!(codec.id(), id);
            assert!(registry.find_decoder(id).is_some());
        }
        assert_eq!(
            registry.find_encoder(CodecId::Opus).is_some(),
            cfg!(feature = "opus")
        );
        assert!(BuiltinCodecs::empty().find_encoder(CodecId::PcmS16Le).is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = BuiltinCodecs::empty();
        registry.register(Arc::new(PcmCodec::s16()));
        registry.register(Arc::new(PcmCodec::s16()));
        assert_eq!(registry.codecs.len(), 1);
        assert!(registry.find_encoder(CodecId::PcmS16Le).is_some());
    }

    #[test]
    fn test_drain_signals() {
        assert!(BackendError::Again.ends_drain());
        assert!(BackendError::Eof.ends_drain());
        assert!(!BackendError::Failed("x".into()).ends_drain());
    }
}
