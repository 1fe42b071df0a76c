//! Shared audio types: logical codecs, native sample formats, and the
//! constants of the canonical PCM contract.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Channel count of every stream. The layout is always stereo.
pub const CHANNELS: usize = 2;

/// Bytes per sample of the canonical interleaved signed 16-bit input.
pub const INPUT_BYTES_PER_SAMPLE: usize = 2;

/// Frame size used when a codec accepts frames of any length.
pub const DEFAULT_FRAME_SIZE: usize = 1024;

/// Logical codec selected by callers.
///
/// Each variant maps to one backend codec and one native sample format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    /// No codec selected.
    #[default]
    None,
    /// Raw interleaved signed 16-bit PCM.
    Pcm,
    /// Raw planar signed 16-bit PCM.
    PcmPlanar,
    /// Raw interleaved 32-bit float PCM.
    PcmFloat,
    /// Raw planar 32-bit float PCM.
    PcmFloatPlanar,
    /// Opus (lossy, 20 ms frames).
    Opus,
}

impl AudioCodec {
    /// All selectable codecs, excluding [`AudioCodec::None`].
    pub const ALL: [Self; 5] = [
        Self::Pcm,
        Self::PcmPlanar,
        Self::PcmFloat,
        Self::PcmFloatPlanar,
        Self::Opus,
    ];

    /// Stable lowercase name, as used in configuration files.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pcm => "pcm",
            Self::PcmPlanar => "pcm_planar",
            Self::PcmFloat => "pcm_float",
            Self::PcmFloatPlanar => "pcm_float_planar",
            Self::Opus => "opus",
        }
    }

    /// Whether the codec discards information.
    pub const fn is_lossy(&self) -> bool {
        matches!(self, Self::Opus)
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AudioCodec {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|codec| codec.name() == lower)
            .ok_or_else(|| crate::Error::InvalidArgument(format!("unknown codec '{s}'")))
    }
}

/// Binary layout of samples as a codec backend consumes or produces them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Unsigned 8-bit, interleaved.
    U8,
    /// Signed 16-bit, interleaved.
    S16,
    /// Signed 16-bit, one plane per channel.
    S16Planar,
    /// Signed 32-bit, interleaved.
    S32,
    /// 32-bit float, interleaved.
    F32,
    /// 32-bit float, one plane per channel.
    F32Planar,
    /// 64-bit float, interleaved.
    F64,
}

impl SampleFormat {
    /// Size of one sample of one channel.
    pub const fn bytes_per_sample(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 | Self::S16Planar => 2,
            Self::S32 | Self::F32 | Self::F32Planar => 4,
            Self::F64 => 8,
        }
    }

    /// Whether each channel is stored in its own plane.
    pub const fn is_planar(&self) -> bool {
        matches!(self, Self::S16Planar | Self::F32Planar)
    }

    /// Short name in the usual `s16`/`fltp` notation.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::S16 => "s16",
            Self::S16Planar => "s16p",
            Self::S32 => "s32",
            Self::F32 => "flt",
            Self::F32Planar => "fltp",
            Self::F64 => "dbl",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
