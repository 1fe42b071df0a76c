//! # strand-audio
//!
//! Playback side of Strand.
//!
//! Features:
//! - Mutex-guarded PCM ring between the producer and the device callback
//! - Pluggable output backends, cpal by default
//! - symphonia-based file source producing canonical stereo `i16`

pub mod buffer;
pub mod output;
pub mod player;
pub mod source;

pub use buffer::{PcmRing, SharedRing};
pub use output::{OutputBackend, OutputSpec, OutputStream};
pub use player::{device_buffer_bytes, AudioPlayer};
pub use source::FileSource;

#[cfg(feature = "cpal")]
pub use output::CpalBackend;
