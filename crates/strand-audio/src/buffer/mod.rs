//! Buffering between the producer and the output callback.

pub mod ring;

pub use ring::{shared_ring, PcmRing, SharedRing};
