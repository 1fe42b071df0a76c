//! Playback of queued PCM through an output backend.

use strand_core::{ByteBuffer, Error, Result, CHANNELS, INPUT_BYTES_PER_SAMPLE};
use tracing::{debug, error, trace};

use crate::buffer::{shared_ring, SharedRing};
use crate::output::{OutputBackend, OutputSpec, OutputStream};

/// Plays interleaved stereo `i16` PCM queued by a producer.
///
/// Queued bytes sit in a [`PcmRing`](crate::buffer::PcmRing) until the output
/// device pulls them. Playback state is independent of how much is buffered:
/// a playing stream with an empty ring outputs silence.
pub struct AudioPlayer {
    backend: Box<dyn OutputBackend>,
    ring: Option<SharedRing>,
    stream: Option<Box<dyn OutputStream>>,
    playing: bool,
    sample_rate: u32,
}

impl AudioPlayer {
    pub fn new(backend: Box<dyn OutputBackend>) -> Self {
        Self {
            backend,
            ring: None,
            stream: None,
            playing: false,
            sample_rate: 0,
        }
    }

    /// Player on the default cpal output device.
    #[cfg(feature = "cpal")]
    pub fn with_default_output() -> Self {
        Self::new(Box::new(crate::output::CpalBackend::new()))
    }

    /// Open the output at `sample_rate`.
    ///
    /// `min_buffer_size` is the device buffer in frames, `max_buffer_size` the
    /// ring capacity in bytes. The ring must hold at least one device buffer.
    /// The stream starts stopped.
    pub fn initialize(
        &mut self,
        sample_rate: u32,
        min_buffer_size: usize,
        max_buffer_size: usize,
    ) -> Result<()> {
        if self.is_initialized() {
            self.deinitialize();
        }
        debug!(
            "Initializing player: {sample_rate} Hz, device buffer {min_buffer_size} frames, \
             ring {max_buffer_size} bytes"
        );

        if let Err(e) = self.open(sample_rate, min_buffer_size, max_buffer_size) {
            error!("Failed to initialize player: {e}");
            self.deinitialize();
            return Err(e);
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn open(&mut self, sample_rate: u32, min_buffer_size: usize, max_buffer_size: usize) -> Result<()> {
        if sample_rate == 0 {
            return Err(Error::UnsupportedSampleRate(sample_rate));
        }
        let device_bytes = device_buffer_bytes(min_buffer_size);
        if min_buffer_size == 0 || !device_bytes.is_some_and(|bytes| bytes <= max_buffer_size) {
            return Err(Error::InvalidArgument(format!(
                "ring of {max_buffer_size} bytes cannot hold a device buffer of \
                 {min_buffer_size} frames"
            )));
        }
        let buffer_frames = u32::try_from(min_buffer_size).map_err(|_| {
            Error::InvalidArgument(format!("device buffer of {min_buffer_size} frames is too large"))
        })?;

        let spec = OutputSpec {
            sample_rate,
            channels: CHANNELS as u16,
            buffer_frames,
        };

        let ring = shared_ring(max_buffer_size);
        self.stream = Some(self.backend.open(&spec, SharedRing::clone(&ring))?);
        self.ring = Some(ring);
        self.sample_rate = sample_rate;
        Ok(())
    }

    /// Close the output and drop anything queued. Safe to call in any state.
    pub fn deinitialize(&mut self) {
        if self.stream.is_some() || self.ring.is_some() {
            debug!("Deinitializing player...");
        }
        self.stop();
        self.stream = None;
        self.ring = None;
        self.sample_rate = 0;
    }

    pub const fn is_initialized(&self) -> bool {
        self.stream.is_some()
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Queue PCM for playback, returning how many bytes fit.
    ///
    /// Fewer bytes than offered means the ring is full; the caller should
    /// retry the rest later.
    pub fn queue_data(&self, data: &ByteBuffer) -> usize {
        let Some(ring) = &self.ring else {
            return 0;
        };
        let accepted = ring.queue(data.as_slice());
        if accepted < data.used_size() {
            trace!("Ring full: accepted {accepted} of {} bytes", data.used_size());
        }
        accepted
    }

    pub const fn is_playing(&self) -> bool {
        self.playing
    }

    /// Start pulling from the ring. Does nothing when already playing.
    pub fn play(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::NotInitialized);
        };
        if self.playing {
            return Ok(());
        }
        stream.play().inspect_err(|e| error!("Failed to start playback: {e}"))?;
        self.playing = true;
        debug!("Playback started");
        Ok(())
    }

    /// Stop pulling from the ring. Queued data is kept.
    pub fn stop(&mut self) {
        if !self.playing {
            return;
        }
        self.playing = false;
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.pause() {
                error!("Failed to stop playback: {e}");
            }
        }
        debug!("Playback stopped");
    }

    /// Discard all queued, unplayed audio.
    pub fn flush(&self) {
        if let Some(ring) = &self.ring {
            ring.flush();
        }
    }

    /// Bytes queued and not yet played.
    pub fn buffered_bytes(&self) -> usize {
        self.ring.as_ref().map_or(0, |ring| ring.len())
    }

    /// Device pulls that ran dry part way through since initialization.
    pub fn underruns(&self) -> usize {
        self.ring.as_ref().map_or(0, |ring| ring.underruns())
    }

    /// Ring capacity in bytes, 0 when uninitialized.
    pub fn capacity(&self) -> usize {
        self.ring.as_ref().map_or(0, |ring| ring.capacity())
    }
}

/// Bytes in a device buffer of `frames` stereo `i16` frames.
pub const fn device_buffer_bytes(frames: usize) -> Option<usize> {
    match frames.checked_mul(CHANNELS) {
        Some(samples) => samples.checked_mul(INPUT_BYTES_PER_SAMPLE),
        None => None,
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.deinitialize();
    }
}
