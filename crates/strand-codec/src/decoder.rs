//! Decoder pipeline from compressed packets back to canonical 16-bit PCM.

use std::sync::Arc;

use strand_core::{
    AudioCodec, BufferPool, ByteBuffer, Error, Result, SampleFormat, CHANNELS,
    INPUT_BYTES_PER_SAMPLE,
};
use tracing::{debug, error, trace};

use crate::backend::{BuiltinCodecs, CodecId, CodecParams, CodecRegistry, DecoderContext};
use crate::convert;

/// Decodes packets produced by [`AudioEncoder`](crate::AudioEncoder) into
/// interleaved stereo `i16` blocks.
pub struct AudioDecoder {
    pool: Arc<BufferPool>,
    registry: Arc<dyn CodecRegistry>,
    initialized: bool,
    codec: AudioCodec,
    sample_format: Option<SampleFormat>,
    sample_rate: u32,
    context: Option<Box<dyn DecoderContext>>,
}

impl AudioDecoder {
    pub fn new(pool: Arc<BufferPool>, registry: Arc<dyn CodecRegistry>) -> Self {
        Self {
            pool,
            registry,
            initialized: false,
            codec: AudioCodec::None,
            sample_format: None,
            sample_rate: 0,
            context: None,
        }
    }

    pub fn with_default_backends(pool: Arc<BufferPool>) -> Self {
        Self::new(pool, Arc::new(BuiltinCodecs::new()))
    }

    /// Open a decoder for `codec`, primed with the encoder's extradata when
    /// the codec produced any.
    pub fn initialize(
        &mut self,
        codec: AudioCodec,
        sample_rate: u32,
        extradata: Option<&[u8]>,
    ) -> Result<()> {
        if self.initialized {
            self.deinitialize();
        }
        debug!("Decoding codec '{codec}' at {sample_rate} Hz...");

        match self.open(codec, sample_rate, extradata) {
            Ok(()) => {
                self.initialized = true;
                Ok(())
            }
            Err(e) => {
                error!("Failed to initialize decoder: {e}");
                self.deinitialize();
                Err(e)
            }
        }
    }

    fn open(&mut self, codec: AudioCodec, sample_rate: u32, extradata: Option<&[u8]>) -> Result<()> {
        self.codec = codec;
        self.sample_rate = sample_rate;

        let (codec_id, sample_format) =
            CodecId::for_codec(codec).ok_or(Error::UnknownCodec(codec))?;
        self.sample_format = Some(sample_format);

        let backend = self
            .registry
            .find_decoder(codec_id)
            .ok_or_else(|| Error::CodecUnavailable(format!("no decoder for '{codec_id}'")))?;
        debug!("Using decoder '{}'...", backend.name());

        if !backend.supports_sample_rate(sample_rate) {
            return Err(Error::UnsupportedSampleRate(sample_rate));
        }
        if !backend.supports_format(sample_format) {
            return Err(Error::UnsupportedFormat(sample_format));
        }

        let params = CodecParams {
            codec_id,
            sample_rate,
            bit_rate: 0,
            sample_format,
            channels: CHANNELS,
        };
        self.context = Some(backend.open_decoder(&params, extradata)?);
        Ok(())
    }

    /// Release the codec context. Safe to call in any state.
    pub fn deinitialize(&mut self) {
        debug!("Deinitializing decoder...");
        self.initialized = false;
        if self.context.take().is_some() {
            trace!("Releasing decoder context");
        }
        self.codec = AudioCodec::None;
        self.sample_format = None;
        self.sample_rate = 0;
    }

    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub const fn codec(&self) -> AudioCodec {
        self.codec
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn sample_format(&self) -> Option<SampleFormat> {
        self.sample_format
    }

    /// Decode one packet into zero or more canonical PCM blocks. Failures are
    /// logged and yield an empty vector.
    pub fn decode(&mut self, packet: &ByteBuffer) -> Vec<ByteBuffer> {
        self.try_decode(packet).unwrap_or_else(|e| {
            error!("Failed to decode audio packet: {e}");
            Vec::new()
        })
    }

    pub fn try_decode(&mut self, packet: &ByteBuffer) -> Result<Vec<ByteBuffer>> {
        let context = self.context_mut()?;
        context
            .send_packet(packet.as_slice())
            .map_err(|e| Error::Backend(format!("failed to send packet to decoder: {e}")))?;
        self.drain_frames()
    }

    /// Signal end of input and collect any frames still held by the codec.
    pub fn flush(&mut self) -> Vec<ByteBuffer> {
        self.try_flush().unwrap_or_else(|e| {
            error!("Failed to flush decoder: {e}");
            Vec::new()
        })
    }

    pub fn try_flush(&mut self) -> Result<Vec<ByteBuffer>> {
        self.context_mut()?.send_eof()?;
        self.drain_frames()
    }

    fn context_mut(&mut self) -> Result<&mut Box<dyn DecoderContext>> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        self.context.as_mut().ok_or(Error::NotInitialized)
    }

    fn drain_frames(&mut self) -> Result<Vec<ByteBuffer>> {
        let Some(context) = self.context.as_mut() else {
            return Err(Error::NotInitialized);
        };

        let mut blocks = Vec::new();
        loop {
            match context.receive_frame() {
                Ok(frame) => {
                    let size = frame.samples() * frame.channels() * INPUT_BYTES_PER_SAMPLE;
                    let mut block = self.pool.get_buffer(size);
                    if let Err(e) = convert::native_to_interleaved(&frame, block.as_mut_slice()) {
                        blocks.push(block);
                        self.pool.free_all(blocks);
                        return Err(e);
                    }
                    blocks.push(block);
                }
                Err(e) if e.ends_drain() => break,
                Err(e) => {
                    self.pool.free_all(blocks);
                    return Err(Error::Backend(format!("failed to receive frame: {e}")));
                }
            }
        }
        trace!("Decoded {} blocks", blocks.len());
        Ok(blocks)
    }
}

impl Drop for AudioDecoder {
    fn drop(&mut self) {
        self.deinitialize();
    }
}
