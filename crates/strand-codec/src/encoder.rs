//! Encoder pipeline from canonical interleaved 16-bit PCM to compressed packets.

use std::sync::Arc;

use strand_core::{
    AudioCodec, BufferPool, ByteBuffer, Error, Result, SampleFormat, CHANNELS, DEFAULT_FRAME_SIZE,
    INPUT_BYTES_PER_SAMPLE,
};
use tracing::{debug, error, trace};

use crate::backend::{BuiltinCodecs, CodecId, CodecParams, CodecRegistry, EncoderContext};
use crate::convert;
use crate::frame::{NativeFrame, Packet};

/// Encodes fixed-size blocks of interleaved stereo `i16` PCM.
///
/// The encoder is either uninitialized or holds an open codec context, a
/// native frame sized to the codec's frame size, and a packet holder. Every
/// failed [`initialize`](Self::initialize) and every
/// [`deinitialize`](Self::deinitialize) releases all three, so the instance
/// is never left half configured.
pub struct AudioEncoder {
    pool: Arc<BufferPool>,
    registry: Arc<dyn CodecRegistry>,
    initialized: bool,
    codec: AudioCodec,
    codec_id: Option<CodecId>,
    sample_format: Option<SampleFormat>,
    bytes_per_sample: usize,
    sample_rate: u32,
    bit_rate: u64,
    context: Option<Box<dyn EncoderContext>>,
    frame: Option<NativeFrame>,
    packet: Option<Packet>,
}

impl AudioEncoder {
    /// Create an uninitialized encoder resolving codecs through `registry`.
    pub fn new(pool: Arc<BufferPool>, registry: Arc<dyn CodecRegistry>) -> Self {
        Self {
            pool,
            registry,
            initialized: false,
            codec: AudioCodec::None,
            codec_id: None,
            sample_format: None,
            bytes_per_sample: 0,
            sample_rate: 0,
            bit_rate: 0,
            context: None,
            frame: None,
            packet: None,
        }
    }

    /// Create an uninitialized encoder using the built-in codecs.
    pub fn with_default_backends(pool: Arc<BufferPool>) -> Self {
        Self::new(pool, Arc::new(BuiltinCodecs::new()))
    }

    /// Open `codec` at the given sample rate and bit rate.
    ///
    /// Any previous configuration is torn down first. On failure the encoder
    /// is left uninitialized.
    pub fn initialize(&mut self, codec: AudioCodec, sample_rate: u32, bit_rate: u64) -> Result<()> {
        if self.initialized {
            self.deinitialize();
        }
        debug!("Encoding with codec '{codec}' at {sample_rate} Hz, {bit_rate} bps...");

        match self.open(codec, sample_rate, bit_rate) {
            Ok(()) => {
                self.initialized = true;
                Ok(())
            }
            Err(e) => {
                error!("Failed to initialize encoder: {e}");
                self.deinitialize();
                Err(e)
            }
        }
    }

    fn open(&mut self, codec: AudioCodec, sample_rate: u32, bit_rate: u64) -> Result<()> {
        self.codec = codec;
        self.sample_rate = sample_rate;
        self.bit_rate = bit_rate;

        let (codec_id, sample_format) =
            CodecId::for_codec(codec).ok_or(Error::UnknownCodec(codec))?;
        self.codec_id = Some(codec_id);
        self.sample_format = Some(sample_format);
        debug!("Using codec ID '{codec_id}'...");

        let backend = self
            .registry
            .find_encoder(codec_id)
            .ok_or_else(|| Error::CodecUnavailable(format!("no encoder for '{codec_id}'")))?;
        debug!("Using encoder '{}'...", backend.name());

        if !backend.supports_sample_rate(sample_rate) {
            return Err(Error::UnsupportedSampleRate(sample_rate));
        }
        if !backend.supports_format(sample_format) {
            return Err(Error::UnsupportedFormat(sample_format));
        }

        let params = CodecParams {
            codec_id,
            sample_rate,
            bit_rate,
            sample_format,
            channels: CHANNELS,
        };
        let context = self.context.insert(backend.open_encoder(&params)?);

        let mut frame_size = context.frame_size();
        if frame_size == 0 {
            frame_size = DEFAULT_FRAME_SIZE;
            debug!("Unrestricted frame size, setting to {DEFAULT_FRAME_SIZE}.");
        }

        self.packet = Some(Packet::new());
        self.frame = Some(NativeFrame::new(sample_format, frame_size, CHANNELS));
        self.bytes_per_sample = sample_format.bytes_per_sample();

        debug!(
            "Encoder ready: {codec_id}, {sample_format}, {sample_rate} Hz, {CHANNELS} channels, \
             {frame_size} samples per frame, {} bytes per sample",
            self.bytes_per_sample
        );
        Ok(())
    }

    /// Release the codec context, frame, and packet holder and reset the
    /// configuration. Safe to call in any state.
    pub fn deinitialize(&mut self) {
        debug!("Deinitializing encoder...");
        self.initialized = false;

        if let Some(frame) = self.frame.take() {
            trace!("Releasing {} native frame", frame.format());
        }
        if self.packet.take().is_some() {
            trace!("Releasing packet holder");
        }
        if self.context.take().is_some() {
            trace!("Releasing encoder context");
        }

        self.sample_format = None;
        self.bytes_per_sample = 0;
        self.codec_id = None;
        self.codec = AudioCodec::None;
        self.sample_rate = 0;
        self.bit_rate = 0;
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

    pub const fn bit_rate(&self) -> u64 {
        self.bit_rate
    }

    /// Native sample format of the open codec.
    pub const fn sample_format(&self) -> Option<SampleFormat> {
        self.sample_format
    }

    /// Bytes per native sample, 0 when uninitialized.
    pub const fn bytes_per_sample(&self) -> usize {
        self.bytes_per_sample
    }

    /// Samples per channel in each input block, 0 when uninitialized.
    pub fn samples_per_frame(&self) -> usize {
        match &self.frame {
            Some(frame) if self.initialized => frame.samples(),
            _ => 0,
        }
    }

    /// Exact byte size every input block must have, 0 when uninitialized.
    ///
    /// Always measured in canonical 16-bit interleaved samples, whatever the
    /// native format is.
    pub fn input_buffer_byte_size(&self) -> usize {
        self.samples_per_frame() * INPUT_BYTES_PER_SAMPLE * CHANNELS
    }

    /// Whether the codec produced decoder initialization bytes.
    pub fn has_extradata(&self) -> bool {
        self.initialized
            && self
                .context
                .as_ref()
                .is_some_and(|context| context.extradata().is_some())
    }

    /// A pooled copy of the codec's extradata, owned by the caller.
    pub fn extradata(&self) -> Option<ByteBuffer> {
        if !self.initialized {
            return None;
        }
        let data = self.context.as_ref()?.extradata()?;
        let mut buffer = self.pool.get_buffer(data.len());
        buffer.as_mut_slice().copy_from_slice(data);
        Some(buffer)
    }

    /// Encode one input block, returning the packets it produced.
    ///
    /// Failures are logged and yield an empty vector; the encoder stays
    /// usable for the next block.
    pub fn encode(&mut self, samples: &ByteBuffer) -> Vec<ByteBuffer> {
        self.try_encode(samples).unwrap_or_else(|e| {
            error!("Failed to encode audio frame: {e}");
            Vec::new()
        })
    }

    /// Encode one input block, reporting why it failed.
    pub fn try_encode(&mut self, samples: &ByteBuffer) -> Result<Vec<ByteBuffer>> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        let (Some(context), Some(frame), Some(packet)) =
            (self.context.as_mut(), self.frame.as_mut(), self.packet.as_mut())
        else {
            return Err(Error::NotInitialized);
        };

        let copied = frame.make_writable();
        if copied > 0 {
            trace!("Copied {copied} frame planes still held by the encoder");
        }

        let expected = frame.samples() * frame.channels();
        let provided = samples.used_size() / INPUT_BYTES_PER_SAMPLE;
        if provided != expected || samples.used_size() % INPUT_BYTES_PER_SAMPLE != 0 {
            return Err(Error::SampleCountMismatch { expected, provided });
        }

        convert::interleaved_to_native(samples.as_slice(), frame)?;

        context
            .send_frame(frame)
            .map_err(|e| Error::Backend(format!("failed to send frame to encoder: {e}")))?;

        drain_packets(&mut **context, packet, &self.pool)
    }

    /// Signal end of input and collect the packets still buffered in the
    /// codec. The encoder must be re-initialized before encoding again.
    pub fn flush(&mut self) -> Vec<ByteBuffer> {
        self.try_flush().unwrap_or_else(|e| {
            error!("Failed to flush encoder: {e}");
            Vec::new()
        })
    }

    /// Like [`flush`](Self::flush), reporting why it failed.
    pub fn try_flush(&mut self) -> Result<Vec<ByteBuffer>> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        let (Some(context), Some(packet)) = (self.context.as_mut(), self.packet.as_mut()) else {
            return Err(Error::NotInitialized);
        };

        context.send_eof()?;
        drain_packets(&mut **context, packet, &self.pool)
    }
}

impl Drop for AudioEncoder {
    fn drop(&mut self) {
        self.deinitialize();
    }
}

/// Pull packets until the backend asks for more input or ends the stream.
///
/// Any other backend failure fails the whole drain; packets collected so far
/// go back to the pool.
fn drain_packets(
    context: &mut dyn EncoderContext,
    packet: &mut Packet,
    pool: &BufferPool,
) -> Result<Vec<ByteBuffer>> {
    let mut packets = Vec::new();
    loop {
        match context.receive_packet(packet) {
            Ok(()) => {
                let mut buffer = pool.get_buffer(packet.len());
                buffer.as_mut_slice().copy_from_slice(packet.data());
                packet.clear();
                packets.push(buffer);
            }
            Err(e) if e.ends_drain() => break,
            Err(e) => {
                pool.free_all(packets);
                return Err(Error::Backend(format!("failed to receive packet: {e}")));
            }
        }
    }
    trace!("Drained {} packets", packets.len());
    Ok(packets)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::backend::{BackendError, Codec, DecoderContext};
    use crate::convert::{read_f32_le, read_i16_le, write_i16_le};
    use parking_lot::Mutex;

    /// Shared record of what a scripted backend saw and how it should act.
    #[derive(Default)]
    struct Script {
        sent: Vec<NativeFrame>,
        packets_per_frame: usize,
        fail_open: bool,
        fail_send: bool,
        fail_receive_after: Option<usize>,
        end_with_eof: bool,
    }

    struct ScriptedCodec {
        id: CodecId,
        formats: Vec<SampleFormat>,
        rates: Option<Vec<u32>>,
        frame_size: usize,
        extradata: Option<Vec<u8>>,
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedCodec {
        fn new(id: CodecId, format: SampleFormat, frame_size: usize) -> Self {
            Self {
                id,
                formats: vec![format],
                rates: None,
                frame_size,
                extradata: None,
                script: Arc::new(Mutex::new(Script {
                    packets_per_frame: 1,
                    ..Script::default()
                })),
            }
        }
    }

    impl Codec for ScriptedCodec {
        fn id(&self) -> CodecId {
            self.id
        }

        fn name(&self) -> &'static str {
            "scripted"
        }

        fn supported_sample_rates(&self) -> Option<&[u32]> {
            self.rates.as_deref()
        }

        fn supported_formats(&self) -> &[SampleFormat] {
            &self.formats
        }

        fn open_encoder(
            &self,
            _params: &CodecParams,
        ) -> std::result::Result<Box<dyn EncoderContext>, BackendError> {
            if self.script.lock().fail_open {
                return Err(BackendError::Failed("cannot open".into()));
            }
            Ok(Box::new(ScriptedEncoder {
                frame_size: self.frame_size,
                extradata: self.extradata.clone(),
                script: Arc::clone(&self.script),
                pending: 0,
                produced: 0,
                finished: false,
            }))
        }

        fn open_decoder(
            &self,
            _params: &CodecParams,
            _extradata: Option<&[u8]>,
        ) -> std::result::Result<Box<dyn DecoderContext>, BackendError> {
            Err(BackendError::Failed("encode only".into()))
        }
    }

    struct ScriptedEncoder {
        frame_size: usize,
        extradata: Option<Vec<u8>>,
        script: Arc<Mutex<Script>>,
        pending: usize,
        produced: usize,
        finished: bool,
    }

    impl EncoderContext for ScriptedEncoder {
        fn frame_size(&self) -> usize {
            self.frame_size
        }

        fn extradata(&self) -> Option<&[u8]> {
            self.extradata.as_deref()
        }

        fn send_frame(&mut self, frame: &NativeFrame) -> std::result::Result<(), BackendError> {
            let mut script = self.script.lock();
            if script.fail_send {
                return Err(BackendError::Failed("rejected frame".into()));
            }
            // Keeps the planes referenced, like a codec with lookahead.
            script.sent.push(frame.clone());
            self.pending += script.packets_per_frame;
            Ok(())
        }

        fn send_eof(&mut self) -> std::result::Result<(), BackendError> {
            self.finished = true;
            Ok(())
        }

        fn receive_packet(&mut self, packet: &mut Packet) -> std::result::Result<(), BackendError> {
            let script = self.script.lock();
            if script.fail_receive_after == Some(self.produced) {
                return Err(BackendError::Failed("corrupt state".into()));
            }
            if self.pending == 0 {
                return Err(if self.finished || script.end_with_eof {
                    BackendError::Eof
                } else {
                    BackendError::Again
                });
            }
            self.pending -= 1;
            self.produced += 1;
            let len = 2 + self.produced;
            #[allow(clippy::cast_possible_truncation)]
            packet.fill(&vec![self.produced as u8; len]);
            Ok(())
        }
    }

    fn encoder_with(codec: ScriptedCodec) -> (AudioEncoder, Arc<Mutex<Script>>, Arc<BufferPool>) {
        let script = Arc::clone(&codec.script);
        let mut registry = BuiltinCodecs::empty();
        registry.register(Arc::new(codec));
        let pool = Arc::new(BufferPool::new(16));
        (
            AudioEncoder::new(Arc::clone(&pool), Arc::new(registry)),
            script,
            pool,
        )
    }

    fn planar_float_encoder() -> (AudioEncoder, Arc<Mutex<Script>>, Arc<BufferPool>) {
        encoder_with(ScriptedCodec::new(
            CodecId::PcmF32LePlanar,
            SampleFormat::F32Planar,
            960,
        ))
    }

    fn input_block(samples: &[i16]) -> ByteBuffer {
        let mut buf = ByteBuffer::with_capacity(samples.len() * 2);
        buf.set_used_size(samples.len() * 2).unwrap();
        write_i16_le(samples, buf.as_mut_slice());
        buf
    }

    fn assert_torn_down(encoder: &AudioEncoder) {
        assert!(!encoder.is_initialized());
        assert_eq!(encoder.codec(), AudioCodec::None);
        assert_eq!(encoder.sample_rate(), 0);
        assert_eq!(encoder.bit_rate(), 0);
        assert_eq!(encoder.sample_format(), None);
        assert_eq!(encoder.bytes_per_sample(), 0);
        assert_eq!(encoder.samples_per_frame(), 0);
        assert_eq!(encoder.input_buffer_byte_size(), 0);
        assert!(!encoder.has_extradata());
        assert!(encoder.extradata().is_none());
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_planar_float_silence() {
        let (mut encoder, script, _pool) = planar_float_encoder();
        encoder
            .initialize(AudioCodec::PcmFloatPlanar, 48_000, 128_000)
            .unwrap();

        assert_eq!(encoder.samples_per_frame(), 960);
        assert_eq!(encoder.input_buffer_byte_size(), 3840);
        assert_eq!(encoder.sample_format(), Some(SampleFormat::F32Planar));
        assert_eq!(encoder.bytes_per_sample(), 4);

        let packets = encoder.encode(&input_block(&[0; 1920]));
        assert_eq!(packets.len(), 1);

        let script = script.lock();
        assert_eq!(script.sent.len(), 1);
        let frame = &script.sent[0];
        assert_eq!(frame.plane_count(), 2);
        assert!(frame.planes().all(|p| read_f32_le(p).all(|s| s == 0.0)));
    }

    #[test]
    fn test_planar_int_layout_reaches_backend() {
        let (mut encoder, script, _pool) = encoder_with(ScriptedCodec::new(
            CodecId::PcmS16LePlanar,
            SampleFormat::S16Planar,
            4,
        ));
        encoder.initialize(AudioCodec::PcmPlanar, 44_100, 0).unwrap();

        encoder.try_encode(&input_block(&[1, -1, 2, -2, 3, -3, 4, -4])).unwrap();
        let script = script.lock();
        let frame = &script.sent[0];
        let left: Vec<i16> = read_i16_le(frame.plane(0).unwrap()).collect();
        let right: Vec<i16> = read_i16_le(frame.plane(1).unwrap()).collect();
        assert_eq!(left, [1, 2, 3, 4]);
        assert_eq!(right, [-1, -2, -3, -4]);
    }

    #[test]
    fn test_unknown_codec() {
        let (mut encoder, _script, _pool) = planar_float_encoder();
        let err = encoder.initialize(AudioCodec::None, 48_000, 0).unwrap_err();
        assert!(matches!(err, Error::UnknownCodec(AudioCodec::None)));
        assert_torn_down(&encoder);
    }

    #[test]
    fn test_codec_unavailable() {
        let (mut encoder, _script, _pool) = planar_float_encoder();
        let err = encoder.initialize(AudioCodec::Opus, 48_000, 0).unwrap_err();
        assert!(matches!(err, Error::CodecUnavailable(_)));
        assert_torn_down(&encoder);
    }

    #[test]
    fn test_unsupported_sample_rate() {
        let mut codec = ScriptedCodec::new(CodecId::PcmF32LePlanar, SampleFormat::F32Planar, 960);
        codec.rates = Some(vec![48_000]);
        let (mut encoder, _script, _pool) = encoder_with(codec);

        let err = encoder
            .initialize(AudioCodec::PcmFloatPlanar, 44_100, 0)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedSampleRate(44_100)));
        assert_torn_down(&encoder);

        encoder.initialize(AudioCodec::PcmFloatPlanar, 48_000, 0).unwrap();
        assert!(encoder.is_initialized());
    }

    #[test]
    fn test_unsupported_format() {
        let (mut encoder, _script, _pool) = encoder_with(ScriptedCodec::new(
            CodecId::PcmF32LePlanar,
            SampleFormat::S16,
            960,
        ));
        let err = encoder
            .initialize(AudioCodec::PcmFloatPlanar, 48_000, 0)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(SampleFormat::F32Planar)));
        assert_torn_down(&encoder);
    }

    #[test]
    fn test_open_failure() {
        let (mut encoder, script, _pool) = planar_float_encoder();
        script.lock().fail_open = true;
        let err = encoder
            .initialize(AudioCodec::PcmFloatPlanar, 48_000, 0)
            .unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert_torn_down(&encoder);
    }

    #[test]
    fn test_unrestricted_frame_size_uses_default() {
        let pool = Arc::new(BufferPool::default());
        let mut encoder = AudioEncoder::with_default_backends(pool);
        encoder.initialize(AudioCodec::Pcm, 44_100, 0).unwrap();
        assert_eq!(encoder.samples_per_frame(), DEFAULT_FRAME_SIZE);
        assert_eq!(encoder.input_buffer_byte_size(), DEFAULT_FRAME_SIZE * 4);
    }

    #[test]
    fn test_size_mismatch_leaves_encoder_usable() {
        let (mut encoder, script, _pool) = planar_float_encoder();
        encoder.initialize(AudioCodec::PcmFloatPlanar, 48_000, 0).unwrap();

        assert!(encoder.encode(&input_block(&[0; 1918])).is_empty());
        let err = encoder.try_encode(&input_block(&[0; 1922])).unwrap_err();
        assert!(matches!(
            err,
            Error::SampleCountMismatch {
                expected: 1920,
                provided: 1922
            }
        ));
        assert!(script.lock().sent.is_empty());

        assert_eq!(encoder.encode(&input_block(&[0; 1920])).len(), 1);
        assert_eq!(script.lock().sent.len(), 1);
    }

    #[test]
    fn test_drain_collects_in_order() {
        let (mut encoder, script, _pool) = planar_float_encoder();
        script.lock().packets_per_frame = 3;
        encoder.initialize(AudioCodec::PcmFloatPlanar, 48_000, 0).unwrap();

        let packets = encoder.encode(&input_block(&[0; 1920]));
        let sizes: Vec<usize> = packets.iter().map(ByteBuffer::used_size).collect();
        assert_eq!(sizes, [3, 4, 5]);
        assert_eq!(packets[2].as_slice(), &[3, 3, 3, 3, 3]);
    }

    #[test]
    fn test_drain_may_yield_nothing() {
        let (mut encoder, script, _pool) = planar_float_encoder();
        script.lock().packets_per_frame = 0;
        encoder.initialize(AudioCodec::PcmFloatPlanar, 48_000, 0).unwrap();
        assert!(encoder.try_encode(&input_block(&[0; 1920])).unwrap().is_empty());

        script.lock().end_with_eof = true;
        assert!(encoder.try_encode(&input_block(&[0; 1920])).unwrap().is_empty());
    }

    #[test]
    fn test_drain_failure_fails_call_and_recycles() {
        let (mut encoder, script, pool) = planar_float_encoder();
        {
            let mut script = script.lock();
            script.packets_per_frame = 3;
            script.fail_receive_after = Some(2);
        }
        encoder.initialize(AudioCodec::PcmFloatPlanar, 48_000, 0).unwrap();

        assert!(encoder.encode(&input_block(&[0; 1920])).is_empty());
        assert_eq!(pool.pooled(), 2);
        assert!(encoder.is_initialized());
    }

    #[test]
    fn test_send_failure_keeps_context() {
        let (mut encoder, script, _pool) = planar_float_encoder();
        encoder.initialize(AudioCodec::PcmFloatPlanar, 48_000, 0).unwrap();

        script.lock().fail_send = true;
        let err = encoder.try_encode(&input_block(&[0; 1920])).unwrap_err();
        assert!(matches!(err, Error::Backend(_)));

        script.lock().fail_send = false;
        assert_eq!(encoder.encode(&input_block(&[0; 1920])).len(), 1);
    }

    #[test]
    fn test_frame_copied_when_backend_holds_it() {
        let (mut encoder, script, _pool) = encoder_with(ScriptedCodec::new(
            CodecId::PcmS16Le,
            SampleFormat::S16,
            2,
        ));
        encoder.initialize(AudioCodec::Pcm, 8_000, 0).unwrap();

        encoder.encode(&input_block(&[1, 2, 3, 4]));
        encoder.encode(&input_block(&[5, 6, 7, 8]));

        let script = script.lock();
        let first: Vec<i16> = read_i16_le(script.sent[0].plane(0).unwrap()).collect();
        let second: Vec<i16> = read_i16_le(script.sent[1].plane(0).unwrap()).collect();
        assert_eq!(first, [1, 2, 3, 4]);
        assert_eq!(second, [5, 6, 7, 8]);
    }

    #[test]
    fn test_extradata_is_a_pooled_copy() {
        let mut codec = ScriptedCodec::new(CodecId::PcmF32LePlanar, SampleFormat::F32Planar, 960);
        codec.extradata = Some(vec![0xAB, 0xCD]);
        let (mut encoder, _script, _pool) = encoder_with(codec);

        assert!(!encoder.has_extradata());
        encoder.initialize(AudioCodec::PcmFloatPlanar, 48_000, 0).unwrap();
        assert!(encoder.has_extradata());
        assert_eq!(encoder.extradata().unwrap().as_slice(), &[0xAB, 0xCD]);

        let mut pcm = AudioEncoder::with_default_backends(Arc::new(BufferPool::default()));
        pcm.initialize(AudioCodec::PcmFloat, 48_000, 0).unwrap();
        assert!(!pcm.has_extradata());
        assert!(pcm.extradata().is_none());
    }

    #[test]
    fn test_deinitialize_is_idempotent() {
        let (mut encoder, _script, _pool) = planar_float_encoder();
        encoder.deinitialize();
        assert_torn_down(&encoder);

        encoder.initialize(AudioCodec::PcmFloatPlanar, 48_000, 64_000).unwrap();
        encoder.deinitialize();
        encoder.deinitialize();
        assert_torn_down(&encoder);
        assert!(encoder.encode(&input_block(&[0; 1920])).is_empty());
    }

    #[test]
    fn test_reinitialize_switches_codec() {
        let pool = Arc::new(BufferPool::default());
        let mut encoder = AudioEncoder::with_default_backends(pool);
        encoder.initialize(AudioCodec::PcmFloat, 48_000, 0).unwrap();
        encoder.initialize(AudioCodec::PcmPlanar, 22_050, 0).unwrap();

        assert_eq!(encoder.codec(), AudioCodec::PcmPlanar);
        assert_eq!(encoder.sample_rate(), 22_050);
        assert_eq!(encoder.sample_format(), Some(SampleFormat::S16Planar));
    }

    #[test]
    fn test_builtin_pcm_packet_layout() {
        let pool = Arc::new(BufferPool::default());
        let mut encoder = AudioEncoder::with_default_backends(pool);
        encoder.initialize(AudioCodec::PcmPlanar, 48_000, 0).unwrap();

        let samples: Vec<i16> = (0..2048).map(|i| i16::try_from(i).unwrap()).collect();
        let packets = encoder.encode(&input_block(&samples));
        assert_eq!(packets.len(), 1);

        let decoded: Vec<i16> = read_i16_le(packets[0].as_slice()).collect();
        let left: Vec<i16> = samples.iter().step_by(2).copied().collect();
        assert_eq!(&decoded[..1024], left.as_slice());
    }

    #[test]
    fn test_flush_finishes_stream() {
        let pool = Arc::new(BufferPool::default());
        let mut encoder = AudioEncoder::with_default_backends(pool);
        assert!(matches!(encoder.try_flush(), Err(Error::NotInitialized)));

        encoder.initialize(AudioCodec::Pcm, 48_000, 0).unwrap();
        assert!(encoder.try_flush().unwrap().is_empty());
        assert!(encoder.encode(&input_block(&[0; 2048])).is_empty());
    }
}
