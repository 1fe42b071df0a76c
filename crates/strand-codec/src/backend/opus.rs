//! Opus codec via libopus.

use std::collections::VecDeque;

use ::opus::{Application, Bitrate, Channels};
use strand_core::SampleFormat;
use tracing::{debug, trace};

use super::{BackendError, Codec, CodecId, CodecParams, DecoderContext, EncoderContext};
use crate::convert::{read_f32_le, write_f32_le};
use crate::frame::{NativeFrame, Packet};

const SAMPLE_RATES: [u32; 5] = [8_000, 12_000, 16_000, 24_000, 48_000];
const FORMATS: [SampleFormat; 1] = [SampleFormat::F32];

/// Largest packet libopus produces for one frame.
const MAX_PACKET_SIZE: usize = 4000;

/// 120 ms at 48 kHz, the longest frame a packet can carry.
const MAX_FRAME_SAMPLES: usize = 5760;

/// Encoder delay written to the `OpusHead` header.
const PRE_SKIP: u16 = 312;

fn opus_error(err: ::opus::Error) -> BackendError {
    BackendError::Failed(format!("opus: {err}"))
}

fn channels_for(count: usize) -> Result<Channels, BackendError> {
    match count {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        n => Err(BackendError::Failed(format!("opus supports 1 or 2 channels, got {n}"))),
    }
}

/// `OpusHead` identification header (RFC 7845, section 5.1).
fn opus_head(channels: usize, input_sample_rate: u32) -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1);
    #[allow(clippy::cast_possible_truncation)]
    head.push(channels as u8);
    head.extend_from_slice(&PRE_SKIP.to_le_bytes());
    head.extend_from_slice(&input_sample_rate.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes());
    head.push(0);
    head
}

/// Opus in 20 ms frames of interleaved floats.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpusCodec;

impl Codec for OpusCodec {
    fn id(&self) -> CodecId {
        CodecId::Opus
    }

    fn name(&self) -> &'static str {
        "libopus Opus"
    }

    fn supported_sample_rates(&self) -> Option<&[u32]> {
        Some(&SAMPLE_RATES)
    }

    fn supported_formats(&self) -> &[SampleFormat] {
        &FORMATS
    }

    fn open_encoder(&self, params: &CodecParams) -> Result<Box<dyn EncoderContext>, BackendError> {
        let channels = channels_for(params.channels)?;
        let mut encoder = ::opus::Encoder::new(params.sample_rate, channels, Application::Audio)
            .map_err(opus_error)?;

        if params.bit_rate > 0 {
            let bits = i32::try_from(params.bit_rate)
                .map_err(|_| BackendError::Failed(format!("bit rate {} too large", params.bit_rate)))?;
            encoder.set_bitrate(Bitrate::Bits(bits)).map_err(opus_error)?;
        }

        let frame_size = params.sample_rate as usize / 50;
        debug!(
            "Opened Opus encoder: {} Hz, {} bps, {} samples per frame",
            params.sample_rate, params.bit_rate, frame_size
        );

        Ok(Box::new(OpusEncoder {
            encoder,
            frame_size,
            channels: params.channels,
            extradata: opus_head(params.channels, params.sample_rate),
            scratch: Vec::with_capacity(frame_size * params.channels),
            pending: VecDeque::new(),
            finished: false,
        }))
    }

    fn open_decoder(
        &self,
        params: &CodecParams,
        _extradata: Option<&[u8]>,
    ) -> Result<Box<dyn DecoderContext>, BackendError> {
        let channels = channels_for(params.channels)?;
        let decoder = ::opus::Decoder::new(params.sample_rate, channels).map_err(opus_error)?;

        Ok(Box::new(OpusDecoder {
            decoder,
            channels: params.channels,
            scratch: vec![0.0; MAX_FRAME_SAMPLES * params.channels],
            pending: VecDeque::new(),
            finished: false,
        }))
    }
}

struct OpusEncoder {
    encoder: ::opus::Encoder,
    frame_size: usize,
    channels: usize,
    extradata: Vec<u8>,
    scratch: Vec<f32>,
    pending: VecDeque<Vec<u8>>,
    finished: bool,
}

impl EncoderContext for OpusEncoder {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn extradata(&self) -> Option<&[u8]> {
        Some(&self.extradata)
    }

    fn send_frame(&mut self, frame: &NativeFrame) -> Result<(), BackendError> {
        if self.finished {
            return Err(BackendError::Eof);
        }
        if frame.format() != SampleFormat::F32 || frame.samples() != self.frame_size {
            return Err(BackendError::Failed(format!(
                "expected {} {} samples, got {} {}",
                self.frame_size,
                SampleFormat::F32,
                frame.samples(),
                frame.format()
            )));
        }

        let plane = frame
            .plane(0)
            .ok_or_else(|| BackendError::Failed("frame has no data".into()))?;
        self.scratch.clear();
        self.scratch.extend(read_f32_le(plane));

        let mut out = vec![0u8; MAX_PACKET_SIZE];
        let len = self
            .encoder
            .encode_float(&self.scratch, &mut out)
            .map_err(opus_error)?;
        out.truncate(len);
        trace!("Opus packet of {len} bytes for {} channels", self.channels);

        self.pending.push_back(out);
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), BackendError> {
        self.finished = true;
        Ok(())
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> Result<(), BackendError> {
        match self.pending.pop_front() {
            Some(data) => {
                packet.fill(&data);
                Ok(())
            }
            None if self.finished => Err(BackendError::Eof),
            None => Err(BackendError::Again),
        }
    }
}

struct OpusDecoder {
    decoder: ::opus::Decoder,
    channels: usize,
    scratch: Vec<f32>,
    pending: VecDeque<NativeFrame>,
    finished: bool,
}

impl DecoderContext for OpusDecoder {
    fn send_packet(&mut self, data: &[u8]) -> Result<(), BackendError> {
        if self.finished {
            return Err(BackendError::Eof);
        }

        let samples = self
            .decoder
            .decode_float(data, &mut self.scratch, false)
            .map_err(opus_error)?;

        let decoded = &self.scratch[..samples * self.channels];
        let mut plane = vec![0u8; decoded.len() * 4];
        write_f32_le(decoded, &mut plane);

        let frame = NativeFrame::from_planes(SampleFormat::F32, samples, self.channels, vec![plane])
            .map_err(|e| BackendError::Failed(e.to_string()))?;
        self.pending.push_back(frame);
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), BackendError> {
        self.finished = true;
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<NativeFrame, BackendError> {
        self.pending.pop_front().ok_or(if self.finished {
            BackendError::Eof
        } else {
            BackendError::Again
        })
    }
}
