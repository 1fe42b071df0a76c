//! Raw PCM codecs, one per native layout.
//!
//! A packet is the frame's planes concatenated in channel order, so planar
//! packets carry all left samples followed by all right samples.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::VecDeque;
use std::sync::Arc;

use strand_core::SampleFormat;
use tracing::trace;

use super::{BackendError, Codec, CodecId, CodecParams, DecoderContext, EncoderContext};
use crate::frame::{NativeFrame, Packet};

/// Raw PCM codec with a single native format.
#[derive(Debug, Clone, Copy)]
pub struct PcmCodec {
    id: CodecId,
    format: [SampleFormat; 1],
    name: &'static str,
}

impl PcmCodec {
    pub const fn s16() -> Self {
        Self::new(CodecId::PcmS16Le, SampleFormat::S16, "PCM signed 16-bit little-endian")
    }

    pub const fn s16_planar() -> Self {
        Self::new(
            CodecId::PcmS16LePlanar,
            SampleFormat::S16Planar,
            "PCM signed 16-bit little-endian planar",
        )
    }

    pub const fn f32() -> Self {
        Self::new(CodecId::PcmF32Le, SampleFormat::F32, "PCM 32-bit float little-endian")
    }

    pub const fn f32_planar() -> Self {
        Self::new(
            CodecId::PcmF32LePlanar,
            SampleFormat::F32Planar,
            "PCM 32-bit float little-endian planar",
        )
    }

    /// Every PCM variant.
    pub const fn all() -> [Self; 4] {
        [Self::s16(), Self::s16_planar(), Self::f32(), Self::f32_planar()]
    }

    const fn new(id: CodecId, format: SampleFormat, name: &'static str) -> Self {
        Self {
            id,
            format: [format],
            name,
        }
    }

    fn check_params(&self, params: &CodecParams) -> Result<(), BackendError> {
        if params.sample_format != self.format[0] {
            return Err(BackendError::Failed(format!(
                "{} cannot use sample format {}",
                self.id, params.sample_format
            )));
        }
        if params.channels == 0 {
            return Err(BackendError::Failed("channel count must be non-zero".into()));
        }
        Ok(())
    }
}

impl Codec for PcmCodec {
    fn id(&self) -> CodecId {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn supported_sample_rates(&self) -> Option<&[u32]> {
        None
    }

    fn supported_formats(&self) -> &[SampleFormat] {
        &self.format
    }

    fn open_encoder(&self, params: &CodecParams) -> Result<Box<dyn EncoderContext>, BackendError> {
        self.check_params(params)?;
        Ok(Box::new(PcmEncoder {
            pending: VecDeque::new(),
            finished: false,
        }))
    }

    fn open_decoder(
        &self,
        params: &CodecParams,
        _extradata: Option<&[u8]>,
    ) -> Result<Box<dyn DecoderContext>, BackendError> {
        self.check_params(params)?;
        Ok(Box::new(PcmDecoder {
            format: self.format[0],
            channels: params.channels,
            pending: VecDeque::new(),
            finished: false,
        }))
    }
}

/// Holds references to submitted planes until they are pulled as packets.
struct PcmEncoder {
    pending: VecDeque<Vec<Arc<Vec<u8>>>>,
    finished: bool,
}

impl EncoderContext for PcmEncoder {
    fn frame_size(&self) -> usize {
        0
    }

    fn send_frame(&mut self, frame: &NativeFrame) -> Result<(), BackendError> {
        if self.finished {
            return Err(BackendError::Eof);
        }
        self.pending.push_back(frame.share_planes());
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), BackendError> {
        self.finished = true;
        Ok(())
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> Result<(), BackendError> {
        let Some(planes) = self.pending.pop_front() else {
            return Err(if self.finished {
                BackendError::Eof
            } else {
                BackendError::Again
            });
        };

        let data = packet.data_mut();
        data.clear();
        for plane in &planes {
            data.extend_from_slice(plane);
        }
        trace!("PCM packet of {} bytes", data.len());
        Ok(())
    }
}

struct PcmDecoder {
    format: SampleFormat,
    channels: usize,
    pending: VecDeque<NativeFrame>,
    finished: bool,
}

impl DecoderContext for PcmDecoder {
    fn send_packet(&mut self, data: &[u8]) -> Result<(), BackendError> {
        if self.finished {
            return Err(BackendError::Eof);
        }

        let block = self.channels * self.format.bytes_per_sample();
        if data.is_empty() || data.len() % block != 0 {
            return Err(BackendError::Failed(format!(
                "packet of {} bytes is not a whole number of {block}-byte sample blocks",
                data.len()
            )));
        }

        let samples = data.len() / block;
        let planes = if self.format.is_planar() {
            data.chunks_exact(data.len() / self.channels)
                .map(<[u8]>::to_vec)
                .collect()
        } else {
            vec![data.to_vec()]
        };

        let frame = NativeFrame::from_planes(self.format, samples, self.channels, planes)
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
