//! Encode → decode worker feeding the player.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use strand_codec::{AudioDecoder, AudioEncoder};
use strand_core::{AudioCodec, BufferPool, ByteBuffer, Error, Result};
use tracing::{debug, info};

use crate::source::PcmSource;

/// Cuts a stream of samples into blocks of exactly `block_bytes`.
pub struct Framer {
    block_bytes: usize,
    pending: Vec<u8>,
}

impl Framer {
    pub fn new(block_bytes: usize) -> Self {
        Self {
            block_bytes,
            pending: Vec::with_capacity(block_bytes),
        }
    }

    /// Append `samples`, returning every block that is now complete.
    pub fn push(&mut self, samples: &[i16], pool: &BufferPool) -> Vec<ByteBuffer> {
        self.pending
            .extend(samples.iter().flat_map(|s| s.to_le_bytes()));

        let mut blocks = Vec::new();
        if self.block_bytes == 0 {
            return blocks;
        }
        let complete = self.pending.len() / self.block_bytes * self.block_bytes;
        for chunk in self.pending[..complete].chunks_exact(self.block_bytes) {
            let mut block = pool.get_buffer(self.block_bytes);
            block.as_mut_slice().copy_from_slice(chunk);
            blocks.push(block);
        }
        self.pending.drain(..complete);
        blocks
    }

    /// The trailing partial block padded with silence, if any.
    pub fn finish(&mut self, pool: &BufferPool) -> Option<ByteBuffer> {
        if self.pending.is_empty() || self.block_bytes == 0 {
            return None;
        }
        let mut block = pool.get_buffer(self.block_bytes);
        let out = block.as_mut_slice();
        out[..self.pending.len()].copy_from_slice(&self.pending);
        out[self.pending.len()..].fill(0);
        self.pending.clear();
        Some(block)
    }
}

/// Codec settings for one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSpec {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub bit_rate: u64,
}

/// Totals reported when the worker finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub blocks: usize,
    pub packets: usize,
    pub encoded_bytes: usize,
    pub decoded_bytes: usize,
}

struct Pipeline {
    pool: Arc<BufferPool>,
    encoder: AudioEncoder,
    decoder: AudioDecoder,
    output: Sender<ByteBuffer>,
    stats: PipelineStats,
}

impl Pipeline {
    fn new(spec: PipelineSpec, pool: Arc<BufferPool>, output: Sender<ByteBuffer>) -> Result<Self> {
        let mut encoder = AudioEncoder::with_default_backends(Arc::clone(&pool));
        encoder.initialize(spec.codec, spec.sample_rate, spec.bit_rate)?;

        let mut decoder = AudioDecoder::with_default_backends(Arc::clone(&pool));
        let extradata = encoder.extradata();
        decoder.initialize(
            spec.codec,
            spec.sample_rate,
            extradata.as_ref().map(ByteBuffer::as_slice),
        )?;
        if let Some(extradata) = extradata {
            pool.free_buffer(extradata);
        }

        Ok(Self {
            pool,
            encoder,
            decoder,
            output,
            stats: PipelineStats::default(),
        })
    }

    /// Returns `false` once the receiving side is gone.
    fn process(&mut self, block: ByteBuffer) -> bool {
        let packets = self.encoder.encode(&block);
        self.pool.free_buffer(block);
        self.stats.blocks += 1;
        self.forward(packets)
    }

    fn forward(&mut self, packets: Vec<ByteBuffer>) -> bool {
        let mut packets = packets.into_iter();
        while let Some(packet) = packets.next() {
            self.stats.packets += 1;
            self.stats.encoded_bytes += packet.used_size();
            let decoded = self.decoder.decode(&packet);
            self.pool.free_buffer(packet);
            if !self.send(decoded) {
                self.pool.free_all(packets);
                return false;
            }
        }
        true
    }

    fn send(&mut self, blocks: Vec<ByteBuffer>) -> bool {
        let mut blocks = blocks.into_iter();
        while let Some(block) = blocks.next() {
            self.stats.decoded_bytes += block.used_size();
            if let Err(err) = self.output.send(block) {
                self.pool.free_buffer(err.into_inner());
                self.pool.free_all(blocks);
                return false;
            }
        }
        true
    }

    fn run(mut self, mut source: Box<dyn PcmSource>) -> Result<PipelineStats> {
        let mut framer = Framer::new(self.encoder.input_buffer_byte_size());
        debug!(
            "Pipeline running with {}-byte input blocks",
            self.encoder.input_buffer_byte_size()
        );

        while let Some(chunk) = source.next_chunk()? {
            let mut blocks = framer.push(&chunk, &self.pool).into_iter();
            while let Some(block) = blocks.next() {
                if !self.process(block) {
                    self.pool.free_all(blocks);
                    debug!("Output closed, stopping pipeline");
                    return Ok(self.stats);
                }
            }
        }

        if let Some(last) = framer.finish(&self.pool) {
            if !self.process(last) {
                return Ok(self.stats);
            }
        }

        let tail = self.encoder.flush();
        if self.forward(tail) {
            let rest = self.decoder.flush();
            self.send(rest);
        }
        Ok(self.stats)
    }
}

/// Run `source` through the encoder and decoder on a worker thread, sending
/// decoded PCM blocks to `output`. The channel closes when the worker ends.
pub fn spawn(
    source: Box<dyn PcmSource>,
    spec: PipelineSpec,
    pool: Arc<BufferPool>,
    output: Sender<ByteBuffer>,
) -> Result<JoinHandle<Result<PipelineStats>>> {
    std::thread::Builder::new()
        .name("strand-pipeline".to_string())
        .spawn(move || {
            let stats = Pipeline::new(spec, pool, output)?.run(source)?;
            info!(
                "Pipeline finished: {} blocks, {} packets, {} bytes encoded, {} bytes decoded",
                stats.blocks, stats.packets, stats.encoded_bytes, stats.decoded_bytes
            );
            Ok(stats)
        })
        .map_err(Error::from)
}
