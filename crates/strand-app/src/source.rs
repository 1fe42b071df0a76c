//! PCM inputs for the pipeline.

use std::f64::consts::TAU;

use strand_audio::FileSource;
use strand_core::{Result, CHANNELS};

/// Produces interleaved stereo `i16` chunks of arbitrary length.
pub trait PcmSource: Send {
    fn sample_rate(&self) -> u32;

    /// Next chunk, `None` once the input is exhausted.
    fn next_chunk(&mut self) -> Result<Option<Vec<i16>>>;
}

impl PcmSource for FileSource {
    fn sample_rate(&self) -> u32 {
        Self::sample_rate(self)
    }

    fn next_chunk(&mut self) -> Result<Option<Vec<i16>>> {
        Self::next_chunk(self)
    }
}

/// A sine tone of fixed length.
pub struct Tone {
    sample_rate: u32,
    frequency: f64,
    amplitude: f64,
    remaining: usize,
    position: usize,
}

impl Tone {
    /// Frames generated per chunk.
    const CHUNK_FRAMES: usize = 1000;

    pub fn new(sample_rate: u32, frequency: f64, seconds: f64) -> Self {
        Self {
            sample_rate,
            frequency,
            amplitude: 0.25,
            remaining: (f64::from(sample_rate) * seconds).round() as usize,
            position: 0,
        }
    }
}

impl PcmSource for Tone {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn next_chunk(&mut self) -> Result<Option<Vec<i16>>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let frames = self.remaining.min(Self::CHUNK_FRAMES);
        let step = TAU * self.frequency / f64::from(self.sample_rate);
        let mut chunk = Vec::with_capacity(frames * CHANNELS);
        for i in 0..frames {
            let phase = step * (self.position + i) as f64;
            let sample = (phase.sin() * self.amplitude * f64::from(i16::MAX)).round() as i16;
            chunk.extend([sample; CHANNELS]);
        }

        self.position += frames;
        self.remaining -= frames;
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_tone_length() {
        let mut tone = Tone::new(8_000, 440.0, 0.5);
        let mut frames = 0;
        while let Some(chunk) = tone.next_chunk().unwrap() {
            assert_eq!(chunk.len() % CHANNELS, 0);
            frames += chunk.len() / CHANNELS;
        }
        assert_eq!(frames, 4_000);
        assert!(tone.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_tone_is_bounded_stereo() {
        let mut tone = Tone::new(48_000, 1_000.0, 0.01);
        let chunk = tone.next_chunk().unwrap().unwrap();
        assert_eq!(chunk[0], 0);
        for frame in chunk.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
            assert!(frame[0].unsigned_abs() <= 8_192);
        }
    }
}
