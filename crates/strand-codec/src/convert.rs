//! Conversion between canonical interleaved 16-bit PCM and native frames.
//!
//! The canonical layout is little-endian signed 16-bit, channels interleaved
//! (`L R L R ...`). Native frames use one of the layouts in
//! [`SampleFormat`]; every layout handled here has a dedicated routine and
//! all other formats are rejected with [`Error::UnsupportedFormat`].

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use strand_core::{Error, Result, SampleFormat, INPUT_BYTES_PER_SAMPLE};

use crate::frame::NativeFrame;

/// Full scale of a signed 16-bit sample.
pub const I16_FULL_SCALE: f32 = 32768.0;

/// Normalize a 16-bit sample to `[-1.0, 1.0)`.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / I16_FULL_SCALE
}

/// Scale a float sample back to 16 bits, rounding and clamping.
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * I16_FULL_SCALE)
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// Decode little-endian 16-bit samples.
pub fn read_i16_le(bytes: &[u8]) -> impl Iterator<Item = i16> + '_ {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
}

/// Decode little-endian 32-bit floats.
pub fn read_f32_le(bytes: &[u8]) -> impl Iterator<Item = f32> + '_ {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
}

/// Encode `samples` as little-endian bytes into the front of `out`.
///
/// Returns the number of bytes written.
pub fn write_i16_le(samples: &[i16], out: &mut [u8]) -> usize {
    let mut written = 0;
    for (dst, s) in out.chunks_exact_mut(2).zip(samples) {
        dst.copy_from_slice(&s.to_le_bytes());
        written += 2;
    }
    written
}

/// Encode `samples` as little-endian 32-bit floats into the front of `out`.
pub fn write_f32_le(samples: &[f32], out: &mut [u8]) -> usize {
    let mut written = 0;
    for (dst, s) in out.chunks_exact_mut(4).zip(samples) {
        dst.copy_from_slice(&s.to_le_bytes());
        written += 4;
    }
    written
}

/// Convert one canonical interleaved block into `frame`'s native layout.
///
/// `input` must hold exactly `frame.samples() * frame.channels()` samples and
/// the frame must be writable.
pub fn interleaved_to_native(input: &[u8], frame: &mut NativeFrame) -> Result<()> {
    check_sample_count(input.len(), frame)?;

    match frame.format() {
        SampleFormat::S16 => {
            frame.plane_mut(0)?.copy_from_slice(input);
            Ok(())
        }
        SampleFormat::S16Planar => deinterleave_s16(input, frame),
        SampleFormat::F32 => {
            s16_to_f32(input, frame.plane_mut(0)?);
            Ok(())
        }
        SampleFormat::F32Planar => deinterleave_s16_to_f32(input, frame),
        other => Err(Error::UnsupportedFormat(other)),
    }
}

/// Convert a native frame back into canonical interleaved 16-bit PCM.
///
/// `output` must be exactly `frame.samples() * frame.channels() * 2` bytes.
pub fn native_to_interleaved(frame: &NativeFrame, output: &mut [u8]) -> Result<()> {
    check_sample_count(output.len(), frame)?;

    match frame.format() {
        SampleFormat::S16 => {
            output.copy_from_slice(plane(frame, 0)?);
            Ok(())
        }
        SampleFormat::S16Planar => interleave_s16(frame, output),
        SampleFormat::F32 => {
            f32_to_s16(plane(frame, 0)?, output);
            Ok(())
        }
        SampleFormat::F32Planar => interleave_f32_to_s16(frame, output),
        other => Err(Error::UnsupportedFormat(other)),
    }
}

fn check_sample_count(canonical_bytes: usize, frame: &NativeFrame) -> Result<()> {
    let expected = frame.samples() * frame.channels();
    let provided = canonical_bytes / INPUT_BYTES_PER_SAMPLE;
    if provided != expected || canonical_bytes % INPUT_BYTES_PER_SAMPLE != 0 {
        return Err(Error::SampleCountMismatch { expected, provided });
    }
    Ok(())
}

fn plane(frame: &NativeFrame, index: usize) -> Result<&[u8]> {
    frame
        .plane(index)
        .ok_or_else(|| Error::InvalidArgument(format!("frame has no plane {index}")))
}

fn s16_to_f32(input: &[u8], plane: &mut [u8]) {
    for (dst, sample) in plane.chunks_exact_mut(4).zip(read_i16_le(input)) {
        dst.copy_from_slice(&i16_to_f32(sample).to_le_bytes());
    }
}

fn f32_to_s16(plane: &[u8], output: &mut [u8]) {
    for (dst, sample) in output.chunks_exact_mut(2).zip(read_f32_le(plane)) {
        dst.copy_from_slice(&f32_to_i16(sample).to_le_bytes());
    }
}

// native[ch][i] = input[i * channels + ch]
fn deinterleave_s16(input: &[u8], frame: &mut NativeFrame) -> Result<()> {
    let channels = frame.channels();
    let stride = channels * INPUT_BYTES_PER_SAMPLE;
    for ch in 0..channels {
        let offset = ch * INPUT_BYTES_PER_SAMPLE;
        let plane = frame.plane_mut(ch)?;
        for (dst, src) in plane.chunks_exact_mut(2).zip(input.chunks_exact(stride)) {
            dst.copy_from_slice(&src[offset..offset + 2]);
        }
    }
    Ok(())
}

fn deinterleave_s16_to_f32(input: &[u8], frame: &mut NativeFrame) -> Result<()> {
    let channels = frame.channels();
    let stride = channels * INPUT_BYTES_PER_SAMPLE;
    for ch in 0..channels {
        let offset = ch * INPUT_BYTES_PER_SAMPLE;
        let plane = frame.plane_mut(ch)?;
        for (dst, src) in plane.chunks_exact_mut(4).zip(input.chunks_exact(stride)) {
            let sample = i16::from_le_bytes([src[offset], src[offset + 1]]);
            dst.copy_from_slice(&i16_to_f32(sample).to_le_bytes());
        }
    }
    Ok(())
}

fn interleave_s16(frame: &NativeFrame, output: &mut [u8]) -> Result<()> {
    let channels = frame.channels();
    let stride = channels * INPUT_BYTES_PER_SAMPLE;
    for ch in 0..channels {
        let offset = ch * INPUT_BYTES_PER_SAMPLE;
        let src = plane(frame, ch)?;
        for (dst, sample) in output.chunks_exact_mut(stride).zip(src.chunks_exact(2)) {
            dst[offset..offset + 2].copy_from_slice(sample);
        }
    }
    Ok(())
}

fn interleave_f32_to_s16(frame: &NativeFrame, output: &mut [u8]) -> Result<()> {
    let channels = frame.channels();
    let stride = channels * INPUT_BYTES_PER_SAMPLE;
    for ch in 0..channels {
        let offset = ch * INPUT_BYTES_PER_SAMPLE;
        let src = plane(frame, ch)?;
        for (dst, sample) in output.chunks_exact_mut(stride).zip(read_f32_le(src)) {
            dst[offset..offset + 2].copy_from_slice(&f32_to_i16(sample).to_le_bytes());
        }
    }
    Ok(())
}
