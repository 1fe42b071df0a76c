//! Native sample frames and compressed packet holders.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::Arc;

use strand_core::{Error, Result, SampleFormat};

/// One block of samples in a codec's native layout.
///
/// Interleaved formats use a single plane of `samples * channels` values;
/// planar formats use one plane of `samples` values per channel. Planes are
/// reference counted so a backend can hold on to a submitted frame. Writing
/// therefore requires [`NativeFrame::make_writable`] first, which copies any
/// plane that is still shared.
#[derive(Debug, Clone)]
pub struct NativeFrame {
    format: SampleFormat,
    channels: usize,
    samples: usize,
    planes: Vec<Arc<Vec<u8>>>,
}

impl NativeFrame {
    /// Allocate a zeroed frame of `samples` per channel.
    pub fn new(format: SampleFormat, samples: usize, channels: usize) -> Self {
        let plane_size = Self::plane_size_for(format, samples, channels);
        let plane_count = if format.is_planar() { channels } else { 1 };
        let planes = (0..plane_count)
            .map(|_| Arc::new(vec![0u8; plane_size]))
            .collect();

        Self {
            format,
            channels,
            samples,
            planes,
        }
    }

    /// Wrap already filled planes, checking that their count and sizes match
    /// the layout.
    pub fn from_planes(
        format: SampleFormat,
        samples: usize,
        channels: usize,
        planes: Vec<Vec<u8>>,
    ) -> Result<Self> {
        let expected_planes = if format.is_planar() { channels } else { 1 };
        let plane_size = Self::plane_size_for(format, samples, channels);

        if planes.len() != expected_planes {
            return Err(Error::InvalidArgument(format!(
                "{format} frame needs {expected_planes} planes, got {}",
                planes.len()
            )));
        }
        if let Some(bad) = planes.iter().find(|p| p.len() != plane_size) {
            return Err(Error::InvalidArgument(format!(
                "{format} plane must be {plane_size} bytes, got {}",
                bad.len()
            )));
        }

        Ok(Self {
            format,
            channels,
            samples,
            planes: planes.into_iter().map(Arc::new).collect(),
        })
    }

    const fn plane_size_for(format: SampleFormat, samples: usize, channels: usize) -> usize {
        if format.is_planar() {
            samples * format.bytes_per_sample()
        } else {
            samples * channels * format.bytes_per_sample()
        }
    }

    /// Native sample format.
    pub const fn format(&self) -> SampleFormat {
        self.format
    }

    /// Number of channels.
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Samples per channel.
    pub const fn samples(&self) -> usize {
        self.samples
    }

    /// Number of planes (1 for interleaved formats).
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Size of every plane in bytes.
    pub const fn plane_size(&self) -> usize {
        Self::plane_size_for(self.format, self.samples, self.channels)
    }

    /// Read access to plane `index`.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        self.planes.get(index).map(|p| p.as_slice())
    }

    /// Iterate over all planes in channel order.
    pub fn planes(&self) -> impl Iterator<Item = &[u8]> {
        self.planes.iter().map(|p| p.as_slice())
    }

    /// Take an extra reference to every plane without copying.
    pub fn share_planes(&self) -> Vec<Arc<Vec<u8>>> {
        self.planes.clone()
    }

    /// Whether every plane is exclusively owned by this frame.
    pub fn is_writable(&self) -> bool {
        self.planes.iter().all(|p| Arc::strong_count(p) == 1)
    }

    /// Ensure every plane is exclusively owned, copying shared ones.
    ///
    /// Returns the number of planes that had to be copied.
    pub fn make_writable(&mut self) -> usize {
        let mut copied = 0;
        for plane in &mut self.planes {
            if Arc::strong_count(plane) > 1 {
                copied += 1;
            }
            Arc::make_mut(plane);
        }
        copied
    }

    /// Write access to plane `index`. Fails while the plane is shared.
    pub fn plane_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        let plane = self.planes.get_mut(index).ok_or_else(|| {
            Error::InvalidArgument(format!("plane {index} out of range"))
        })?;
        Arc::get_mut(plane)
            .map(Vec::as_mut_slice)
            .ok_or(Error::FrameNotWritable(index))
    }
}

/// Reusable holder for one compressed packet.
#[derive(Debug, Default)]
pub struct Packet {
    data: Vec<u8>,
}

impl Packet {
    /// Create an empty packet holder.
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Packet payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check whether the holder is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop the payload, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Replace the payload with `bytes`.
    pub fn fill(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
    }

    /// Mutable access for backends that write in place.
    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planar_layout() {
        let frame = NativeFrame::new(SampleFormat::F32Planar, 960, 2);
        assert_eq!(frame.plane_count(), 2);
        assert_eq!(frame.plane_size(), 960 * 4);
        assert!(frame.planes().all(|p| p.iter().all(|&b| b == 0)));
    }

    #[test]
    fn test_interleaved_layout() {
        let frame = NativeFrame::new(SampleFormat::S16, 1024, 2);
        assert_eq!(frame.plane_count(), 1);
        assert_eq!(frame.plane_size(), 1024 * 2 * 2);
        assert!(frame.plane(1).is_none());
    }

    #[test]
    fn test_copy_on_write() {
        let mut frame = NativeFrame::new(SampleFormat::S16Planar, 4, 2);
        frame.plane_mut(0).unwrap()[0] = 7;

        let held = frame.share_planes();
        assert!(!frame.is_writable());
        assert!(matches!(frame.plane_mut(0), Err(Error::FrameNotWritable(0))));

        assert_eq!(frame.make_writable(), 2);
        assert!(frame.is_writable());
        frame.plane_mut(0).unwrap()[0] = 9;

        // The held reference still sees the old contents.
        assert_eq!(held[0][0], 7);
        assert_eq!(frame.plane(0).unwrap()[0], 9);
        assert_eq!(frame.make_writable(), 0);
    }

    #[test]
    fn test_from_planes_validates() {
        let ok = NativeFrame::from_planes(SampleFormat::S16, 2, 2, vec![vec![0; 8]]);
        assert!(ok.is_ok());

        let wrong_count =
            NativeFrame::from_planes(SampleFormat::S16Planar, 2, 2, vec![vec![0; 4]]);
        assert!(wrong_count.is_err());

        let wrong_size = NativeFrame::from_planes(SampleFormat::F32, 2, 2, vec![vec![0; 8]]);
        assert!(wrong_size.is_err());
    }

    #[test]
    fn test_packet_holder() {
        let mut packet = Packet::new();
        assert!(packet.is_empty());
        packet.fill(&[1, 2, 3]);
        assert_eq!(packet.len(), 3);
        packet.clear();
        assert!(packet.is_empty());
    }
}
