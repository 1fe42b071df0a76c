//! Audio output backends.
//!
//! An output backend opens a pull-based stream that drains a [`SharedRing`]
//! from the device's own thread. [`CpalBackend`] is the real device backend.

use strand_core::Result;

use crate::buffer::SharedRing;

/// Stream parameters requested from an output backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub sample_rate: u32,
    pub channels: u16,
    /// Device buffer size in frames.
    pub buffer_frames: u32,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            buffer_frames: 1024,
        }
    }
}

/// Opens output streams fed from a ring.
pub trait OutputBackend {
    /// Open a paused stream whose callback fills from `source`.
    fn open(&mut self, spec: &OutputSpec, source: SharedRing) -> Result<Box<dyn OutputStream>>;
}

/// An open output stream. Dropping it closes the device.
pub trait OutputStream {
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;
}

#[cfg(feature = "cpal")]
pub use self::device::{default_device_name, list_output_devices, CpalBackend};

#[cfg(feature = "cpal")]
mod device {
    use cpal::{
        traits::{DeviceTrait, HostTrait, StreamTrait},
        BufferSize, Device, Stream, StreamConfig, SupportedBufferSize,
    };
    use strand_core::{Error, Result};
    use tracing::{debug, error, info};

    use super::{OutputBackend, OutputSpec, OutputStream};
    use crate::buffer::SharedRing;

    /// Output through cpal's default host.
    #[derive(Debug, Default, Clone)]
    pub struct CpalBackend {
        device_name: Option<String>,
    }

    impl CpalBackend {
        /// Backend using the default output device.
        pub const fn new() -> Self {
            Self { device_name: None }
        }

        /// Backend using the output device with this name.
        pub fn with_device_name(name: impl Into<String>) -> Self {
            Self {
                device_name: Some(name.into()),
            }
        }

        fn device(&self) -> Result<Device> {
            let host = cpal::default_host();
            match &self.device_name {
                Some(name) => host
                    .output_devices()
                    .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
                    .find(|d| d.name().is_ok_and(|n| &n == name))
                    .ok_or_else(|| Error::AudioOutput(format!("Output device '{name}' not found"))),
                None => host
                    .default_output_device()
                    .ok_or_else(|| Error::AudioOutput("No output device found".to_string())),
            }
        }
    }

    impl OutputBackend for CpalBackend {
        fn open(&mut self, spec: &OutputSpec, source: SharedRing) -> Result<Box<dyn OutputStream>> {
            let device = self.device()?;
            let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            info!("Using audio output device: {device_name}");

            let config = StreamConfig {
                channels: spec.channels,
                sample_rate: cpal::SampleRate(spec.sample_rate),
                buffer_size: fixed_buffer_size(&device, spec),
            };
            debug!("Output config: {config:?}");

            let stream = device
                .build_output_stream(
                    &config,
                    // Under-runs are counted by the ring and reported by the producer.
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        source.fill_i16(data);
                    },
                    |err| {
                        error!("Audio stream error: {err}");
                    },
                    None,
                )
                .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))?;

            // Some hosts start streams on creation.
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {e}")))?;

            Ok(Box::new(CpalStream { stream }))
        }
    }

    /// Requested buffer size clamped to what the device reports for an i16
    /// stream with this layout.
    fn fixed_buffer_size(device: &Device, spec: &OutputSpec) -> BufferSize {
        let range = device.supported_output_configs().ok().and_then(|mut configs| {
            configs
                .find(|c| {
                    c.channels() == spec.channels
                        && c.sample_format() == cpal::SampleFormat::I16
                        && c.min_sample_rate().0 <= spec.sample_rate
                        && spec.sample_rate <= c.max_sample_rate().0
                })
                .and_then(|c| match c.buffer_size() {
                    SupportedBufferSize::Range { min, max } if min <= max => Some((*min, *max)),
                    _ => None,
                })
        });

        match range {
            Some((min, max)) => BufferSize::Fixed(spec.buffer_frames.clamp(min, max)),
            None => BufferSize::Fixed(spec.buffer_frames),
        }
    }

    struct CpalStream {
        stream: Stream,
    }

    impl OutputStream for CpalStream {
        fn play(&mut self) -> Result<()> {
            self.stream
                .play()
                .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))
        }

        fn pause(&mut self) -> Result<()> {
            self.stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {e}")))
        }
    }

    /// List available output devices.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
            .filter_map(|d| d.name().ok())
            .collect();

        Ok(devices)
    }

    /// Get the default output device name.
    pub fn default_device_name() -> Option<String> {
        let host = cpal::default_host();
        host.default_output_device().and_then(|d| d.name().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spec() {
        let spec = OutputSpec::default();
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.buffer_frames, 1024);
    }

    #[cfg(feature = "cpal")]
    #[test]
    fn test_list_devices() {
        // May fail on CI without audio hardware; must not panic.
        let _ = list_output_devices();
        let _ = default_device_name();
    }
}
