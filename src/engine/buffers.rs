// src/engine/buffers.rs

use crate::error::{HandlerError, RenderError};
use crate::event::IoSignature;

/// The write target bound to an event before its handler runs.
///
/// Holds one region per channel, each exactly `length` items long. The
/// regions are either a window into the host's output buffers or freshly
/// allocated scratch space; handlers see the same shape in both cases.
pub struct EventBuffers<'a> {
    regions: Vec<&'a mut [u8]>,
    item_sizes: &'a [usize],
    length: usize,
}

impl<'a> EventBuffers<'a> {
    /// Bind the sub-region `[offset, offset + length)` (in items) of each output channel.
    pub(crate) fn in_place(
        outputs: &'a mut [&mut [u8]],
        signature: &'a IoSignature,
        offset: usize,
        length: usize,
    ) -> Self {
        let regions = outputs
            .iter_mut()
            .enumerate()
            .map(|(ch, out)| {
                let start = signature.bytes_for(ch, offset);
                let end = start + signature.bytes_for(ch, length);
                &mut out[start..end]
            })
            .collect();

        Self {
            regions,
            item_sizes: signature.item_sizes(),
            length,
        }
    }

    pub fn channels(&self) -> usize {
        self.regions.len()
    }

    /// Items per channel.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn item_size(&self, channel: usize) -> usize {
        self.item_sizes[channel]
    }

    pub fn channel(&self, channel: usize) -> &[u8] {
        &self.regions[channel]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [u8] {
        &mut self.regions[channel]
    }

    /// Write `f(i)` as an f32 item at index `i` on every channel.
    pub fn write_f32_frames(&mut self, mut f: impl FnMut(usize) -> f32) -> Result<(), HandlerError> {
        let item = std::mem::size_of::<f32>();
        if let Some(ch) = self.item_sizes.iter().position(|&size| size != item) {
            return Err(HandlerError::PayloadShape(format!(
                "channel {ch} carries {}-byte items, f32 output needs {item}",
                self.item_sizes[ch]
            )));
        }

        for i in 0..self.length {
            let bytes = f(i).to_ne_bytes();
            for region in self.regions.iter_mut() {
                region[i * item..(i + 1) * item].copy_from_slice(&bytes);
            }
        }
        Ok(())
    }
}

/// Temporary per-channel storage for an event that overruns the output.
pub(crate) struct ScratchBuffers {
    channels: Vec<Vec<u8>>,
    length: usize,
}

impl ScratchBuffers {
    pub(crate) fn allocate(signature: &IoSignature, length: usize) -> Result<Self, RenderError> {
        let mut channels = Vec::with_capacity(signature.channels());
        for ch in 0..signature.channels() {
            let bytes = signature
                .item_size(ch)
                .checked_mul(length)
                .ok_or(RenderError::Allocation { channel: ch, bytes: usize::MAX })?;

            let mut buf = Vec::new();
            buf.try_reserve_exact(bytes)
                .map_err(|_| RenderError::Allocation { channel: ch, bytes })?;
            buf.resize(bytes, 0);
            channels.push(buf);
        }
        Ok(Self { channels, length })
    }

    pub(crate) fn bind<'a>(&'a mut self, signature: &'a IoSignature) -> EventBuffers<'a> {
        EventBuffers {
            regions: self.channels.iter_mut().map(Vec::as_mut_slice).collect(),
            item_sizes: signature.item_sizes(),
            length: self.length,
        }
    }

    /// Copy the first `usable` items of each channel into `outputs` at `offset`
    /// and hand back what remains, one tail per channel.
    pub(crate) fn split_into(
        self,
        outputs: &mut [&mut [u8]],
        signature: &IoSignature,
        offset: usize,
        usable: usize,
    ) -> Vec<Vec<u8>> {
        self.channels
            .into_iter()
            .zip(outputs.iter_mut())
            .enumerate()
            .map(|(ch, (mut scratch, out))| {
                let head = signature.bytes_for(ch, usable);
                let start = signature.bytes_for(ch, offset);
                out[start..start + head].copy_from_slice(&scratch[..head]);
                scratch.split_off(head)
            })
            .collect()
    }
}
