// src/event/signature.rs

use crate::error::SignatureError;

/// Per-channel item sizes (in bytes) of a renderer's output streams.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IoSignature {
    item_sizes: Vec<usize>,
}

impl IoSignature {
    pub fn new(item_sizes: Vec<usize>) -> Result<Self, SignatureError> {
        if item_sizes.is_empty() {
            return Err(SignatureError::NoChannels);
        }
        if let Some(channel) = item_sizes.iter().position(|&size| size == 0) {
            return Err(SignatureError::ZeroItemSize { channel });
        }
        Ok(Self { item_sizes })
    }

    /// `channels` streams that all share one item size.
    pub fn uniform(channels: usize, item_size: usize) -> Result<Self, SignatureError> {
        Self::new(vec![item_size; channels])
    }

    /// Convenience for f32 streams.
    pub fn f32(channels: usize) -> Result<Self, SignatureError> {
        Self::uniform(channels, std::mem::size_of::<f32>())
    }

    pub fn channels(&self) -> usize {
        self.item_sizes.len()
    }

    pub fn item_size(&self, channel: usize) -> usize {
        self.item_sizes[channel]
    }

    pub fn item_sizes(&self) -> &[usize] {
        &self.item_sizes
    }

    /// Bytes needed to hold `items` items on `channel`.
    pub fn bytes_for(&self, channel: usize, items: usize) -> usize {
        self.item_sizes[channel] * items
    }

    /// `bytes_for` that reports overflow instead of wrapping.
    pub fn checked_bytes_for(&self, channel: usize, items: usize) -> Option<usize> {
        self.item_sizes[channel].checked_mul(items)
    }
}
