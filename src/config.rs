// src/config.rs

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::engine::StreamRenderer;
use crate::event::IoSignature;
use crate::queue::TimeOrderedQueue;

/// Renderer settings, loadable from a schedule file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Bytes per item, one entry per output channel.
    pub item_sizes: Vec<usize>,
    /// Total samples to produce; `None` runs until the schedule is drained.
    pub max_length: Option<u64>,
    /// Samples requested per fill call when rendering offline.
    pub block_size: usize,
    pub sample_rate: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            item_sizes: vec![std::mem::size_of::<f32>()],
            max_length: None,
            block_size: 1024,
            sample_rate: 44100,
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            bail!("block_size must be at least 1");
        }
        if self.sample_rate == 0 {
            bail!("sample_rate must be non-zero");
        }
        self.signature()?;
        Ok(())
    }

    pub fn signature(&self) -> Result<IoSignature> {
        Ok(IoSignature::new(self.item_sizes.clone())?)
    }

    pub fn build_renderer(&self) -> Result<StreamRenderer> {
        self.validate()?;
        let mut renderer = StreamRenderer::new(TimeOrderedQueue::new(), self.signature()?);
        if let Some(max) = self.max_length {
            renderer.set_max_length(max);
        }
        Ok(renderer)
    }
}
