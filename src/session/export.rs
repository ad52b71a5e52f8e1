// src/session/export.rs

use anyhow::{Result, bail};
use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;

use super::Session;
use crate::engine::StreamRenderer;
use crate::queue::EventQueue;

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Render the session offline and write it as a 32-bit float WAV.
/// Returns the number of frames written.
///
/// With a max length the file holds exactly that many frames. Without one,
/// rendering stops at the first block boundary after the queue drains.
pub fn export_session_to_wav(session: &Session, output_path: &str) -> Result<u64> {
    let config = &session.manifest.config;
    if config.item_sizes.iter().any(|&size| size != F32_BYTES) {
        bail!("WAV export needs f32 channels, got item sizes {:?}", config.item_sizes);
    }
    let channels = u16::try_from(config.item_sizes.len())?;

    println!("🚀 Starting Export: {}", output_path);
    let mut renderer = session.build_renderer()?;
    let spec = WavSpec {
        channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(output_path, spec)?;

    let frames = render_blocks(&mut renderer, config.block_size, |block, produced| {
        for i in 0..produced {
            for channel in block {
                let at = i * F32_BYTES;
                let bytes = [channel[at], channel[at + 1], channel[at + 2], channel[at + 3]];
                writer.write_sample(f32::from_ne_bytes(bytes))?;
            }
        }
        Ok(())
    })?;

    writer.finalize()?;
    info!("exported {} frames to {}", frames, output_path);
    Ok(frames)
}

/// Drive `fill` in `block_size` steps, handing each produced block to `sink`.
pub fn render_blocks<F>(renderer: &mut StreamRenderer, block_size: usize, mut sink: F) -> Result<u64>
where
    F: FnMut(&[Vec<u8>], usize) -> Result<()>,
{
    let signature = renderer.signature().clone();
    let unbounded = renderer.max_length().is_none();
    let mut block: Vec<Vec<u8>> = (0..signature.channels())
        .map(|ch| vec![0u8; signature.bytes_for(ch, block_size)])
        .collect();

    let mut total_frames = 0u64;
    loop {
        if unbounded && renderer.queue().is_empty() {
            break;
        }

        let produced = {
            let mut outputs: Vec<&mut [u8]> = block.iter_mut().map(Vec::as_mut_slice).collect();
            renderer.fill(block_size, &mut outputs)?
        };
        if produced == 0 {
            break;
        }

        sink(&block, produced)?;
        total_frames += produced as u64;
    }
    Ok(total_frames)
}
