// src/event/handlers.rs

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Event, EventHandler, Payload};
use crate::engine::buffers::EventBuffers;
use crate::error::HandlerError;

/// Copies each channel's payload vector into the bound buffers.
/// Bound to the native vector types and to every holdover event.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertVector;

impl EventHandler for InsertVector {
    fn run(&self, event: &Event, buffers: &mut EventBuffers<'_>) -> Result<(), HandlerError> {
        let Payload::Vectors(channels) = event.payload() else {
            return Err(HandlerError::PayloadShape(
                "insert_vector needs per-channel vectors".to_string(),
            ));
        };
        if channels.len() != buffers.channels() {
            return Err(HandlerError::ChannelCount {
                expected: buffers.channels(),
                actual: channels.len(),
            });
        }

        for (ch, src) in channels.iter().enumerate() {
            let dst = buffers.channel_mut(ch);
            // Short vectors leave the rest of the region at its zeroed default.
            let n = src.len().min(dst.len());
            dst[..n].copy_from_slice(&src[..n]);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "insert_vector"
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToneParams {
    pub frequency: f32,
    pub amplitude: f32,
    pub sample_rate: u32,
}

/// Sine generator. Phase is taken from absolute sample time, so a tone split
/// across fill calls is identical to one rendered in a single buffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToneGenerator;

impl EventHandler for ToneGenerator {
    fn run(&self, event: &Event, buffers: &mut EventBuffers<'_>) -> Result<(), HandlerError> {
        let params: ToneParams = decode_params(event)?;
        if params.sample_rate == 0 {
            return Err(HandlerError::Params("sample_rate must be non-zero".to_string()));
        }

        let step = params.frequency as f64 / params.sample_rate as f64;
        let start = event.time();
        buffers.write_f32_frames(|i| {
            let t = (start + i as u64) as f64;
            let phase = (t * step).fract();
            (phase * std::f64::consts::TAU).sin() as f32 * params.amplitude
        })
    }

    fn name(&self) -> &str {
        "tone"
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    pub amplitude: f32,
    #[serde(default)]
    pub seed: u64,
}

/// Uniform white noise from a seeded generator, identical on every channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoiseGenerator;

impl EventHandler for NoiseGenerator {
    fn run(&self, event: &Event, buffers: &mut EventBuffers<'_>) -> Result<(), HandlerError> {
        let params: NoiseParams = decode_params(event)?;
        let mut rng = StdRng::seed_from_u64(params.seed);
        buffers.write_f32_frames(|_| rng.random_range(-1.0f32..=1.0) * params.amplitude)
    }

    fn name(&self) -> &str {
        "noise"
    }
}

fn decode_params<T: for<'de> Deserialize<'de>>(event: &Event) -> Result<T, HandlerError> {
    match event.payload() {
        Payload::Params(value) => {
            serde_json::from_value(value.clone()).map_err(|e| HandlerError::Params(e.to_string()))
        }
        _ => Err(HandlerError::PayloadShape(format!(
            "{} events need a params payload",
            event.kind()
        ))),
    }
}
