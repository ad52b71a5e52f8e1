// src/session/mod.rs

pub mod export;
pub mod serialization;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use serde_json::json;

use crate::engine::StreamRenderer;
use crate::event::{Event, EventType, IoSignature, NoiseGenerator, Payload, ToneGenerator};
use crate::queue::EventQueue;
use serialization::{ScheduleManifest, ScheduledEvent};

/// A loaded schedule, ready to be turned into a primed renderer.
pub struct Session {
    pub manifest: ScheduleManifest,
}

impl Session {
    pub fn new(manifest: ScheduleManifest) -> Self {
        Self { manifest }
    }

    pub fn load(path: &str) -> Result<Self> {
        let manifest = ScheduleManifest::load_from_disk(path)
            .with_context(|| format!("loading schedule {path}"))?;
        Ok(Self::new(manifest))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        self.manifest.save_to_disk(path)
    }

    /// Build a renderer from the schedule's config and queue every event on it.
    pub fn build_renderer(&self) -> Result<StreamRenderer> {
        let config = &self.manifest.config;
        let mut renderer = config.build_renderer()?;
        register_generators(renderer.queue_mut());

        let signature = renderer.signature().clone();
        for (index, scheduled) in self.manifest.events.iter().enumerate() {
            let event = to_event(scheduled, &signature, config.sample_rate)
                .with_context(|| format!("event #{index} at {}", scheduled.time()))?;
            renderer
                .schedule(event)
                .with_context(|| format!("event #{index} at {}", scheduled.time()))?;
        }

        info!(
            "session primed: {} events, {} channels, max length {:?}",
            renderer.queue().len(),
            signature.channels(),
            renderer.max_length()
        );
        Ok(renderer)
    }
}

/// Register the generator event types and bind their handlers.
pub fn register_generators<Q: EventQueue>(queue: &mut Q) {
    queue.register_event_type(EventType::TONE);
    queue.bind_handler(EventType::TONE, Arc::new(ToneGenerator));
    queue.register_event_type(EventType::NOISE);
    queue.bind_handler(EventType::NOISE, Arc::new(NoiseGenerator));
}

fn to_event(scheduled: &ScheduledEvent, signature: &IoSignature, sample_rate: u32) -> Result<Event> {
    let event = match scheduled {
        ScheduledEvent::Vector { time, channels } => Event::gen_vector(*time, channels.clone(), signature)?,
        ScheduledEvent::VectorF { time, channels } => Event::gen_vector_f(*time, channels.clone())?,
        ScheduledEvent::Tone {
            time,
            length,
            frequency,
            amplitude,
        } => {
            let params = json!({
                "frequency": frequency,
                "amplitude": amplitude,
                "sample_rate": sample_rate,
            });
            Event::new(EventType::TONE, *time, *length, Payload::Params(params))?
        }
        ScheduledEvent::Noise {
            time,
            length,
            amplitude,
            seed,
        } => {
            let params = json!({ "amplitude": amplitude, "seed": seed });
            Event::new(EventType::NOISE, *time, *length, Payload::Params(params))?
        }
    };
    Ok(event)
}
