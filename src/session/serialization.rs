use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use anyhow::Result;

use crate::config::RendererConfig;

// One scheduled event, tagged by kind in JSON: { "kind": "tone", "time": 0, ... }
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduledEvent {
    /// Raw bytes per channel, already in each channel's item format.
    Vector { time: u64, channels: Vec<Vec<u8>> },
    /// f32 samples per channel.
    VectorF { time: u64, channels: Vec<Vec<f32>> },
    Tone {
        time: u64,
        length: u64,
        frequency: f32,
        amplitude: f32,
    },
    Noise {
        time: u64,
        length: u64,
        amplitude: f32,
        #[serde(default)]
        seed: u64,
    },
}

impl ScheduledEvent {
    pub fn time(&self) -> u64 {
        match self {
            ScheduledEvent::Vector { time, .. }
            | ScheduledEvent::VectorF { time, .. }
            | ScheduledEvent::Tone { time, .. }
            | ScheduledEvent::Noise { time, .. } => *time,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScheduleManifest {
    pub version: u32,
    #[serde(default)]
    pub config: RendererConfig,
    pub events: Vec<ScheduledEvent>,
}

impl ScheduleManifest {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            version: 1,
            config,
            events: Vec::new(),
        }
    }

    pub fn save_to_disk(&self, path: &str) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_from_disk(path: &str) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let manifest = serde_json::from_reader(reader)?;
        Ok(manifest)
    }
}
