// src/event/mod.rs

pub mod handlers;
pub mod signature;

pub use handlers::{InsertVector, NoiseGenerator, ToneGenerator};
pub use signature::IoSignature;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::engine::buffers::EventBuffers;
use crate::error::{HandlerError, QueueError};

/// Identifier an event queue uses to recognise events and find their handler.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType(Cow<'static, str>);

impl EventType {
    /// Raw per-channel byte vectors.
    pub const GEN_VECTOR: EventType = EventType(Cow::Borrowed("gen_vector"));
    /// Per-channel f32 sample vectors.
    pub const GEN_VECTOR_F: EventType = EventType(Cow::Borrowed("gen_vector_f"));
    /// Per-channel complex f32 vectors, re/im interleaved.
    pub const GEN_VECTOR_C: EventType = EventType(Cow::Borrowed("gen_vector_c"));
    pub const TONE: EventType = EventType(Cow::Borrowed("tone"));
    pub const NOISE: EventType = EventType(Cow::Borrowed("noise"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Data a handler consumes while rendering an event.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Empty,
    /// One byte vector per output channel, already in the channel's item format.
    Vectors(Vec<Vec<u8>>),
    /// Generator parameters, decoded by the handler itself.
    Params(serde_json::Value),
}

/// The capability every event carries: render `event` into `buffers`.
///
/// `buffers` holds exactly `event.length()` items per channel. Whether those
/// bytes alias the host's output or a scratch allocation is not observable.
pub trait EventHandler: Send + Sync {
    fn run(&self, event: &Event, buffers: &mut EventBuffers<'_>) -> Result<(), HandlerError>;

    fn name(&self) -> &str;
}

/// A time-stamped, length-bounded unit of work.
#[derive(Clone)]
pub struct Event {
    time: u64,
    length: u64,
    kind: EventType,
    payload: Payload,
    handler: Option<Arc<dyn EventHandler>>,
    holdover: bool,
    sequence: Option<u64>,
}

impl Event {
    pub fn new(kind: EventType, time: u64, length: u64, payload: Payload) -> Result<Self, QueueError> {
        if length == 0 {
            return Err(QueueError::ZeroLength);
        }
        Ok(Self {
            time,
            length,
            kind,
            payload,
            handler: None,
            holdover: false,
            sequence: None,
        })
    }

    /// Attach a handler at creation time, bypassing the queue's type bindings.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Raw byte vectors, one per channel. The length is taken from channel 0.
    pub fn gen_vector(time: u64, channels: Vec<Vec<u8>>, signature: &IoSignature) -> Result<Self, QueueError> {
        let length = channels
            .first()
            .map(|bytes| bytes.len() / signature.item_size(0))
            .unwrap_or(0);
        Self::new(EventType::GEN_VECTOR, time, length as u64, Payload::Vectors(channels))
    }

    pub fn gen_vector_f(time: u64, channels: Vec<Vec<f32>>) -> Result<Self, QueueError> {
        let length = channels.first().map(Vec::len).unwrap_or(0);
        let bytes = channels
            .into_iter()
            .map(|samples| samples.iter().flat_map(|s| s.to_ne_bytes()).collect())
            .collect();
        Self::new(EventType::GEN_VECTOR_F, time, length as u64, Payload::Vectors(bytes))
    }

    pub fn gen_vector_c(time: u64, channels: Vec<Vec<(f32, f32)>>) -> Result<Self, QueueError> {
        let length = channels.first().map(Vec::len).unwrap_or(0);
        let bytes = channels
            .into_iter()
            .map(|samples| {
                samples
                    .iter()
                    .flat_map(|(re, im)| re.to_ne_bytes().into_iter().chain(im.to_ne_bytes()))
                    .collect()
            })
            .collect();
        Self::new(EventType::GEN_VECTOR_C, time, length as u64, Payload::Vectors(bytes))
    }

    /// The unrendered tail of an event that overflowed a fill call.
    pub(crate) fn holdover(time: u64, length: u64, tails: Vec<Vec<u8>>, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            time,
            length,
            kind: EventType::GEN_VECTOR,
            payload: Payload::Vectors(tails),
            handler: Some(handler),
            holdover: true,
            sequence: None,
        }
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// First sample index after the event.
    pub fn end(&self) -> u64 {
        self.time.saturating_add(self.length)
    }

    pub fn kind(&self) -> &EventType {
        &self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn handler(&self) -> Option<&Arc<dyn EventHandler>> {
        self.handler.as_ref()
    }

    /// True for the carried-over tail of an event split across fill calls.
    pub fn is_holdover(&self) -> bool {
        self.holdover
    }

    /// Insertion sequence assigned by the queue that last held this event.
    pub(crate) fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = Some(sequence);
    }

    pub(crate) fn bind_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handler = Some(handler);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("time", &self.time)
            .field("length", &self.length)
            .field("kind", &self.kind)
            .field("payload", &self.payload)
            .field("handler", &self.handler.as_ref().map(|h| h.name()))
            .field("holdover", &self.holdover)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_length_rejected() {
        let err = Event::new(EventType::TONE, 3, 0, Payload::Empty).unwrap_err();
        assert_eq!(err, QueueError::ZeroLength);

        let sig = IoSignature::f32(1).unwrap();
        assert!(Event::gen_vector(0, vec![vec![1, 2, 3]], &sig).is_err());
        assert!(Event::gen_vector_f(0, vec![]).is_err());
    }

    #[test]
    fn test_vector_lengths_follow_channel_zero() {
        let sig = IoSignature::new(vec![2, 4]).unwrap();
        let ev = Event::gen_vector(10, vec![vec![0; 8], vec![0; 16]], &sig).unwrap();
        assert_eq!(ev.length(), 4);
        assert_eq!(ev.end(), 14);
        assert_eq!(ev.kind(), &EventType::GEN_VECTOR);
        assert!(ev.handler().is_none());
    }

    #[test]
    fn test_typed_vectors_encode_native_bytes() {
        let ev = Event::gen_vector_f(0, vec![vec![1.5, -2.0]]).unwrap();
        assert_eq!(ev.length(), 2);
        let Payload::Vectors(chs) = ev.payload() else {
            panic!("expected vectors");
        };
        assert_eq!(&chs[0][..4], &1.5f32.to_ne_bytes());
        assert_eq!(&chs[0][4..], &(-2.0f32).to_ne_bytes());

        let ev = Event::gen_vector_c(0, vec![vec![(1.0, 2.0)]]).unwrap();
        assert_eq!(ev.length(), 1);
        let Payload::Vectors(chs) = ev.payload() else {
            panic!("expected vectors");
        };
        assert_eq!(chs[0].len(), 8);
        assert_eq!(&chs[0][4..], &2.0f32.to_ne_bytes());
    }

    #[test]
    fn test_event_type_display() {
        assert_eq!(EventType::GEN_VECTOR_C.to_string(), "gen_vector_c");
        assert_eq!(EventType::new("custom").name(), "custom");
    }
}
