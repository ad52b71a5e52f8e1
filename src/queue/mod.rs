// src/queue/mod.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use log::trace;

use crate::error::QueueError;
use crate::event::{Event, EventHandler, EventType};

/// Time-ordered store of pending events.
pub trait EventQueue {
    /// Declare a type the queue will accept. Registering twice is a no-op.
    fn register_event_type(&mut self, kind: EventType);

    /// Bind the handler used for events of `kind` that carry none of their own.
    /// The last binding wins.
    fn bind_handler(&mut self, kind: EventType, handler: Arc<dyn EventHandler>);

    /// Remove and return the earliest event with `min_time <= time < max_time`.
    fn fetch_next_event(&mut self, min_time: u64, max_time: u64) -> Option<Event>;

    fn add_event(&mut self, event: Event) -> Result<(), QueueError>;

    /// Put back an event this queue handed out, in the position it was fetched from.
    /// Queues without stable positions fall back to `add_event`.
    fn restore_event(&mut self, event: Event) -> Result<(), QueueError> {
        self.add_event(event)
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start time of the earliest pending event.
    fn next_time(&self) -> Option<u64>;
}

/// Sort key: start time, then holdovers before scheduled events, then insertion order.
type QueueKey = (u64, u8, u64);

fn key_of(event: &Event, sequence: u64) -> QueueKey {
    let rank = if event.is_holdover() { 0 } else { 1 };
    (event.time(), rank, sequence)
}

/// `EventQueue` backed by a `BTreeMap` keyed on start time and insertion sequence,
/// so events sharing a start time come back in insertion order.
///
/// A holdover continues an event that started earlier, so it is fetched ahead
/// of any scheduled event with the same start time.
#[derive(Default)]
pub struct TimeOrderedQueue {
    events: BTreeMap<QueueKey, Event>,
    next_seq: u64,
    registered: HashSet<EventType>,
    handlers: HashMap<EventType, Arc<dyn EventHandler>>,
}

impl TimeOrderedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, kind: &EventType) -> bool {
        self.registered.contains(kind)
    }

    /// Drop every pending event. Registrations and bindings are kept.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }
}

impl EventQueue for TimeOrderedQueue {
    fn register_event_type(&mut self, kind: EventType) {
        self.registered.insert(kind);
    }

    fn bind_handler(&mut self, kind: EventType, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(kind, handler);
    }

    fn fetch_next_event(&mut self, min_time: u64, max_time: u64) -> Option<Event> {
        if min_time >= max_time {
            return None;
        }
        let key = *self.events.range((min_time, 0, 0)..(max_time, 0, 0)).next()?.0;
        let mut event = self.events.remove(&key)?;

        // Handler bound after the event was queued.
        if event.handler().is_none() {
            if let Some(handler) = self.handlers.get(event.kind()) {
                event.bind_handler(handler.clone());
            }
        }
        trace!("fetched {} event at {} (window {}..{})", event.kind(), event.time(), min_time, max_time);
        Some(event)
    }

    fn add_event(&mut self, mut event: Event) -> Result<(), QueueError> {
        if !self.registered.contains(event.kind()) {
            return Err(QueueError::UnknownEventType(event.kind().clone()));
        }
        if event.length() == 0 {
            return Err(QueueError::ZeroLength);
        }
        if event.handler().is_none() {
            if let Some(handler) = self.handlers.get(event.kind()) {
                event.bind_handler(handler.clone());
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        event.set_sequence(seq);
        self.events.insert(key_of(&event, seq), event);
        Ok(())
    }

    fn restore_event(&mut self, event: Event) -> Result<(), QueueError> {
        let Some(seq) = event.sequence() else {
            return self.add_event(event);
        };
        let key = key_of(&event, seq);
        if seq >= self.next_seq || self.events.contains_key(&key) {
            return self.add_event(event);
        }
        self.events.insert(key, event);
        Ok(())
    }

    fn len(&self) -> usize {
        self.events.len()
    }

    fn next_time(&self) -> Option<u64> {
        self.events.keys().next().map(|(time, _, _)| *time)
    }
}
