// src/error.rs

use thiserror::Error;

use crate::event::EventType;

/// Errors raised by a handler while writing into its bound buffers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    #[error("payload shape not accepted by handler: {0}")]
    PayloadShape(String),
    #[error("handler expected {expected} channels, got {actual}")]
    ChannelCount { expected: usize, actual: usize },
    #[error("invalid handler params: {0}")]
    Params(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("an output signature needs at least one channel")]
    NoChannels,
    #[error("channel {channel} has a zero item size")]
    ZeroItemSize { channel: usize },
}

/// Errors raised by an event queue on insertion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueError {
    #[error("event type {0} is not registered")]
    UnknownEventType(EventType),
    #[error("events must carry at least one sample")]
    ZeroLength,
}

#[derive(Debug, Error)]
pub enum RenderError {
    /// The queue handed back an event that starts before the time cursor.
    #[error("event at {time} precedes time cursor {cursor}")]
    EventBeforeCursor { time: u64, cursor: u64 },
    #[error("event at {time} lies past the window end {end}")]
    EventAfterWindow { time: u64, end: u64 },
    #[error("no handler bound for event type {0}")]
    UnboundHandler(EventType),
    #[error("retrieved an event with zero length")]
    EmptyEvent,

    #[error("failed to allocate {bytes} scratch bytes for channel {channel}")]
    Allocation { channel: usize, bytes: usize },
    #[error("expected {expected} output channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("output channel {channel} holds {actual} bytes, {needed} needed")]
    BufferTooSmall {
        channel: usize,
        needed: usize,
        actual: usize,
    },
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),
    /// The queue refused a holdover produced during a fill call.
    #[error("queue rejected event: {0}")]
    Queue(#[from] QueueError),
}

impl RenderError {
    /// Contract violations that mean the queue or cursor is corrupt.
    /// Callers should stop streaming when this returns true.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::EventBeforeCursor { .. }
                | RenderError::EventAfterWindow { .. }
                | RenderError::UnboundHandler(_)
                | RenderError::EmptyEvent
                | RenderError::Queue(_)
        )
    }
}
