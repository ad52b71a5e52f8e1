// src/lib.rs

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod queue;
pub mod session;

pub use config::RendererConfig;
pub use engine::{EventBuffers, StreamRenderer};
pub use error::{HandlerError, QueueError, RenderError};
pub use event::{Event, EventHandler, EventType, IoSignature, Payload};
pub use queue::{EventQueue, TimeOrderedQueue};
pub use session::Session;
