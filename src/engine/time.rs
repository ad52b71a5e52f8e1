// src/engine/time.rs

use crate::error::RenderError;

/// Max length used when no sample budget is configured.
pub const UNBOUNDED: u64 = u64::MAX;

/// Samples still allowed before the budget runs out.
pub fn remaining_budget(cursor: u64, max_length: u64) -> u64 {
    max_length.saturating_sub(cursor)
}

/// How many of `requested` samples a fill call may report as produced.
/// Never exceeds `requested` and reaches 0 once `cursor >= max_length`.
pub fn produced_length(requested: usize, cursor: u64, max_length: u64) -> usize {
    let remaining = remaining_budget(cursor, max_length);
    match usize::try_from(remaining) {
        Ok(remaining) => requested.min(remaining),
        Err(_) => requested,
    }
}

/// The half-open sample range `[start, start + len)` covered by one fill call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderWindow {
    start: u64,
    len: usize,
}

impl RenderWindow {
    pub fn new(cursor: u64, len: usize) -> Self {
        Self { start: cursor, len }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.len as u64)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buffer offset of an event starting at `time`.
    pub fn offset_of(&self, time: u64) -> Result<usize, RenderError> {
        if time < self.start {
            return Err(RenderError::EventBeforeCursor {
                time,
                cursor: self.start,
            });
        }
        if time >= self.end() {
            return Err(RenderError::EventAfterWindow { time, end: self.end() });
        }
        Ok((time - self.start) as usize)
    }

    /// True when `length` items written at `offset` stay inside the window.
    pub fn fits(&self, offset: usize, length: u64) -> bool {
        (offset as u64).saturating_add(length) <= self.len as u64
    }
}
