// src/engine/mod.rs

pub mod buffers;
pub mod time;

pub use buffers::EventBuffers;
pub use time::{RenderWindow, UNBOUNDED};

use std::sync::Arc;

use log::{debug, trace, warn};

use crate::error::{QueueError, RenderError};
use crate::event::{Event, EventHandler, EventType, InsertVector, IoSignature};
use crate::queue::{EventQueue, TimeOrderedQueue};
use buffers::ScratchBuffers;

/// Events taken from the queue during one fill call, plus the holdovers they spawned.
#[derive(Default)]
struct FillPass {
    consumed: Vec<Event>,
    holdovers: Vec<Event>,
}

/// Turns queued events into a gap-free multi-channel sample stream, one
/// host buffer at a time.
pub struct StreamRenderer<Q: EventQueue = TimeOrderedQueue> {
    queue: Q,
    signature: IoSignature,
    time: u64,
    max_length: u64,
    insert_handler: Arc<dyn EventHandler>,
}

impl<Q: EventQueue> StreamRenderer<Q> {
    /// Take ownership of `queue` and register the native vector event types on it.
    pub fn new(mut queue: Q, signature: IoSignature) -> Self {
        let insert_handler: Arc<dyn EventHandler> = Arc::new(InsertVector);
        for kind in [EventType::GEN_VECTOR, EventType::GEN_VECTOR_F, EventType::GEN_VECTOR_C] {
            queue.register_event_type(kind.clone());
            queue.bind_handler(kind, insert_handler.clone());
        }

        Self {
            queue,
            signature,
            time: 0,
            max_length: UNBOUNDED,
            insert_handler,
        }
    }

    /// Cap the total number of samples this renderer will ever produce.
    /// Takes effect on the next `fill`.
    pub fn set_max_length(&mut self, max_length: u64) {
        self.max_length = max_length;
    }

    pub fn clear_max_length(&mut self) {
        self.max_length = UNBOUNDED;
    }

    pub fn max_length(&self) -> Option<u64> {
        (self.max_length != UNBOUNDED).then_some(self.max_length)
    }

    /// Absolute sample index where the next fill call starts.
    pub fn current_time(&self) -> u64 {
        self.time
    }

    /// True once the sample budget is used up.
    pub fn is_finished(&self) -> bool {
        time::remaining_budget(self.time, self.max_length) == 0
    }

    pub fn signature(&self) -> &IoSignature {
        &self.signature
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    pub fn into_queue(self) -> Q {
        self.queue
    }

    pub fn schedule(&mut self, event: Event) -> Result<(), QueueError> {
        self.queue.add_event(event)
    }

    /// Render `requested` samples per channel into `outputs` and return how many
    /// count as produced. `Ok(0)` after the budget is spent means end of stream.
    ///
    /// Only the part of the request inside the sample budget is rendered. The
    /// rest of the outputs stays zeroed and events starting there stay queued.
    ///
    /// On a recoverable error the call is undone: consumed events go back to the
    /// queue, the cursor stays put and the outputs are left zeroed.
    pub fn fill(&mut self, requested: usize, outputs: &mut [&mut [u8]]) -> Result<usize, RenderError> {
        self.check_outputs(requested, outputs)?;
        if requested == 0 {
            return Ok(0);
        }

        self.zero_outputs(requested, outputs);
        let budget = time::produced_length(requested, self.time, self.max_length);
        if budget == 0 {
            trace!("budget spent at {}, producing nothing", self.time);
            return Ok(0);
        }

        let window = RenderWindow::new(self.time, budget);
        trace!("fill window {}..{}", window.start(), window.end());

        let mut pass = FillPass::default();
        if let Err(err) = self.render_window(window, outputs, &mut pass) {
            if !err.is_fatal() {
                warn!("fill at {} failed, restoring {} events: {}", self.time, pass.consumed.len(), err);
                self.rollback(pass, requested, outputs);
            }
            return Err(err);
        }

        // Holdovers start at or after the window end, so queueing them only
        // now is indistinguishable from queueing them mid-pass.
        for holdover in pass.holdovers {
            self.queue.add_event(holdover)?;
        }

        self.time = window.end();
        Ok(window.len())
    }

    fn render_window(
        &mut self,
        window: RenderWindow,
        outputs: &mut [&mut [u8]],
        pass: &mut FillPass,
    ) -> Result<(), RenderError> {
        while let Some(event) = self.queue.fetch_next_event(window.start(), window.end()) {
            let result = self.dispatch(&event, window, outputs, &mut pass.holdovers);
            pass.consumed.push(event);
            result?;
        }
        Ok(())
    }

    fn dispatch(
        &self,
        event: &Event,
        window: RenderWindow,
        outputs: &mut [&mut [u8]],
        holdovers: &mut Vec<Event>,
    ) -> Result<(), RenderError> {
        let offset = window.offset_of(event.time())?;
        if event.length() == 0 {
            return Err(RenderError::EmptyEvent);
        }
        let handler = event
            .handler()
            .ok_or_else(|| RenderError::UnboundHandler(event.kind().clone()))?;

        if window.fits(offset, event.length()) {
            debug!("{} at {}: in place, offset {} length {}", event.kind(), event.time(), offset, event.length());
            let mut bound = EventBuffers::in_place(outputs, &self.signature, offset, event.length() as usize);
            handler.run(event, &mut bound)?;
            return Ok(());
        }

        // The event runs past the end of the window, so render it whole into
        // scratch, keep what fits and carry the rest forward.
        let length = usize::try_from(event.length())
            .map_err(|_| RenderError::Allocation { channel: 0, bytes: usize::MAX })?;
        let mut scratch = ScratchBuffers::allocate(&self.signature, length)?;
        handler.run(event, &mut scratch.bind(&self.signature))?;

        let usable = window.len() - offset;
        let leftover = length - usable;
        let tails = scratch.split_into(outputs, &self.signature, offset, usable);

        debug!(
            "{} at {}: out of place, {} usable, {} held over",
            event.kind(),
            event.time(),
            usable,
            leftover
        );
        if leftover > 0 {
            let start = event.time() + usable as u64;
            holdovers.push(Event::holdover(start, leftover as u64, tails, self.insert_handler.clone()));
        }
        Ok(())
    }

    fn rollback(&mut self, pass: FillPass, requested: usize, outputs: &mut [&mut [u8]]) {
        for event in pass.consumed {
            if let Err(err) = self.queue.restore_event(event) {
                warn!("could not restore event after failed fill: {}", err);
            }
        }
        self.zero_outputs(requested, outputs);
    }

    fn check_outputs(&self, requested: usize, outputs: &[&mut [u8]]) -> Result<(), RenderError> {
        if outputs.len() != self.signature.channels() {
            return Err(RenderError::ChannelMismatch {
                expected: self.signature.channels(),
                actual: outputs.len(),
            });
        }
        for (ch, out) in outputs.iter().enumerate() {
            let needed = self.signature.checked_bytes_for(ch, requested).unwrap_or(usize::MAX);
            if out.len() < needed {
                return Err(RenderError::BufferTooSmall {
                    channel: ch,
                    needed,
                    actual: out.len(),
                });
            }
        }
        Ok(())
    }

    fn zero_outputs(&self, requested: usize, outputs: &mut [&mut [u8]]) {
        for (ch, out) in outputs.iter_mut().enumerate() {
            out[..self.signature.bytes_for(ch, requested)].fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::event::Payload;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn renderer(channels: usize) -> StreamRenderer {
        StreamRenderer::new(TimeOrderedQueue::new(), IoSignature::uniform(channels, 1).unwrap())
    }

    fn ramp(time: u64, length: usize, base: u8) -> Event {
        let sig = IoSignature::uniform(1, 1).unwrap();
        let bytes = (0..length).map(|i| base.wrapping_add(i as u8)).collect();
        Event::gen_vector(time, vec![bytes], &sig).unwrap()
    }

    fn fill(r: &mut StreamRenderer, requested: usize) -> (usize, Vec<u8>) {
        let mut out = vec![0xAAu8; requested];
        let produced = r.fill(requested, &mut [out.as_mut_slice()]).unwrap();
        (produced, out)
    }

    /// Records whether it was handed the host buffer or scratch.
    struct ModeProbe {
        runs: AtomicUsize,
        lengths: std::sync::Mutex<Vec<usize>>,
    }

    impl EventHandler for ModeProbe {
        fn run(&self, event: &Event, buffers: &mut EventBuffers<'_>) -> Result<(), HandlerError> {
            self.runs.fetch_add(1, Ordering::Relaxed);
            self.lengths.lock().unwrap().push(buffers.length());
            assert_eq!(buffers.length() as u64, event.length());
            buffers.channel_mut(0).fill(1);
            Ok(())
        }

        fn name(&self) -> &str {
            "mode_probe"
        }
    }

    struct Failing;

    impl EventHandler for Failing {
        fn run(&self, _event: &Event, buffers: &mut EventBuffers<'_>) -> Result<(), HandlerError> {
            buffers.channel_mut(0).fill(0xFF);
            Err(HandlerError::Params("boom".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_event_fits_in_place() {
        let mut r = renderer(1);
        r.schedule(ramp(10, 20, 1)).unwrap();

        let (produced, out) = fill(&mut r, 100);
        assert_eq!(produced, 100);
        assert_eq!(r.current_time(), 100);
        assert!(out[..10].iter().all(|&b| b == 0));
        assert_eq!(&out[10..30], &(1..=20).collect::<Vec<u8>>()[..]);
        assert!(out[30..].iter().all(|&b| b == 0));
        assert!(r.queue().is_empty());
    }

    #[test]
    fn test_overflow_spawns_holdover() {
        let mut r = renderer(1);
        r.schedule(ramp(40, 30, 1)).unwrap();

        let (produced, out) = fill(&mut r, 50);
        assert_eq!(produced, 50);
        assert_eq!(&out[40..50], &(1..=10).collect::<Vec<u8>>()[..]);
        assert_eq!(r.queue().len(), 1);
        assert_eq!(r.queue().next_time(), Some(50));

        let (_, out) = fill(&mut r, 50);
        assert_eq!(&out[..20], &(11..=30).collect::<Vec<u8>>()[..]);
        assert!(out[20..].iter().all(|&b| b == 0));
        assert!(r.queue().is_empty());
    }

    #[test]
    fn test_dispatch_mode_boundaries() {
        let probe = Arc::new(ModeProbe {
            runs: AtomicUsize::new(0),
            lengths: Default::default(),
        });
        let mut r = renderer(1);
        // offset + length == requested: fits exactly, no holdover.
        let exact = Event::new(EventType::GEN_VECTOR, 80, 20, Payload::Empty)
            .unwrap()
            .with_handler(probe.clone());
        r.schedule(exact).unwrap();
        let (_, out) = fill(&mut r, 100);
        assert!(out[80..].iter().all(|&b| b == 1));
        assert!(r.queue().is_empty());

        // One sample over: scratch of the full length, one sample held over.
        let over = Event::new(EventType::GEN_VECTOR, 180, 21, Payload::Empty)
            .unwrap()
            .with_handler(probe.clone());
        r.schedule(over).unwrap();
        let (_, out) = fill(&mut r, 100);
        assert!(out[80..].iter().all(|&b| b == 1));
        assert_eq!(r.queue().next_time(), Some(200));
        assert_eq!(r.queue().iter().next().map(|e| e.length()), Some(1));

        // Event on the last sample of the window.
        let last = Event::new(EventType::GEN_VECTOR, 299, 5, Payload::Empty)
            .unwrap()
            .with_handler(probe.clone());
        r.schedule(last).unwrap();
        let (_, out) = fill(&mut r, 100);
        assert_eq!(out[0], 1);
        assert_eq!(out[99], 1);
        assert!(out[1..99].iter().all(|&b| b == 0));

        assert_eq!(probe.runs.load(Ordering::Relaxed), 3);
        assert_eq!(*probe.lengths.lock().unwrap(), vec![20, 21, 5]);

        let (_, out) = fill(&mut r, 10);
        assert_eq!(&out[..4], &[1, 1, 1, 1]);
        assert!(out[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_cap_stops_production() {
        let mut r = renderer(1);
        r.set_max_length(80);
        assert_eq!(r.max_length(), Some(80));
        r.schedule(ramp(70, 5, 1)).unwrap();
        r.schedule(ramp(90, 5, 1)).unwrap();

        assert_eq!(fill(&mut r, 50).0, 50);
        assert_eq!(fill(&mut r, 50).0, 30);
        assert_eq!(r.current_time(), 80);
        assert!(r.is_finished());

        let (produced, out) = fill(&mut r, 20);
        assert_eq!(produced, 0);
        assert!(out.iter().all(|&b| b == 0));
        assert_eq!(r.current_time(), 80);
    }

    #[test]
    fn test_zero_request_and_bad_outputs() {
        let mut r = renderer(2);
        let mut a = vec![0u8; 8];
        let mut b = vec![0u8; 4];
        assert_eq!(r.fill(0, &mut [a.as_mut_slice(), b.as_mut_slice()]).unwrap(), 0);

        let err = r.fill(8, &mut [a.as_mut_slice()]).unwrap_err();
        assert!(matches!(err, RenderError::ChannelMismatch { expected: 2, actual: 1 }));

        let err = r.fill(8, &mut [a.as_mut_slice(), b.as_mut_slice()]).unwrap_err();
        assert!(matches!(
            err,
            RenderError::BufferTooSmall { channel: 1, needed: 8, actual: 4 }
        ));
        assert_eq!(r.current_time(), 0);
    }

    #[test]
    fn test_handler_failure_rolls_back() {
        let mut r = renderer(1);
        r.schedule(ramp(2, 3, 1)).unwrap();
        // Overflows the window and would leave a holdover at 10.
        r.schedule(ramp(4, 10, 1)).unwrap();
        r.schedule(ramp(5, 2, 1)).unwrap();
        let failing = Event::new(EventType::GEN_VECTOR, 5, 2, Payload::Empty)
            .unwrap()
            .with_handler(Arc::new(Failing));
        r.schedule(failing).unwrap();
        r.schedule(ramp(5, 1, 1)).unwrap();

        let mut out = vec![0u8; 10];
        let err = r.fill(10, &mut [out.as_mut_slice()]).unwrap_err();
        assert!(!err.is_fatal());
        assert!(matches!(err, RenderError::Handler(_)));
        assert_eq!(r.current_time(), 0);
        assert!(out.iter().all(|&b| b == 0));

        // Consumed events are back in their old order and the holdover is gone.
        let queued: Vec<(u64, u64, bool)> = r
            .queue()
            .iter()
            .map(|e| (e.time(), e.length(), e.is_holdover()))
            .collect();
        assert_eq!(
            queued,
            vec![(2, 3, false), (4, 10, false), (5, 2, false), (5, 2, false), (5, 1, false)]
        );
        let handlers: Vec<&str> = r.queue().iter().filter_map(|e| e.handler()).map(|h| h.name()).collect();
        assert_eq!(handlers, vec!["insert_vector", "insert_vector", "insert_vector", "failing", "insert_vector"]);
    }

    #[test]
    fn test_holdover_precedes_event_at_split_point() {
        let sig = IoSignature::uniform(1, 1).unwrap();
        let schedule = || {
            vec![
                Event::gen_vector(40, vec![vec![1; 30]], &sig).unwrap(),
                Event::gen_vector(50, vec![vec![2; 5]], &sig).unwrap(),
            ]
        };

        let mut whole = renderer(1);
        for e in schedule() {
            whole.schedule(e).unwrap();
        }
        let (_, reference) = fill(&mut whole, 100);
        assert_eq!(&reference[50..55], &[2; 5]);
        assert_eq!(&reference[55..70], &[1; 15]);

        let mut split = renderer(1);
        for e in schedule() {
            split.schedule(e).unwrap();
        }
        let (_, head) = fill(&mut split, 50);
        let (_, tail) = fill(&mut split, 50);
        assert_eq!([head, tail].concat(), reference);
    }

    #[test]
    fn test_cap_leaves_events_past_budget_queued() {
        let mut r = renderer(1);
        r.set_max_length(64);
        r.schedule(ramp(10, 60, 1)).unwrap();

        assert_eq!(fill(&mut r, 50).0, 50);
        let (produced, out) = fill(&mut r, 50);
        assert_eq!(produced, 14);
        assert_eq!(&out[..14], &(41..=54).collect::<Vec<u8>>()[..]);
        assert!(out[14..].iter().all(|&b| b == 0));
        assert_eq!(r.queue().next_time(), Some(64));

        r.set_max_length(300);
        let (produced, out) = fill(&mut r, 50);
        assert_eq!(produced, 50);
        assert_eq!(&out[..6], &(55..=60).collect::<Vec<u8>>()[..]);
        assert!(out[6..].iter().all(|&b| b == 0));
        assert!(r.queue().is_empty());
    }

    #[test]
    fn test_oversized_request_reports_small_buffer() {
        let mut r = StreamRenderer::new(TimeOrderedQueue::new(), IoSignature::f32(1).unwrap());
        let mut out = vec![0u8; 8];
        let err = r.fill(usize::MAX / 2, &mut [out.as_mut_slice()]).unwrap_err();
        assert!(matches!(
            err,
            RenderError::BufferTooSmall { channel: 0, needed: usize::MAX, actual: 8 }
        ));
        assert_eq!(r.current_time(), 0);
    }

    #[test]
    fn test_schedule_rejection_is_not_fatal() {
        let mut r = renderer(1);
        let stray = Event::new(EventType::new("stray"), 0, 1, Payload::Empty).unwrap();
        let err = r.schedule(stray).unwrap_err();
        assert_eq!(err, QueueError::UnknownEventType(EventType::new("stray")));
        assert!(r.queue().is_empty());
    }

    #[test]
    fn test_unbound_handler_is_fatal() {
        let mut r = renderer(1);
        r.queue_mut().register_event_type(EventType::new("orphan"));
        let orphan = Event::new(EventType::new("orphan"), 0, 4, Payload::Empty).unwrap();
        r.schedule(orphan).unwrap();

        let mut out = vec![0u8; 10];
        let err = r.fill(10, &mut [out.as_mut_slice()]).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, RenderError::UnboundHandler(ref kind) if kind.name() == "orphan"));
    }

    #[test]
    fn test_multichannel_item_sizes() {
        let sig = IoSignature::new(vec![1, 4]).unwrap();
        let mut r = StreamRenderer::new(TimeOrderedQueue::new(), sig.clone());
        let ev = Event::gen_vector(3, vec![vec![9; 4], vec![7; 16]], &sig).unwrap();
        r.schedule(ev).unwrap();

        let mut a = vec![0u8; 5];
        let mut b = vec![0u8; 20];
        let produced = r.fill(5, &mut [a.as_mut_slice(), b.as_mut_slice()]).unwrap();
        assert_eq!(produced, 5);
        assert_eq!(a, [0, 0, 0, 9, 9]);
        assert_eq!(&b[12..], &[7; 8]);

        let produced = r.fill(5, &mut [a.as_mut_slice(), b.as_mut_slice()]).unwrap();
        assert_eq!(produced, 5);
        assert_eq!(a, [9, 9, 0, 0, 0]);
        assert_eq!(&b[..8], &[7; 8]);
        assert!(b[8..].iter().all(|&x| x == 0));
    }
}
