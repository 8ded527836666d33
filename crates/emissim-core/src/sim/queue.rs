//! Event queue backing the [`Clock`] capability

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

use super::{Clock, EventId, SimEvent, SimTime};

#[derive(Debug)]
struct Scheduled {
    at: SimTime,
    seq: u64,
    event: SimEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest time first, then insertion order
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Deterministic discrete-event queue
///
/// Cancellation is lazy: cancelled entries stay in the heap and are skipped
/// when they reach the front.
#[derive(Debug, Default)]
pub struct EventQueue {
    /// Current time (time of the last popped event)
    now: SimTime,
    /// Scheduled events, including cancelled ones
    heap: BinaryHeap<Scheduled>,
    /// Sequence numbers still pending
    live: HashSet<u64>,
    /// Next insertion sequence number
    next_seq: u64,
}

impl EventQueue {
    /// Create an empty queue at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event at an absolute time (clamped to now)
    pub fn schedule_at(&mut self, at: SimTime, event: SimEvent) -> EventId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled {
            at: at.max(self.now),
            seq,
            event,
        });
        self.live.insert(seq);
        EventId(seq)
    }

    /// Pop the next live event at or before `limit`, advancing the clock to it
    pub fn pop_until(&mut self, limit: SimTime) -> Option<(EventId, SimEvent)> {
        loop {
            let next = self.heap.peek()?;
            if !self.live.contains(&next.seq) {
                self.heap.pop();
                continue;
            }
            if next.at > limit {
                return None;
            }
            let next = self.heap.pop()?;
            self.live.remove(&next.seq);
            self.now = next.at;
            return Some((EventId(next.seq), next.event));
        }
    }

    /// Time of the next live event, if any
    pub fn peek_time(&mut self) -> Option<SimTime> {
        while let Some(next) = self.heap.peek() {
            if self.live.contains(&next.seq) {
                return Some(next.at);
            }
            self.heap.pop();
        }
        None
    }

    /// Move the clock forward without firing anything
    pub fn advance_to(&mut self, at: SimTime) {
        self.now = self.now.max(at);
    }

    /// Whether an event is still pending
    pub fn is_pending(&self, id: EventId) -> bool {
        self.live.contains(&id.0)
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl Clock for EventQueue {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_after(&mut self, delay: Duration, event: SimEvent) -> EventId {
        let at = self.now + delay;
        self.schedule_at(at, event)
    }

    fn cancel(&mut self, id: EventId) -> bool {
        self.live.remove(&id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::VehicleId;

    fn tick(id: u32) -> SimEvent {
        SimEvent::Tick(VehicleId(id))
    }

    #[test]
    fn test_pops_in_time_order() {
        let mut queue = EventQueue::new();
        queue.schedule_after(Duration::from_secs(3), tick(3));
        queue.schedule_after(Duration::from_secs(1), tick(1));
        queue.schedule_after(Duration::from_secs(2), tick(2));

        let limit = SimTime::from_secs_f64(10.0);
        let order: Vec<_> = std::iter::from_fn(|| queue.pop_until(limit).map(|(_, e)| e)).collect();
        assert_eq!(order, vec![tick(1), tick(2), tick(3)]);
        assert_eq!(queue.now(), SimTime::from_secs_f64(3.0));
    }

    #[test]
    fn test_equal_times_fire_in_insertion_order() {
        let mut queue = EventQueue::new();
        for id in [5, 2, 9, 1] {
            queue.schedule_after(Duration::from_millis(500), tick(id));
        }
        let limit = SimTime::from_secs_f64(1.0);
        let order: Vec<_> = std::iter::from_fn(|| queue.pop_until(limit).map(|(_, e)| e)).collect();
        assert_eq!(order, vec![tick(5), tick(2), tick(9), tick(1)]);
    }

    #[test]
    fn test_cancelled_event_never_fires() {
        let mut queue = EventQueue::new();
        let a = queue.schedule_after(Duration::from_secs(1), tick(1));
        queue.schedule_after(Duration::from_secs(2), tick(2));

        assert!(queue.cancel(a));
        assert!(!queue.cancel(a));
        assert!(!queue.is_pending(a));
        assert_eq!(queue.len(), 1);

        let popped = queue.pop_until(SimTime::from_secs_f64(5.0));
        assert_eq!(popped.map(|(_, e)| e), Some(tick(2)));
        assert!(queue.pop_until(SimTime::from_secs_f64(5.0)).is_none());
    }

    #[test]
    fn test_limit_leaves_later_events_pending() {
        let mut queue = EventQueue::new();
        queue.schedule_after(Duration::from_secs(5), tick(1));
        assert!(queue.pop_until(SimTime::from_secs_f64(4.9)).is_none());
        assert_eq!(queue.now(), SimTime::ZERO);
        assert_eq!(queue.peek_time(), Some(SimTime::from_secs_f64(5.0)));
        assert!(queue.pop_until(SimTime::from_secs_f64(5.0)).is_some());
    }

    #[test]
    fn test_schedule_in_past_clamps_to_now() {
        let mut queue = EventQueue::new();
        queue.advance_to(SimTime::from_secs_f64(2.0));
        queue.schedule_at(SimTime::from_secs_f64(1.0), tick(1));
        assert_eq!(queue.peek_time(), Some(SimTime::from_secs_f64(2.0)));
    }
}
