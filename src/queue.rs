//! FIFO of raw watch events awaiting the consumer loop.
//!
//! Besides arrival order the queue keeps a per-url index of pending events so
//! rename reconciliation can cancel one pending event for a url without
//! scanning the whole queue. Cancelled entries stay in place as tombstones and
//! are skipped on `pop`, so cancelling never reorders the remaining events.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::fs::locator::Locator;

/// A raw filesystem change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(Locator),
    Removed(Locator),
    Updated(Locator),
    Renamed { from: Locator, to: Locator },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Added,
    Removed,
    Updated,
    Renamed,
}

impl WatchEvent {
    pub fn kind(&self) -> WatchEventKind {
        match self {
            WatchEvent::Added(_) => WatchEventKind::Added,
            WatchEvent::Removed(_) => WatchEventKind::Removed,
            WatchEvent::Updated(_) => WatchEventKind::Updated,
            WatchEvent::Renamed { .. } => WatchEventKind::Renamed,
        }
    }

    /// The url the event is indexed under; the destination for renames.
    pub fn url(&self) -> &Locator {
        match self {
            WatchEvent::Added(url) | WatchEvent::Removed(url) | WatchEvent::Updated(url) => url,
            WatchEvent::Renamed { to, .. } => to,
        }
    }
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<(u64, WatchEvent)>,
    by_url: HashMap<Locator, VecDeque<(u64, WatchEventKind)>>,
    cancelled: HashSet<u64>,
    next_seq: u64,
}

impl QueueState {
    fn unindex(&mut self, url: &Locator, seq: u64) {
        if let Some(pending) = self.by_url.get_mut(url) {
            if let Some(pos) = pending.iter().position(|(s, _)| *s == seq) {
                pending.remove(pos);
            }
            if pending.is_empty() {
                self.by_url.remove(url);
            }
        }
    }
}

/// Thread-safe FIFO of watch events, bounded only by memory.
#[derive(Default)]
pub struct WatchEventQueue {
    state: Mutex<QueueState>,
}

impl WatchEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, event: WatchEvent) {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .by_url
            .entry(event.url().clone())
            .or_default()
            .push_back((seq, event.kind()));
        state.events.push_back((seq, event));
    }

    /// Oldest live event, skipping cancelled ones.
    pub fn pop(&self) -> Option<WatchEvent> {
        let mut state = self.lock();
        while let Some((seq, event)) = state.events.pop_front() {
            if state.cancelled.remove(&seq) {
                continue;
            }
            state.unindex(event.url(), seq);
            return Some(event);
        }
        None
    }

    /// Cancel the oldest pending event of `kind` for `url`.
    ///
    /// Returns whether an event was cancelled.
    pub fn cancel_pending(&self, url: &Locator, kind: WatchEventKind) -> bool {
        let mut state = self.lock();
        let seq = match state
            .by_url
            .get(url)
            .and_then(|pending| pending.iter().find(|(_, k)| *k == kind))
        {
            Some((seq, _)) => *seq,
            None => return false,
        };
        state.unindex(url, seq);
        state.cancelled.insert(seq);
        true
    }

    /// Whether an event of `kind` for `url` is waiting.
    pub fn has_pending(&self, url: &Locator, kind: WatchEventKind) -> bool {
        self.lock()
            .by_url
            .get(url)
            .is_some_and(|pending| pending.iter().any(|(_, k)| *k == kind))
    }

    pub fn len(&self) -> usize {
        let state = self.lock();
        state.events.len() - state.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        *self.lock() = QueueState::default();
    }
}
