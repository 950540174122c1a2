//! Single-writer, many-reader frame broadcast.
//!
//! The capture thread publishes the latest encoded frame; every stream client
//! holds a `Subscriber` and blocks in `next()` until something newer arrives.
//! There is no queue and no replay: a slow client simply skips frames, and a
//! client that has not collected a delivered frame within `STALE_AFTER` is
//! treated as dead and dropped on the next publish.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::frame::EncodedFrame;

/// Age of an uncollected delivery after which a subscriber is evicted.
pub const STALE_AFTER: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug)]
struct Slot {
    delivered: bool,
    delivered_at: Instant,
}

#[derive(Default)]
struct State {
    frame: Option<Arc<EncodedFrame>>,
    subscribers: HashMap<u64, Slot>,
    next_id: u64,
    published: u64,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    frame_ready: Condvar,
}

impl Shared {
    // State stays consistent across a panicking holder; every update is a
    // single field write.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Publishing side. Cloning yields another handle to the same stream.
#[derive(Clone, Default)]
pub struct FrameBroadcaster {
    shared: Arc<Shared>,
}

impl FrameBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: EncodedFrame) {
        self.publish_at(frame, Instant::now());
    }

    /// Publishes with an explicit clock reading.
    pub fn publish_at(&self, frame: EncodedFrame, now: Instant) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.frame = Some(Arc::new(frame));
        state.published += 1;

        let before = state.subscribers.len();
        state.subscribers.retain(|_, slot| {
            !(slot.delivered && now.saturating_duration_since(slot.delivered_at) > STALE_AFTER)
        });
        let evicted = before - state.subscribers.len();
        if evicted > 0 {
            log::info!("evicted {evicted} stale stream subscriber(s)");
        }

        for slot in state.subscribers.values_mut() {
            if !slot.delivered {
                slot.delivered = true;
                slot.delivered_at = now;
            }
        }
        drop(state);
        self.shared.frame_ready.notify_all();
    }

    pub fn subscribe(&self) -> Subscriber {
        let id = {
            let mut state = self.shared.lock();
            state.next_id += 1;
            state.next_id
        };
        Subscriber {
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    /// Blocks until the first frame is published. Returns false on timeout or
    /// when the stream closed first.
    pub fn wait_for_first_frame(&self, timeout: Duration) -> bool {
        let state = self.shared.lock();
        let (state, _) = self
            .shared
            .frame_ready
            .wait_timeout_while(state, timeout, |s| s.published == 0 && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        state.published > 0
    }

    /// Marks the stream gone and wakes every waiting subscriber.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        state.closed = true;
        state.frame = None;
        drop(state);
        self.shared.frame_ready.notify_all();
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().subscribers.len()
    }

    /// Most recent frame, without registering as a subscriber.
    pub fn latest(&self) -> Option<Arc<EncodedFrame>> {
        self.shared.lock().frame.clone()
    }
}

/// Outcome of a bounded wait.
#[derive(Debug)]
pub enum Recv {
    Frame(Arc<EncodedFrame>),
    TimedOut,
    Closed,
}

/// Consumer handle. Registers lazily on the first wait and unregisters on drop.
pub struct Subscriber {
    shared: Arc<Shared>,
    id: u64,
}

impl Subscriber {
    /// Blocks until a frame newer than the last one collected arrives, then
    /// acknowledges it. `None` once the broadcaster is closed.
    pub fn next(&mut self) -> Option<Arc<EncodedFrame>> {
        loop {
            match self.recv_timeout(Duration::from_secs(3600)) {
                Recv::Frame(frame) => return Some(frame),
                Recv::Closed => return None,
                Recv::TimedOut => continue,
            }
        }
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Recv {
        let deadline = Instant::now() + timeout;
        let id = self.id;
        let mut state = self.shared.lock();
        loop {
            if state.closed {
                return Recv::Closed;
            }
            let now = Instant::now();
            let slot = state.subscribers.entry(id).or_insert(Slot {
                delivered: false,
                delivered_at: now,
            });
            if slot.delivered {
                slot.delivered = false;
                if let Some(frame) = state.frame.clone() {
                    return Recv::Frame(frame);
                }
            }
            if now >= deadline {
                return Recv::TimedOut;
            }
            state = self
                .shared
                .frame_ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// True while the engine tracks this subscriber.
    pub fn is_registered(&self) -> bool {
        self.shared.lock().subscribers.contains_key(&self.id)
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.shared.lock().subscribers.remove(&self.id);
    }
}
