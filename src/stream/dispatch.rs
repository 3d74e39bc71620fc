use crate::foundation::error::{HeadcastError, HeadcastResult, ObserverError, panic_message};
use crate::model::frame::Frame;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

/// A consumer of produced frames.
///
/// Each registered observer runs on its own delivery thread, so `on_frame` may block (network
/// send, disk write) without stalling the producer or other observers. Returning an error, or
/// panicking, unregisters the observer.
pub trait FrameObserver: Send + 'static {
    /// Short name used in logs and reports.
    fn name(&self) -> &str {
        "observer"
    }

    /// Handle one frame. Frames arrive in production order.
    fn on_frame(&mut self, frame: &Frame) -> Result<(), ObserverError>;
}

/// Adapter turning a closure into a [`FrameObserver`].
pub struct FnObserver<F> {
    name: String,
    f: F,
}

/// Wrap `f` as a named observer.
pub fn observer_fn<F>(name: impl Into<String>, f: F) -> FnObserver<F>
where
    F: FnMut(&Frame) -> Result<(), ObserverError> + Send + 'static,
{
    FnObserver {
        name: name.into(),
        f,
    }
}

impl<F> FrameObserver for FnObserver<F>
where
    F: FnMut(&Frame) -> Result<(), ObserverError> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_frame(&mut self, frame: &Frame) -> Result<(), ObserverError> {
        (self.f)(frame)
    }
}

/// What happens when an observer's queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Backpressure {
    /// Bounded queue; a frame arriving at a full queue is dropped for that observer.
    DropNewest {
        /// Queue capacity per observer.
        capacity: usize,
    },
    /// Single slot; a pending stale frame is replaced by the newest one.
    LatestWins,
}

impl Default for Backpressure {
    fn default() -> Self {
        Self::DropNewest { capacity: 8 }
    }
}

impl Backpressure {
    fn capacity(self) -> usize {
        match self {
            Self::DropNewest { capacity } => capacity.max(1),
            Self::LatestWins => 1,
        }
    }
}

/// Reports of finished observers kept for [`FrameDispatcher::reports`].
pub const RETIRED_HISTORY: usize = 64;

/// Identifier returned by [`FrameDispatcher::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(pub u64);

/// Delivery counters for one observer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObserverReport {
    /// Registration id.
    pub id: ObserverId,
    /// Observer name.
    pub name: String,
    /// Frames handed to `on_frame` successfully.
    pub delivered: u64,
    /// Frames dropped by the backpressure policy.
    pub dropped: u64,
    /// Failure that unregistered the observer, if any.
    pub failure: Option<ObserverError>,
}

#[derive(Default)]
struct SlotStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicBool,
    failure: Mutex<Option<ObserverError>>,
}

struct Slot {
    id: ObserverId,
    name: String,
    tx: Sender<Frame>,
    // Kept for latest-wins eviction of a stale pending frame.
    rx: Receiver<Frame>,
    stats: Arc<SlotStats>,
    worker: Option<JoinHandle<()>>,
}

struct Retired {
    id: ObserverId,
    name: String,
    stats: Arc<SlotStats>,
    worker: Option<JoinHandle<()>>,
}

impl From<Slot> for Retired {
    fn from(slot: Slot) -> Self {
        Self {
            id: slot.id,
            name: slot.name,
            stats: slot.stats,
            worker: slot.worker,
        }
    }
}

#[derive(Default)]
struct ObserverSet {
    slots: Vec<Slot>,
    // Removed observers whose delivery thread may still be draining.
    retired: Vec<Retired>,
    // Final reports of joined observers, oldest first, at most `RETIRED_HISTORY`.
    history: VecDeque<ObserverReport>,
    next_id: u64,
}

impl ObserverSet {
    fn retire(&mut self, id: ObserverId) -> bool {
        self.reap();
        let Some(pos) = self.slots.iter().position(|s| s.id == id) else {
            return false;
        };
        let slot = self.slots.remove(pos);
        self.retired.push(slot.into());
        true
    }

    /// Join retired workers that have exited and fold them into the bounded history.
    fn reap(&mut self) {
        let mut i = 0;
        while i < self.retired.len() {
            if self.retired[i]
                .worker
                .as_ref()
                .is_some_and(|w| !w.is_finished())
            {
                i += 1;
                continue;
            }
            let done = self.retired.swap_remove(i);
            if let Some(worker) = done.worker
                && worker.join().is_err()
            {
                tracing::warn!(observer = %done.name, "observer delivery thread panicked");
            }
            self.history.push_back(report(done.id, &done.name, &done.stats));
            if self.history.len() > RETIRED_HISTORY {
                self.history.pop_front();
            }
        }
    }
}

/// Fans frames out to registered observers without ever blocking the caller on them.
///
/// Cloning yields another handle to the same observer set.
#[derive(Clone)]
pub struct FrameDispatcher {
    set: Arc<Mutex<ObserverSet>>,
    policy: Backpressure,
}

impl Default for FrameDispatcher {
    fn default() -> Self {
        Self::new(Backpressure::default())
    }
}

impl FrameDispatcher {
    /// Create an empty dispatcher using `policy` for every observer.
    pub fn new(policy: Backpressure) -> Self {
        Self {
            set: Arc::new(Mutex::new(ObserverSet::default())),
            policy,
        }
    }

    /// Register `observer` and start its delivery thread.
    pub fn register(&self, observer: impl FrameObserver) -> HeadcastResult<ObserverId> {
        let name = observer.name().to_owned();
        let (tx, rx) = bounded::<Frame>(self.policy.capacity());
        let stats = Arc::new(SlotStats::default());

        let mut set = self.set.lock();
        set.reap();
        let id = ObserverId(set.next_id);
        set.next_id += 1;

        let worker = std::thread::Builder::new()
            .name(format!("headcast-observer-{}", id.0))
            .spawn({
                let rx = rx.clone();
                let stats = Arc::clone(&stats);
                let set = Arc::downgrade(&self.set);
                let name = name.clone();
                move || deliver_loop(id, name, observer, rx, stats, set)
            })
            .map_err(|e| {
                HeadcastError::Other(anyhow::anyhow!("spawn observer thread for '{name}': {e}"))
            })?;

        set.slots.push(Slot {
            id,
            name: name.clone(),
            tx,
            rx,
            stats,
            worker: Some(worker),
        });
        drop(set);

        tracing::debug!(observer = %name, id = id.0, "observer registered");
        Ok(id)
    }

    /// Remove an observer. Frames already queued for it are still delivered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let removed = self.set.lock().retire(id);
        if removed {
            tracing::debug!(id = id.0, "observer unregistered");
        }
        removed
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.set
            .lock()
            .slots
            .iter()
            .filter(|s| !s.stats.failed.load(Ordering::Acquire))
            .count()
    }

    /// Queue `frame` for every live observer and return how many accepted it.
    ///
    /// Never blocks on an observer: a full queue is resolved by the backpressure policy.
    pub fn dispatch(&self, frame: Frame) -> usize {
        let mut set = self.set.lock();
        let mut accepted = 0;
        let mut dead = Vec::new();
        for slot in &set.slots {
            if slot.stats.failed.load(Ordering::Acquire) {
                dead.push(slot.id);
                continue;
            }
            match self.offer(slot, frame.clone()) {
                Offer::Queued => accepted += 1,
                Offer::Dropped => {
                    slot.stats.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Offer::Disconnected => dead.push(slot.id),
            }
        }
        for id in dead {
            set.retire(id);
        }
        accepted
    }

    fn offer(&self, slot: &Slot, frame: Frame) -> Offer {
        match slot.tx.try_send(frame) {
            Ok(()) => Offer::Queued,
            Err(TrySendError::Disconnected(_)) => Offer::Disconnected,
            Err(TrySendError::Full(frame)) => match self.policy {
                Backpressure::DropNewest { .. } => Offer::Dropped,
                Backpressure::LatestWins => {
                    if slot.rx.try_recv().is_ok() {
                        slot.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    match slot.tx.try_send(frame) {
                        Ok(()) => Offer::Queued,
                        Err(TrySendError::Disconnected(_)) => Offer::Disconnected,
                        Err(TrySendError::Full(_)) => Offer::Dropped,
                    }
                }
            },
        }
    }

    /// Counters for live and draining observers plus the last [`RETIRED_HISTORY`] finished
    /// ones, ordered by id.
    pub fn reports(&self) -> Vec<ObserverReport> {
        let set = self.set.lock();
        let mut out: Vec<ObserverReport> = set
            .slots
            .iter()
            .map(|s| report(s.id, &s.name, &s.stats))
            .chain(set.retired.iter().map(|r| report(r.id, &r.name, &r.stats)))
            .chain(set.history.iter().cloned())
            .collect();
        out.sort_by_key(|r| r.id);
        out
    }

    /// Stop accepting frames, let every observer drain its queue, and join delivery threads.
    pub fn close(&self) -> Vec<ObserverReport> {
        let workers: Vec<JoinHandle<()>> = {
            let mut set = self.set.lock();
            let slots = std::mem::take(&mut set.slots);
            set.retired.extend(slots.into_iter().map(Retired::from));
            set.retired
                .iter_mut()
                .filter_map(|r| r.worker.take())
                .collect()
        };
        // Senders are gone with the slots; workers exit once their queues are empty.
        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!("observer delivery thread panicked outside on_frame");
            }
        }
        self.reports()
    }
}

enum Offer {
    Queued,
    Dropped,
    Disconnected,
}

fn report(id: ObserverId, name: &str, stats: &SlotStats) -> ObserverReport {
    ObserverReport {
        id,
        name: name.to_owned(),
        delivered: stats.delivered.load(Ordering::Relaxed),
        dropped: stats.dropped.load(Ordering::Relaxed),
        failure: stats.failure.lock().clone(),
    }
}

fn deliver_loop(
    id: ObserverId,
    name: String,
    mut observer: impl FrameObserver,
    rx: Receiver<Frame>,
    stats: Arc<SlotStats>,
    set: Weak<Mutex<ObserverSet>>,
) {
    while let Ok(frame) = rx.recv() {
        let res = std::panic::catch_unwind(AssertUnwindSafe(|| observer.on_frame(&frame)))
            .unwrap_or_else(|payload| Err(ObserverError::Panicked(panic_message(&*payload))));
        match res {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                let wrapped = HeadcastError::Observer {
                    observer: name.clone(),
                    source: err.clone(),
                };
                tracing::warn!(error = %wrapped, "dropping failed observer");
                *stats.failure.lock() = Some(err);
                stats.failed.store(true, Ordering::Release);
                if let Some(set) = set.upgrade() {
                    set.lock().retire(id);
                }
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stream/dispatch.rs"]
mod tests;
