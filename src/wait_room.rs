//! WaitRoom: a bounded, TTL-bounded collection of sessions that closes and
//! delivers itself as one batch.
//!
//! State machine: `OPEN -> (capacity | TTL) -> CLOSING -> hooks ->
//! DELIVERING -> DELIVERED`, with a separate `parent cancelled ->
//! DISCARDED` branch that bypasses hooks and delivery entirely.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::model::{Session, WaitRoomConfig};

/// Why a room's internal task woke up and moved it out of `OPEN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseCause {
    Capacity,
    Ttl,
    Shutdown,
}

struct Inner {
    sessions: Vec<Session>,
    closed: bool,
    hooks: Vec<Box<dyn FnOnce() + Send>>,
}

/// A bounded collection of sessions, delivered as one batch on close.
pub struct WaitRoom {
    config: WaitRoomConfig,
    inner: Mutex<Inner>,
    /// Signalled by `add` when the room fills, waking the internal task.
    close_trigger: CancellationToken,
}

impl WaitRoom {
    /// Allocates the room and starts its internal close/deliver task.
    ///
    /// `parent` is the controller's lifecycle handle; it is raced against
    /// the TTL and the capacity trigger, and is checked again when the
    /// room attempts to enqueue itself for delivery.
    pub fn new(
        parent: CancellationToken,
        config: WaitRoomConfig,
        delivery: mpsc::Sender<Arc<WaitRoom>>,
    ) -> Arc<Self> {
        let room = Arc::new(Self {
            config,
            inner: Mutex::new(Inner {
                sessions: Vec::with_capacity(config.size()),
                closed: false,
                hooks: Vec::new(),
            }),
            close_trigger: CancellationToken::new(),
        });

        let task_room = Arc::clone(&room);
        tokio::spawn(async move {
            task_room.run(parent, delivery).await;
        });

        room
    }

    async fn run(self: Arc<Self>, parent: CancellationToken, delivery: mpsc::Sender<Arc<WaitRoom>>) {
        let cause = tokio::select! {
            _ = self.close_trigger.cancelled() => CloseCause::Capacity,
            _ = tokio::time::sleep(self.config.ttl()) => CloseCause::Ttl,
            _ = parent.cancelled() => CloseCause::Shutdown,
        };
        self.finish(cause, delivery, parent).await;
    }

    async fn finish(
        self: Arc<Self>,
        cause: CloseCause,
        delivery: mpsc::Sender<Arc<WaitRoom>>,
        parent: CancellationToken,
    ) {
        if cause == CloseCause::Shutdown {
            let mut inner = self.inner.lock().unwrap();
            inner.closed = true;
            tracing::debug!(sessions = inner.sessions.len(), "room discarded at shutdown");
            return;
        }

        let hooks = {
            let mut inner = self.inner.lock().unwrap();
            inner.closed = true;
            std::mem::take(&mut inner.hooks)
        };
        tracing::debug!(?cause, "room closing, running before-done hooks");
        for hook in hooks {
            hook();
        }

        tokio::select! {
            biased;
            _ = parent.cancelled() => {
                tracing::debug!("delivery abandoned: parent cancelled first");
            }
            res = delivery.send(self) => {
                if res.is_err() {
                    tracing::debug!("delivery abandoned: channel closed");
                }
            }
        }
    }

    /// Adds `session` to the room.
    ///
    /// Returns `false` without modification if the room is already closed.
    /// If this append fills the room to capacity, the room closes
    /// immediately (atomically with the append, under the room's mutex)
    /// and the internal task is woken to run hooks and deliver.
    pub fn add(&self, session: Session) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return false;
        }
        inner.sessions.push(session);
        if inner.sessions.len() >= self.config.size() {
            inner.closed = true;
            self.close_trigger.cancel();
        }
        true
    }

    /// Removes the first session matching `session_id`.
    ///
    /// A no-op if the room is closed or the session is not present. Not
    /// used by the Controller itself; available to external collaborators.
    pub fn remove(&self, session_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }
        if let Some(pos) = inner.sessions.iter().position(|s| s.id == session_id) {
            inner.sessions.remove(pos);
        }
    }

    /// Returns whether the room has reached its minimum occupancy.
    pub fn is_ready(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.sessions.len() >= self.config.min_size()
    }

    /// Returns a stable snapshot of the room's current sessions.
    ///
    /// After close, the snapshot is final.
    pub fn sessions(&self) -> Vec<Session> {
        self.inner.lock().unwrap().sessions.clone()
    }

    /// Returns the room's immutable configuration.
    pub fn config(&self) -> WaitRoomConfig {
        self.config
    }

    /// Registers a hook to run before delivery.
    ///
    /// If the room is already closed, the hook is executed immediately
    /// instead of being queued, preserving "hooks run exactly once"
    /// without silently dropping a late registration.
    pub fn on_before_done(&self, hook: impl FnOnce() + Send + 'static) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            drop(inner);
            hook();
        } else {
            inner.hooks.push(Box::new(hook));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::channel;

    fn cfg(size: usize, min_size: usize, ttl_secs: u64) -> WaitRoomConfig {
        WaitRoomConfig::new(size, min_size, Duration::from_secs(ttl_secs)).unwrap()
    }

    #[tokio::test]
    async fn add_fills_and_closes_on_last_slot() {
        let _ = tracing_subscriber::fmt::try_init();
        let (tx, mut rx) = channel(1);
        let room = WaitRoom::new(CancellationToken::new(), cfg(2, 2, 10), tx);

        assert!(room.add(Session::new("a")));
        assert!(room.add(Session::new("b")));
        // third add must fail: already closed
        assert!(!room.add(Session::new("c")));

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.sessions().len(), 2);
        assert!(delivered.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_delivers_below_min_size() {
        let (tx, mut rx) = channel(1);
        let room = WaitRoom::new(CancellationToken::new(), cfg(4, 3, 2), tx);
        assert!(room.add(Session::new("a")));

        tokio::time::advance(Duration::from_secs(3)).await;

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.sessions().len(), 1);
        assert!(!delivered.is_ready());
        assert!(Arc::ptr_eq(&room, &delivered));
    }

    #[tokio::test]
    async fn add_after_capacity_close_is_rejected() {
        let (tx, _rx) = channel(1);
        let room = WaitRoom::new(CancellationToken::new(), cfg(1, 1, 10), tx);
        assert!(room.add(Session::new("a")));
        assert!(!room.add(Session::new("b")));
        assert_eq!(room.sessions(), vec![Session::new("a")]);
    }

    #[tokio::test]
    async fn late_hook_registration_runs_immediately() {
        let (tx, _rx) = channel(1);
        let room = WaitRoom::new(CancellationToken::new(), cfg(1, 1, 10), tx);
        assert!(room.add(Session::new("a"))); // fills and closes immediately

        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        room.on_before_done(move || flag.store(true, std::sync::atomic::Ordering::SeqCst));
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn parent_cancellation_discards_without_delivery() {
        let (tx, mut rx) = channel(1);
        let parent = CancellationToken::new();
        let room = WaitRoom::new(parent.clone(), cfg(4, 2, 10), tx);
        assert!(room.add(Session::new("a")));
        parent.cancel();

        // give the internal task a chance to observe cancellation and run
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(rx.try_recv().is_err());
        drop(room);
    }

    #[tokio::test]
    async fn remove_is_noop_on_closed_room() {
        let (tx, _rx) = channel(1);
        let room = WaitRoom::new(CancellationToken::new(), cfg(1, 1, 10), tx);
        assert!(room.add(Session::new("a")));
        room.remove("a");
        assert_eq!(room.sessions(), vec![Session::new("a")]);
    }
}
