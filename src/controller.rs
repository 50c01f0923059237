//! Controller: per-bucket serialization of admission, the delivery loop,
//! and the shutdown drain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Notify};
use tokio_util::sync::CancellationToken;

use crate::bucket::Bucket;
use crate::model::{Request, Session};
use crate::wait_room::WaitRoom;

/// Default grace period after parent cancellation before the delivery
/// channel is closed, letting in-flight rooms finish their race.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Invoked exactly once per delivered room, serially, from the delivery
/// loop. Slow callbacks block subsequent deliveries; offload to your own
/// executor if that matters.
pub type OnRoomReady = dyn Fn(Vec<Session>, Arc<WaitRoom>) + Send + Sync;

/// Outcome of [`Controller::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The request's rule matched and the session was routed to a room.
    Admitted,
    /// `req.rule.matches(&req)` returned `false`; the request was dropped.
    NotMatched,
}

/// The matchmaking core's entry point.
///
/// Owns the `buckets` map and the delivery channel exclusively. Each
/// [`Bucket`] owns its own open-room list and mutex; buckets are created
/// lazily on first use of a key, guarded by a single map-level mutex (the
/// spec's `locksMutex`/`listsMutex` split is fused here, since a `Bucket`
/// already unifies list and mutex — see `DESIGN.md`).
///
/// Must be constructed from within a running Tokio runtime: both
/// [`Controller::new`] and [`Controller::submit`] spawn tasks.
pub struct Controller {
    buckets: Mutex<HashMap<String, Arc<Bucket>>>,
    delivery_tx: mpsc::Sender<Arc<WaitRoom>>,
    parent: CancellationToken,
    stopped_rx: watch::Receiver<bool>,
}

impl Controller {
    /// Creates a controller with the default shutdown grace period.
    pub fn new(
        parent: CancellationToken,
        on_room_ready: impl Fn(Vec<Session>, Arc<WaitRoom>) + Send + Sync + 'static,
    ) -> Self {
        Self::with_shutdown_timeout(parent, on_room_ready, DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Creates a controller with an explicit shutdown grace period.
    pub fn with_shutdown_timeout(
        parent: CancellationToken,
        on_room_ready: impl Fn(Vec<Session>, Arc<WaitRoom>) + Send + Sync + 'static,
        shutdown_timeout: Duration,
    ) -> Self {
        // Tokio requires capacity >= 1; 1 is the closest approximation of
        // an unbuffered channel.
        let (delivery_tx, delivery_rx) = mpsc::channel(1);
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let close_signal = Arc::new(Notify::new());
        let on_room_ready: Arc<OnRoomReady> = Arc::new(on_room_ready);

        tokio::spawn(delivery_loop(
            delivery_rx,
            on_room_ready,
            Arc::clone(&close_signal),
            stopped_tx,
        ));
        tokio::spawn(shutdown_watcher(
            parent.clone(),
            shutdown_timeout,
            close_signal,
        ));

        Self {
            buckets: Mutex::new(HashMap::new()),
            delivery_tx,
            parent,
            stopped_rx,
        }
    }

    /// Routes `req` to a wait room, creating one if needed.
    ///
    /// If `req.rule.matches(&req)` is `false` the request is dropped
    /// silently and [`Submission::NotMatched`] is returned; matching is
    /// the caller's responsibility, not this method's.
    pub fn submit(&self, req: Request) -> Submission {
        if !req.rule.matches(&req) {
            tracing::trace!(session = %req.session.id, "request did not match its rule, dropping");
            return Submission::NotMatched;
        }

        let key = req.rule.build_key(&req);
        let bucket = self.bucket_for(key.clone());
        tracing::trace!(key, session = %req.session.id, "admitting session");
        bucket.admit(req.session, req.room_config, &self.delivery_tx, &self.parent);
        Submission::Admitted
    }

    fn bucket_for(&self, key: String) -> Arc<Bucket> {
        let mut buckets = self.buckets.lock().unwrap();
        Arc::clone(buckets.entry(key).or_insert_with(|| Arc::new(Bucket::new())))
    }

    /// Blocks until the delivery loop has drained and exited.
    ///
    /// Idempotent: calling this again after it has already returned
    /// resolves immediately.
    pub async fn wait(&self) {
        let mut rx = self.stopped_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

async fn delivery_loop(
    mut rx: mpsc::Receiver<Arc<WaitRoom>>,
    on_room_ready: Arc<OnRoomReady>,
    close_signal: Arc<Notify>,
    stopped_tx: watch::Sender<bool>,
) {
    let mut draining = false;
    loop {
        if draining {
            match rx.recv().await {
                Some(room) => deliver(&on_room_ready, room),
                None => break,
            }
        } else {
            tokio::select! {
                maybe_room = rx.recv() => match maybe_room {
                    Some(room) => deliver(&on_room_ready, room),
                    None => break,
                },
                _ = close_signal.notified() => {
                    tracing::debug!("shutdown grace elapsed, closing delivery channel");
                    rx.close();
                    draining = true;
                }
            }
        }
    }
    let _ = stopped_tx.send(true);
}

fn deliver(on_room_ready: &OnRoomReady, room: Arc<WaitRoom>) {
    let sessions = room.sessions();
    tracing::debug!(sessions = sessions.len(), ready = room.is_ready(), "room delivered");
    on_room_ready(sessions, room);
}

async fn shutdown_watcher(
    parent: CancellationToken,
    shutdown_timeout: Duration,
    close_signal: Arc<Notify>,
) {
    parent.cancelled().await;
    tracing::info!(?shutdown_timeout, "parent cancelled, draining before closing delivery");
    tokio::time::sleep(shutdown_timeout).await;
    close_signal.notify_one();
}
