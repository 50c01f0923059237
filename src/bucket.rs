//! Bucket: a key's list of open wait rooms, with its own serializing mutex.
//!
//! The bucket mutex guards both the scan-and-admit operation and the
//! hook-driven removal for that key. Lock discipline: `bucket mutex` is
//! never acquired while holding the top-level map lock,
//! and the room mutex (inside `WaitRoom::add`) may be acquired while
//! holding the bucket mutex, never the reverse.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::model::{Session, WaitRoomConfig};
use crate::wait_room::WaitRoom;

/// The open-room list for one bucket key, lazily created on first use.
pub(crate) struct Bucket {
    rooms: Mutex<Vec<Arc<WaitRoom>>>,
}

impl Bucket {
    pub(crate) fn new() -> Self {
        Self {
            rooms: Mutex::new(Vec::new()),
        }
    }

    /// Admits `session` under `config`, scanning this bucket's open rooms
    /// in insertion order and falling through to creating a fresh room.
    ///
    /// The bucket mutex is released before the newly created room's
    /// before-done hook is registered: if the room happens to close
    /// instantly (a `size == 1` room fills on its very first `add`), the
    /// hook runs immediately and re-enters this same mutex to splice the
    /// room back out, which would deadlock on a non-reentrant mutex if the
    /// lock were still held here.
    pub(crate) fn admit(
        self: &Arc<Self>,
        session: Session,
        config: WaitRoomConfig,
        delivery: &mpsc::Sender<Arc<WaitRoom>>,
        parent: &CancellationToken,
    ) {
        let mut rooms = self.rooms.lock().unwrap();
        for room in rooms.iter() {
            if room.config() == config && room.add(session.clone()) {
                return;
            }
        }

        let room = WaitRoom::new(parent.clone(), config, delivery.clone());
        let admitted = room.add(session);
        debug_assert!(admitted, "a freshly created room must accept its first session");
        rooms.push(Arc::clone(&room));
        drop(rooms);

        let bucket = Arc::clone(self);
        let splice_target = Arc::clone(&room);
        room.on_before_done(move || {
            let mut rooms = bucket.rooms.lock().unwrap();
            rooms.retain(|r| !Arc::ptr_eq(r, &splice_target));
        });
    }

    #[cfg(test)]
    pub(crate) fn open_room_count(&self) -> usize {
        self.rooms.lock().unwrap().len()
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
    async fn fills_one_room_then_opens_a_second() {
        let _ = tracing_subscriber::fmt::try_init();
        let (tx, mut rx) = channel(4);
        let bucket = Arc::new(Bucket::new());
        let parent = CancellationToken::new();
        let config = cfg(2, 2, 10);

        bucket.admit(Session::new("a"), config, &tx, &parent);
        bucket.admit(Session::new("b"), config, &tx, &parent);
        assert_eq!(bucket.open_room_count(), 1);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.sessions().len(), 2);

        bucket.admit(Session::new("c"), config, &tx, &parent);
        bucket.admit(Session::new("d"), config, &tx, &parent);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.sessions().len(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn size_one_room_splices_itself_out_immediately() {
        let (tx, mut rx) = channel(4);
        let bucket = Arc::new(Bucket::new());
        let parent = CancellationToken::new();

        bucket.admit(Session::new("a"), cfg(1, 1, 10), &tx, &parent);
        // the room closed on its very first add; the splice-out hook must
        // have already run synchronously inside `admit`, not deadlocked.
        assert_eq!(bucket.open_room_count(), 0);

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.sessions().len(), 1);
    }

    #[tokio::test]
    async fn mismatched_config_forks_into_separate_rooms() {
        let (tx, mut rx) = channel(4);
        let bucket = Arc::new(Bucket::new());
        let parent = CancellationToken::new();
        let small = cfg(1, 1, 10);
        let big = cfg(2, 2, 10);

        bucket.admit(Session::new("a"), big, &tx, &parent);
        bucket.admit(Session::new("b"), small, &tx, &parent);
        assert_eq!(bucket.open_room_count(), 1); // the size-1 room already spliced itself out
        bucket.admit(Session::new("c"), big, &tx, &parent);

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.sessions().len(), 2);
        assert_eq!(bucket.open_room_count(), 0);
    }
}
