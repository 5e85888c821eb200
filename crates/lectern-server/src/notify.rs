//! Notification fabric: WebSocket connection registry plus the scheduled
//! playlist watcher.
//!
//! The registry tracks at most one live connection per remote address; a
//! later connection from the same address replaces the earlier one. The
//! watcher compares playlist modification times on a fixed period and cues
//! registered clients with a literal `"update"` frame. Delivery is
//! at-most-once: no queueing beyond the small per-peer buffer, no redelivery.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

use axum::extract::ws::Message;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use lectern_core::StorageLayout;

/// Frame pushed when a watched playlist gains a newer segment. The client
/// treats it as a cue to re-request the manifest, not as a data channel.
pub const UPDATE_FRAME: &str = "update";

/// Outbound queue depth per connection. A full queue drops the frame; the
/// next tick re-cues the client.
pub const PEER_QUEUE_DEPTH: usize = 16;

pub struct NotificationHub {
    /// Remote address -> live connection. The fabric is the only writer.
    sessions: RwLock<HashMap<IpAddr, PeerHandle>>,
    /// Job -> watch state. `last_mtime` is mutated only by the watcher task.
    watches: Mutex<HashMap<Uuid, WatchEntry>>,
}

struct PeerHandle {
    token: Uuid,
    tx: mpsc::Sender<Message>,
}

#[derive(Default)]
struct WatchEntry {
    addresses: HashSet<IpAddr>,
    last_mtime: Option<SystemTime>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// Track a connection for `addr`, watching `job`. An existing connection
    /// from the same address is replaced; its sender is dropped, which ends
    /// that connection's writer task. Returns a token that must accompany
    /// the matching [`deregister`](Self::deregister).
    pub async fn register(&self, addr: IpAddr, job: Uuid, tx: mpsc::Sender<Message>) -> Uuid {
        let token = Uuid::new_v4();
        {
            let mut sessions = self.sessions.write().await;
            if sessions.insert(addr, PeerHandle { token, tx }).is_some() {
                debug!(%addr, "replaced existing websocket session");
            }
        }
        let mut watches = self.watches.lock().await;
        // A replacement may watch a different job; the address must not keep
        // receiving cues for the previous one.
        watches.retain(|watched, entry| {
            if *watched != job {
                entry.addresses.remove(&addr);
            }
            !entry.addresses.is_empty()
        });
        watches.entry(job).or_default().addresses.insert(addr);
        token
    }

    /// Remove the connection for `addr` if it is still the one identified by
    /// `token`. A stale token (the address was re-registered meanwhile)
    /// leaves the current connection untouched.
    pub async fn deregister(&self, addr: IpAddr, token: Uuid) {
        {
            let mut sessions = self.sessions.write().await;
            match sessions.get(&addr) {
                Some(peer) if peer.token == token => {
                    sessions.remove(&addr);
                }
                _ => return,
            }
        }
        let mut watches = self.watches.lock().await;
        watches.retain(|_, entry| {
            entry.addresses.remove(&addr);
            !entry.addresses.is_empty()
        });
    }

    /// Push a payload to the connection registered for `addr` as one text
    /// frame. Absent or closed peer is a silent no-op.
    pub async fn send_to_addr(&self, addr: IpAddr, payload: &impl Serialize) {
        let Ok(text) = serde_json::to_string(payload) else {
            return;
        };
        let closed = {
            let sessions = self.sessions.read().await;
            match sessions.get(&addr) {
                Some(peer) => match peer.tx.try_send(Message::Text(text)) {
                    Ok(()) | Err(TrySendError::Full(_)) => None,
                    Err(TrySendError::Closed(_)) => Some(peer.token),
                },
                None => None,
            }
        };
        if let Some(token) = closed {
            self.deregister(addr, token).await;
        }
    }

    /// One watcher tick: cue every address watching a job whose playlist
    /// mtime advanced. A failing peer is closed and the rest still get
    /// their cue.
    pub async fn poll_playlists(&self, layout: &StorageLayout) {
        let mut watches = self.watches.lock().await;
        let mut closed: Vec<(IpAddr, Uuid)> = Vec::new();

        for (job, entry) in watches.iter_mut() {
            let playlist = layout.playlist_path(*job);
            let Ok(metadata) = std::fs::metadata(&playlist) else {
                continue;
            };
            let Ok(mtime) = metadata.modified() else {
                continue;
            };
            let newer = entry.last_mtime.map_or(true, |last| mtime > last);
            if !newer {
                continue;
            }
            entry.last_mtime = Some(mtime);

            let sessions = self.sessions.read().await;
            for addr in &entry.addresses {
                let Some(peer) = sessions.get(addr) else {
                    continue;
                };
                match peer.tx.try_send(Message::Text(UPDATE_FRAME.to_string())) {
                    Ok(()) => {}
                    // Full queue: the client is behind; the cue is
                    // redundant once it catches up.
                    Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Closed(_)) => closed.push((*addr, peer.token)),
                }
            }
            debug!(%job, "playlist updated, cued watchers");
        }
        drop(watches);

        for (addr, token) in closed {
            warn!(%addr, "websocket peer gone, closing session");
            self.deregister(addr, token).await;
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn forget_observed_mtime(&self, job: Uuid) {
        if let Some(entry) = self.watches.lock().await.get_mut(&job) {
            entry.last_mtime = None;
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task that drives [`NotificationHub::poll_playlists`] on a
/// fixed period, independent of any in-flight request. Spawned at server
/// start and stopped through the shutdown channel.
pub struct PlaylistWatcher {
    hub: std::sync::Arc<NotificationHub>,
    layout: StorageLayout,
    period: Duration,
}

impl PlaylistWatcher {
    pub fn new(hub: std::sync::Arc<NotificationHub>, layout: StorageLayout, period: Duration) -> Self {
        Self { hub, layout, period }
    }

    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.hub.poll_playlists(&self.layout).await,
                    _ = shutdown.changed() => break,
                }
            }
            debug!("playlist watcher stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn addr(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    fn layout_in(dir: &tempfile::TempDir) -> StorageLayout {
        let root = dir.path();
        StorageLayout::new(
            root.join("output"),
            root.join("profiles"),
            root.join("references"),
        )
    }

    fn write_playlist(layout: &StorageLayout, job: Uuid) {
        let path = layout.playlist_path(job);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "#EXTM3U\n#EXT-X-VERSION:3\n").expect("write playlist");
    }

    fn frame_text(message: Message) -> String {
        match message {
            Message::Text(text) => text,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn later_connection_replaces_earlier_one() {
        let hub = NotificationHub::new();
        let job = Uuid::new_v4();
        let (tx1, mut rx1) = mpsc::channel(PEER_QUEUE_DEPTH);
        let (tx2, mut rx2) = mpsc::channel(PEER_QUEUE_DEPTH);

        hub.register(addr(1), job, tx1).await;
        hub.register(addr(1), job, tx2).await;
        assert_eq!(hub.session_count().await, 1);

        hub.send_to_addr(addr(1), &"hello").await;

        assert_eq!(frame_text(rx2.recv().await.expect("frame")), "\"hello\"");
        // The replaced connection's sender was dropped.
        assert!(matches!(
            rx1.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn stale_deregister_keeps_replacement_session() {
        let hub = NotificationHub::new();
        let job = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::channel(PEER_QUEUE_DEPTH);
        let (tx2, _rx2) = mpsc::channel(PEER_QUEUE_DEPTH);

        let old_token = hub.register(addr(1), job, tx1).await;
        hub.register(addr(1), job, tx2).await;

        hub.deregister(addr(1), old_token).await;
        assert_eq!(hub.session_count().await, 1);
    }

    #[tokio::test]
    async fn switching_jobs_stops_cues_for_the_previous_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout_in(&dir);
        let hub = NotificationHub::new();
        let (old_job, new_job) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx1, _rx1) = mpsc::channel(PEER_QUEUE_DEPTH);
        let (tx2, mut rx2) = mpsc::channel(PEER_QUEUE_DEPTH);

        hub.register(addr(1), old_job, tx1).await;
        hub.register(addr(1), new_job, tx2).await;

        write_playlist(&layout, old_job);
        hub.poll_playlists(&layout).await;
        assert!(rx2.try_recv().is_err());

        write_playlist(&layout, new_job);
        hub.poll_playlists(&layout).await;
        assert_eq!(frame_text(rx2.try_recv().expect("cue")), UPDATE_FRAME);
    }

    #[tokio::test]
    async fn send_to_unknown_address_is_a_no_op() {
        let hub = NotificationHub::new();
        hub.send_to_addr(addr(9), &"anything").await;
    }

    #[tokio::test]
    async fn playlist_change_cues_exactly_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout_in(&dir);
        let hub = NotificationHub::new();
        let job = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(PEER_QUEUE_DEPTH);

        hub.register(addr(1), job, tx).await;
        write_playlist(&layout, job);

        hub.poll_playlists(&layout).await;
        assert_eq!(frame_text(rx.try_recv().expect("first cue")), UPDATE_FRAME);

        // Unchanged mtime: zero frames.
        hub.poll_playlists(&layout).await;
        assert!(rx.try_recv().is_err());

        // A newer mtime cues again.
        hub.forget_observed_mtime(job).await;
        hub.poll_playlists(&layout).await;
        assert_eq!(frame_text(rx.try_recv().expect("second cue")), UPDATE_FRAME);
    }

    #[tokio::test]
    async fn absent_playlist_cues_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout_in(&dir);
        let hub = NotificationHub::new();
        let (tx, mut rx) = mpsc::channel(PEER_QUEUE_DEPTH);

        hub.register(addr(1), Uuid::new_v4(), tx).await;
        hub.poll_playlists(&layout).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failing_peer_is_closed_and_others_still_cued() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout_in(&dir);
        let hub = NotificationHub::new();
        let job = Uuid::new_v4();

        let (tx_dead, rx_dead) = mpsc::channel(PEER_QUEUE_DEPTH);
        let (tx_live, mut rx_live) = mpsc::channel(PEER_QUEUE_DEPTH);
        hub.register(addr(1), job, tx_dead).await;
        hub.register(addr(2), job, tx_live).await;
        drop(rx_dead);

        write_playlist(&layout, job);
        hub.poll_playlists(&layout).await;

        assert_eq!(frame_text(rx_live.try_recv().expect("cue")), UPDATE_FRAME);
        assert_eq!(hub.session_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_stops_on_shutdown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout_in(&dir);
        let hub = Arc::new(NotificationHub::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = PlaylistWatcher::new(hub, layout, Duration::from_millis(500))
            .spawn(shutdown_rx);

        shutdown_tx.send(true).expect("signal shutdown");
        handle.await.expect("watcher exits cleanly");
    }
}
