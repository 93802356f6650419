use crate::domain::{BufferStats, SessionCount};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;
use warp::ws::Message;

pub type SessionId = Uuid;

/// Counters for the broadcast side of the server.
#[derive(Debug, Default)]
pub struct BroadcastStats {
    pub connections_accepted: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub messages_sent: AtomicU64,
    pub send_failures: AtomicU64,
}

impl BroadcastStats {
    pub fn snapshot(&self) -> BroadcastStatsSnapshot {
        BroadcastStatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastStatsSnapshot {
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    pub messages_sent: u64,
    pub send_failures: u64,
}

#[derive(Debug)]
struct SessionHandle {
    tx: mpsc::UnboundedSender<Message>,
}

/// The live subscriber set.
///
/// Each session is an outbound queue drained by that connection's pump task.
/// A send fails once the pump has gone away, which is how dead sessions are
/// detected and pruned.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    max_sessions: usize,
    stats: BroadcastStats,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            stats: BroadcastStats::default(),
        }
    }

    /// Adds a session, or returns `None` when the session limit is reached.
    pub fn register(&self) -> Option<(SessionId, mpsc::UnboundedReceiver<Message>)> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                current = sessions.len(),
                max = self.max_sessions,
                "Rejecting session: limit reached"
            );
            return None;
        }

        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        sessions.insert(id, SessionHandle { tx });
        self.stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
        Some((id, rx))
    }

    pub fn remove(&self, id: SessionId) -> bool {
        self.sessions.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn stats(&self) -> &BroadcastStats {
        &self.stats
    }

    /// Sends the current session count to every session.
    ///
    /// Sessions that fail are pruned and the count is sent again, until a
    /// round completes without failures. Returns the final count.
    pub fn broadcast_session_count(&self) -> usize {
        loop {
            let count = self.len();
            if count == 0 {
                return 0;
            }

            let payload = match serde_json::to_string(&SessionCount { count }) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize session count");
                    return count;
                }
            };

            let (_, failed) = self.send_to_all(&Message::text(payload));
            if failed.is_empty() {
                debug!(count, "Broadcast session count");
                return count;
            }
            self.prune(&failed);
        }
    }

    /// Pushes a snapshot, or an explicit `null` when there is none.
    ///
    /// Returns the number of sessions it reached. Sessions that fail are
    /// pruned and the survivors get a fresh session count.
    pub fn send_update(&self, stats: Option<&BufferStats>) -> usize {
        if self.is_empty() {
            return 0;
        }

        let payload = match stats {
            Some(stats) => match serde_json::to_string(stats) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize stats snapshot");
                    return 0;
                }
            },
            None => "null".to_string(),
        };

        let (delivered, failed) = self.send_to_all(&Message::text(payload));
        if !failed.is_empty() {
            self.prune(&failed);
            self.broadcast_session_count();
        }
        delivered
    }

    /// Queues a close frame for every session.
    pub fn close_all(&self) {
        let (closed, _) = self.send_to_all(&Message::close());
        debug!(closed, "Queued close frames");
    }

    /// Drops every session without notifying it.
    pub fn clear(&self) {
        self.sessions.write().clear();
    }

    fn send_to_all(&self, message: &Message) -> (usize, Vec<SessionId>) {
        let sessions = self.sessions.read();
        let mut delivered = 0usize;
        let mut failed = Vec::new();

        for (id, session) in sessions.iter() {
            if session.tx.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                failed.push(*id);
            }
        }

        self.stats
            .messages_sent
            .fetch_add(delivered as u64, Ordering::Relaxed);
        if !failed.is_empty() {
            self.stats
                .send_failures
                .fetch_add(failed.len() as u64, Ordering::Relaxed);
        }
        (delivered, failed)
    }

    fn prune(&self, failed: &[SessionId]) {
        let mut sessions = self.sessions.write();
        for id in failed {
            if sessions.remove(id).is_some() {
                debug!(session_id = %id, "Removed session after failed send");
            }
        }
    }
}
