//! Connection indirection table: (identity, tab) -> live outbound channel
//!
//! Matches and tournaments never hold sockets. They look a recipient up here
//! at send time, so a closed or replaced connection just misses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::protocol::ServerMsg;

/// Outbound buffer per connection
pub const OUTBOUND_CAPACITY: usize = 256;

#[derive(Clone)]
struct Connection {
    conn_id: u64,
    tx: mpsc::Sender<ServerMsg>,
}

#[derive(Clone, Default)]
pub struct ConnectionTable {
    connections: Arc<DashMap<(Uuid, Uuid), Connection>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a tab, replacing any previous one.
    /// Returns the connection id needed to unregister it.
    pub fn register(&self, identity: Uuid, tab_id: Uuid, tx: mpsc::Sender<ServerMsg>) -> u64 {
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.connections
            .insert((identity, tab_id), Connection { conn_id, tx });
        conn_id
    }

    /// Remove the connection, unless it has already been replaced by a newer one
    pub fn unregister(&self, identity: Uuid, tab_id: Uuid, conn_id: u64) -> bool {
        self.connections
            .remove_if(&(identity, tab_id), |_, conn| conn.conn_id == conn_id)
            .is_some()
    }

    pub fn is_connected(&self, identity: Uuid, tab_id: Uuid) -> bool {
        self.connections.contains_key(&(identity, tab_id))
    }

    /// Send without waiting. Failures are logged and swallowed.
    pub fn send(&self, identity: Uuid, tab_id: Uuid, msg: ServerMsg) -> bool {
        let Some(tx) = self
            .connections
            .get(&(identity, tab_id))
            .map(|conn| conn.tx.clone())
        else {
            debug!(identity = %identity, tab_id = %tab_id, "No connection for recipient");
            return false;
        };

        match tx.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                debug!(identity = %identity, tab_id = %tab_id, error = %e, "Push dropped");
                false
            }
        }
    }

    /// Send to every open tab of an identity
    pub fn send_to_identity(&self, identity: Uuid, msg: &ServerMsg) -> usize {
        let tabs: Vec<Uuid> = self
            .connections
            .iter()
            .filter(|entry| entry.key().0 == identity)
            .map(|entry| entry.key().1)
            .collect();

        tabs.into_iter()
            .filter(|tab| self.send(identity, *tab, msg.clone()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replaced_connection_is_not_removed_by_stale_owner() {
        let table = ConnectionTable::new();
        let (identity, tab) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);

        let first = table.register(identity, tab, tx1);
        let second = table.register(identity, tab, tx2);

        assert!(!table.unregister(identity, tab, first));
        assert!(table.send(identity, tab, ServerMsg::Ping));
        assert_eq!(rx2.recv().await, Some(ServerMsg::Ping));
        assert!(table.unregister(identity, tab, second));
        assert!(!table.is_connected(identity, tab));
    }

    #[tokio::test]
    async fn send_to_missing_or_closed_recipient_is_swallowed() {
        let table = ConnectionTable::new();
        let (identity, tab) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(!table.send(identity, tab, ServerMsg::Ping));

        let (tx, rx) = mpsc::channel(1);
        table.register(identity, tab, tx);
        drop(rx);
        assert!(!table.send(identity, tab, ServerMsg::Ping));
    }

    #[tokio::test]
    async fn identity_fanout_reaches_every_tab() {
        let table = ConnectionTable::new();
        let identity = Uuid::new_v4();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        table.register(identity, Uuid::new_v4(), tx1);
        table.register(identity, Uuid::new_v4(), tx2);
        table.register(Uuid::new_v4(), Uuid::new_v4(), mpsc::channel(4).0);

        assert_eq!(table.send_to_identity(identity, &ServerMsg::Ping), 2);
        assert_eq!(rx1.recv().await, Some(ServerMsg::Ping));
        assert_eq!(rx2.recv().await, Some(ServerMsg::Ping));
    }
}
