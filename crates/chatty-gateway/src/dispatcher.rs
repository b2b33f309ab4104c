use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use chatty_types::events::GatewayEvent;

/// Manages all connected clients: targeted delivery of new messages and
/// presence broadcasts.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Presence changes fan out to every connection
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Track online users: user_id -> username
    online_users: RwLock<HashMap<Uuid, String>>,

    /// Per-user targeted send channels: user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Default for DispatcherInner {
    fn default() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            broadcast_tx,
            online_users: RwLock::new(HashMap::new()),
            user_channels: RwLock::new(HashMap::new()),
        }
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to gateway broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. A newer connection for the same
    /// user replaces the older one. Returns (conn_id, receiver).
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.user_channels.write().await.insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to a specific user. Returns false when the user
    /// has no live connection; the message is still in storage for later.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let channels = self.inner.user_channels.read().await;
        match channels.get(&user_id) {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => {
                debug!("User {} offline, skipping push", user_id);
                false
            }
        }
    }

    /// Register a user as online.
    pub async fn user_online(&self, user_id: Uuid, username: String) {
        self.inner
            .online_users
            .write()
            .await
            .insert(user_id, username);

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            online: true,
        });
    }

    /// Register a user as offline. Only cleans up if conn_id matches.
    pub async fn user_offline(&self, user_id: Uuid, conn_id: Uuid) {
        // Only clean up if this connection still owns the user channel
        let is_current = {
            let channels = self.inner.user_channels.read().await;
            channels.get(&user_id).is_some_and(|(cid, _)| *cid == conn_id)
        };

        if !is_current {
            // A newer connection has taken over
            return;
        }

        self.inner.online_users.write().await.remove(&user_id);
        self.unregister_user_channel(user_id, conn_id).await;

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            online: false,
        });
    }

    pub async fn online_user_ids(&self) -> Vec<Uuid> {
        self.inner.online_users.read().await.keys().copied().collect()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.online_users.read().await.contains_key(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn targeted_send_reaches_only_that_user() {
        let dispatcher = Dispatcher::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (_, mut alice_rx) = dispatcher.register_user_channel(alice).await;
        let (_, mut bob_rx) = dispatcher.register_user_channel(bob).await;

        let event = GatewayEvent::PresenceUpdate {
            user_id: alice,
            online: true,
        };
        assert!(dispatcher.send_to_user(bob, event).await);

        assert!(matches!(bob_rx.recv().await, Some(GatewayEvent::PresenceUpdate { .. })));
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_offline_user_reports_false() {
        let dispatcher = Dispatcher::new();
        let event = GatewayEvent::OnlineUsers { user_ids: vec![] };
        assert!(!dispatcher.send_to_user(Uuid::new_v4(), event).await);
    }

    #[tokio::test]
    async fn presence_is_broadcast_and_tracked() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let alice = Uuid::new_v4();

        let (conn_id, _alice_rx) = dispatcher.register_user_channel(alice).await;
        dispatcher.user_online(alice, "alice".into()).await;
        assert!(dispatcher.is_online(alice).await);
        assert!(matches!(
            rx.recv().await.unwrap(),
            GatewayEvent::PresenceUpdate { online: true, .. }
        ));

        dispatcher.user_offline(alice, conn_id).await;
        assert!(!dispatcher.is_online(alice).await);
        assert!(matches!(
            rx.recv().await.unwrap(),
            GatewayEvent::PresenceUpdate { online: false, .. }
        ));
    }

    #[tokio::test]
    async fn stale_connection_does_not_take_user_offline() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();

        let (old_conn, _old_rx) = dispatcher.register_user_channel(alice).await;
        let (_new_conn, _new_rx) = dispatcher.register_user_channel(alice).await;
        dispatcher.user_online(alice, "alice".into()).await;

        dispatcher.user_offline(alice, old_conn).await;
        assert!(dispatcher.is_online(alice).await);
        assert_eq!(dispatcher.online_user_ids().await, vec![alice]);
    }
}
