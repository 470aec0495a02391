use std::collections::HashMap;

use crate::ConnId;

/// Best-effort index of which connection currently represents a user.
///
/// One connection per user, last registration wins. A missing entry does
/// not mean the user is offline everywhere, only that this process holds no
/// current connection for them.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    by_user: HashMap<i64, ConnId>,
    by_conn: HashMap<ConnId, i64>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to `conn_id`, replacing any earlier binding.
    /// Anonymous connections are not tracked. Returns the connection that
    /// was displaced, if any.
    pub fn on_connect(&mut self, user_id: Option<i64>, conn_id: ConnId) -> Option<ConnId> {
        let user_id = user_id?;
        self.by_conn.insert(conn_id, user_id);
        self.by_user.insert(user_id, conn_id).filter(|prev| *prev != conn_id)
    }

    /// Forget `conn_id`. The user entry is only removed while it still
    /// points at this connection; a newer connection keeps its binding.
    /// Returns the user that went offline, if any.
    pub fn on_disconnect(&mut self, conn_id: ConnId) -> Option<i64> {
        let user_id = self.by_conn.remove(&conn_id)?;
        if self.by_user.get(&user_id) == Some(&conn_id) {
            self.by_user.remove(&user_id);
            Some(user_id)
        } else {
            None
        }
    }

    pub fn connection_for(&self, user_id: i64) -> Option<ConnId> {
        self.by_user.get(&user_id).copied()
    }

    pub fn online_users(&self) -> Vec<i64> {
        let mut users: Vec<i64> = self.by_user.keys().copied().collect();
        users.sort_unstable();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn anonymous_connections_are_not_tracked() {
        let mut presence = PresenceRegistry::new();
        assert_eq!(presence.on_connect(None, Uuid::new_v4()), None);
        assert!(presence.online_users().is_empty());
    }

    #[test]
    fn connect_is_idempotent_per_connection() {
        let mut presence = PresenceRegistry::new();
        let conn = Uuid::new_v4();
        assert_eq!(presence.on_connect(Some(1), conn), None);
        assert_eq!(presence.on_connect(Some(1), conn), None);
        assert_eq!(presence.connection_for(1), Some(conn));
    }

    #[test]
    fn reconnect_replaces_and_old_disconnect_is_ignored() {
        let mut presence = PresenceRegistry::new();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();

        presence.on_connect(Some(1), old);
        assert_eq!(presence.on_connect(Some(1), new), Some(old));

        assert_eq!(presence.on_disconnect(old), None);
        assert_eq!(presence.connection_for(1), Some(new));

        assert_eq!(presence.on_disconnect(new), Some(1));
        assert_eq!(presence.connection_for(1), None);
    }

    #[test]
    fn unknown_disconnect_is_noop() {
        let mut presence = PresenceRegistry::new();
        presence.on_connect(Some(5), Uuid::new_v4());
        assert_eq!(presence.on_disconnect(Uuid::new_v4()), None);
        assert_eq!(presence.online_users(), vec![5]);
    }
}
