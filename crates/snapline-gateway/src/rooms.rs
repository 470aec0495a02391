use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::ConnId;

/// Name of a broadcast group. Opaque to the router; whether the referenced
/// user or post exists is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Direct-message room of a user.
    pub fn user(user_id: i64) -> Self {
        Self(format!("user:{user_id}"))
    }

    /// Comment/like room of a post.
    pub fn post(post_id: i64) -> Self {
        Self(format!("post:{post_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room membership table. Pure runtime state: it starts empty and is only
/// ever filled by live connections joining.
#[derive(Debug, Default)]
pub struct RoomRouter {
    rooms: HashMap<RoomKey, HashSet<ConnId>>,
    memberships: HashMap<ConnId, HashSet<RoomKey>>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the connection was already a member.
    pub fn join(&mut self, conn_id: ConnId, room: RoomKey) -> bool {
        let added = self.rooms.entry(room.clone()).or_default().insert(conn_id);
        self.memberships.entry(conn_id).or_default().insert(room);
        added
    }

    /// Returns false if the connection was not a member.
    pub fn leave(&mut self, conn_id: ConnId, room: &RoomKey) -> bool {
        if let Some(joined) = self.memberships.get_mut(&conn_id) {
            joined.remove(room);
            if joined.is_empty() {
                self.memberships.remove(&conn_id);
            }
        }
        self.remove_member(room, conn_id)
    }

    /// Drop every membership of a connection. Returns the rooms it was in.
    pub fn leave_all(&mut self, conn_id: ConnId) -> Vec<RoomKey> {
        let joined = self.memberships.remove(&conn_id).unwrap_or_default();
        for room in &joined {
            self.remove_member(room, conn_id);
        }
        let mut joined: Vec<RoomKey> = joined.into_iter().collect();
        joined.sort();
        joined
    }

    pub fn members(&self, room: &RoomKey) -> Vec<ConnId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Union of the members of several rooms, each connection once.
    pub fn members_of_any(&self, rooms: &[RoomKey]) -> HashSet<ConnId> {
        rooms
            .iter()
            .filter_map(|room| self.rooms.get(room))
            .flatten()
            .copied()
            .collect()
    }

    pub fn rooms_of(&self, conn_id: ConnId) -> Vec<RoomKey> {
        let mut rooms: Vec<RoomKey> = self
            .memberships
            .get(&conn_id)
            .map(|joined| joined.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn remove_member(&mut self, room: &RoomKey, conn_id: ConnId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&conn_id);
        if members.is_empty() {
            self.rooms.remove(room);
        }
        removed
    }
}
