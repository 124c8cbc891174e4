//! 在线状态注册表
//!
//! 维护"连接 -> 用户名"以及"用户名 -> 连接集合"两张表，二者在同一把锁下修改，
//! 因此任何时刻看到的在线用户集合都与连接表一致。状态只存在于内存中，
//! 进程重启后所有用户都视为离线，直到重新连接。

use std::collections::{BTreeSet, HashMap, HashSet};

use domain::{ConnectionId, Username};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct PresenceState {
    connections: HashMap<ConnectionId, Username>,
    sessions: HashMap<Username, HashSet<ConnectionId>>,
}

impl PresenceState {
    fn detach(&mut self, connection: ConnectionId) -> Option<Username> {
        let username = self.connections.remove(&connection)?;
        if let Some(set) = self.sessions.get_mut(&username) {
            set.remove(&connection);
            if set.is_empty() {
                self.sessions.remove(&username);
            }
        }
        Some(username)
    }
}

#[derive(Default)]
pub struct PresenceRegistry {
    state: RwLock<PresenceState>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定连接与用户名。同一连接重复注册时覆盖旧的绑定，返回旧用户名。
    pub async fn register(&self, connection: ConnectionId, username: Username) -> Option<Username> {
        let mut state = self.state.write().await;
        let previous = state.detach(connection);
        state
            .sessions
            .entry(username.clone())
            .or_default()
            .insert(connection);
        state.connections.insert(connection, username);
        previous
    }

    /// 解除绑定；连接未注册时什么也不做。
    pub async fn unregister(&self, connection: ConnectionId) -> Option<Username> {
        let removed = self.state.write().await.detach(connection);
        if removed.is_none() {
            debug!(%connection, "注销未认证的连接，忽略");
        }
        removed
    }

    /// 某用户当前的所有在线连接，离线时为空
    pub async fn resolve(&self, username: &Username) -> BTreeSet<ConnectionId> {
        self.state
            .read()
            .await
            .sessions
            .get(username)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn username_of(&self, connection: ConnectionId) -> Option<Username> {
        self.state.read().await.connections.get(&connection).cloned()
    }

    /// 当前在线的用户名（去重，按字典序）
    pub async fn online_usernames(&self) -> Vec<Username> {
        let state = self.state.read().await;
        let mut users: Vec<Username> = state.sessions.keys().cloned().collect();
        users.sort();
        users
    }

    /// 所有已认证的连接
    pub async fn connections(&self) -> Vec<ConnectionId> {
        self.state.read().await.connections.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    #[tokio::test]
    async fn online_usernames_tracks_connections() {
        let registry = PresenceRegistry::new();
        let first = ConnectionId::new();
        let second = ConnectionId::new();
        let third = ConnectionId::new();

        registry.register(first, user("alice")).await;
        registry.register(second, user("alice")).await;
        registry.register(third, user("bob")).await;
        assert_eq!(
            registry.online_usernames().await,
            vec![user("alice"), user("bob")]
        );
        assert_eq!(registry.resolve(&user("alice")).await.len(), 2);

        registry.unregister(first).await;
        assert_eq!(
            registry.online_usernames().await,
            vec![user("alice"), user("bob")]
        );

        registry.unregister(second).await;
        assert_eq!(registry.online_usernames().await, vec![user("bob")]);
        assert!(registry.resolve(&user("alice")).await.is_empty());
    }

    #[tokio::test]
    async fn reregistering_overwrites_previous_identity() {
        let registry = PresenceRegistry::new();
        let connection = ConnectionId::new();

        assert_eq!(registry.register(connection, user("alice")).await, None);
        assert_eq!(
            registry.register(connection, user("bob")).await,
            Some(user("alice"))
        );

        assert_eq!(registry.online_usernames().await, vec![user("bob")]);
        assert_eq!(registry.username_of(connection).await, Some(user("bob")));
        assert_eq!(registry.connections().await, vec![connection]);
    }

    #[tokio::test]
    async fn unregister_unknown_connection_is_noop() {
        let registry = PresenceRegistry::new();
        assert_eq!(registry.unregister(ConnectionId::new()).await, None);
        assert!(registry.online_usernames().await.is_empty());
    }
}
