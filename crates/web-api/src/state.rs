use std::sync::Arc;

use application::{ChatService, UserService};
use infrastructure::LocalConnectionHub;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub chat_service: Arc<ChatService>,
    pub hub: Arc<LocalConnectionHub>,
    pub jwt_service: Arc<JwtService>,
    /// 允许 WebSocket `authenticate` 直接携带用户名
    pub allow_plain_username: bool,
}

impl AppState {
    pub fn new(
        user_service: Arc<UserService>,
        chat_service: Arc<ChatService>,
        hub: Arc<LocalConnectionHub>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            user_service,
            chat_service,
            hub,
            jwt_service,
            allow_plain_username: false,
        }
    }

    pub fn with_plain_username(mut self, allow: bool) -> Self {
        self.allow_plain_username = allow;
        self
    }
}
