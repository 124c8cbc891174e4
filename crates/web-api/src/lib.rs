//! Web API 层。
//!
//! 提供 Axum 路由：账户相关的 HTTP 接口，以及把实时事件委托给应用层的 `/ws` 端点。

mod auth;
mod error;
mod events;
mod routes;
mod state;
mod ws_connection;

pub use auth::{Claims, JwtService, LoginResponse};
pub use config::JwtConfig;
pub use error::ApiError;
pub use events::ClientEvent;
pub use routes::router;
pub use state::AppState;
