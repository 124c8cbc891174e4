use application::EventDispatcher;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ConnectionId, Username};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::ApiError;
use crate::events::{outgoing_content, ClientEvent};
use crate::state::AppState;

/// WebSocket 连接
///
/// 每个连接在投递表中拥有一个有序的出站队列，由独立的发送任务写回客户端。
/// 入站帧在接收循环中逐个处理，前一个事件处理完成前不会读取下一个，
/// 因此同一连接上的事件严格按到达顺序生效。
pub struct WebSocketConnection {
    state: AppState,
    connection: ConnectionId,
}

impl WebSocketConnection {
    pub fn new(state: AppState) -> Self {
        let connection = ConnectionId::new();
        tracing::info!(connection_id = %connection, "WebSocket 连接已建立");
        Self { state, connection }
    }

    /// 运行连接的主循环，直到任意一端关闭
    pub async fn run(self, socket: WebSocket) {
        let mut outbound = self.state.hub.register(self.connection);
        let (mut sender, mut incoming) = socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let connection = self.connection;
        let mut send_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                    },
                    Some(event) = outbound.recv() => match serde_json::to_string(&event) {
                        Ok(json) => WsMessage::Text(json.into()),
                        Err(err) => {
                            tracing::warn!(connection_id = %connection, error = %err, "failed to serialize websocket payload");
                            continue;
                        }
                    },
                    else => break,
                };
                if sender.send(frame).await.is_err() {
                    tracing::warn!(connection_id = %connection, "Failed to send websocket frame");
                    break;
                }
            }
            tracing::debug!(connection_id = %connection, "WebSocket发送任务结束");
        });

        let receive = async {
            while let Some(Ok(message)) = incoming.next().await {
                if self.handle_incoming(message, &cmd_tx).await.is_err() {
                    break;
                }
            }
        };

        // 等待任意一端结束（连接断开）
        tokio::select! {
            _ = &mut send_task => {
                tracing::debug!(connection_id = %self.connection, "WebSocket发送任务完成");
            }
            _ = receive => {
                tracing::debug!(connection_id = %self.connection, "WebSocket接收循环完成");
            }
        }
        send_task.abort();

        // 先移出投递表，断开后的在线列表广播不再投递给自己
        self.state.hub.remove(self.connection);
        self.state.chat_service.disconnect(self.connection).await;

        tracing::info!(connection_id = %self.connection, "WebSocket连接已断开，在线状态已清理");
    }

    /// 处理来自客户端的帧；返回 `Err` 表示应当关闭连接
    async fn handle_incoming(
        &self,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Close(_) => {
                tracing::info!(connection_id = %self.connection, "WebSocket收到关闭消息");
                return Err(());
            }
            WsMessage::Ping(data) => {
                if cmd_tx
                    .send(WsCommand::SendPong(data.to_vec()))
                    .await
                    .is_err()
                {
                    tracing::warn!("Failed to send pong command");
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {}
            WsMessage::Text(text) => {
                if let Err(err) = self.handle_frame(text.as_str()).await {
                    self.report(err);
                }
            }
            WsMessage::Binary(_) => {
                if self
                    .state
                    .chat_service
                    .presence()
                    .username_of(self.connection)
                    .await
                    .is_none()
                {
                    tracing::debug!(connection_id = %self.connection, "未认证连接的二进制帧，丢弃");
                    return Ok(());
                }
                self.report(ApiError::new(
                    axum::http::StatusCode::BAD_REQUEST,
                    "MALFORMED_PAYLOAD",
                    "binary frames are not supported",
                ));
            }
        }
        Ok(())
    }

    /// 错误只回报给发起的连接
    fn report(&self, err: ApiError) {
        tracing::debug!(connection_id = %self.connection, code = err.code(), "事件处理失败");
        if let Err(err) = self.state.hub.send(self.connection, err.into_event()) {
            tracing::warn!(connection_id = %self.connection, error = %err, "无法回报错误");
        }
    }

    async fn handle_frame(&self, frame: &str) -> Result<(), ApiError> {
        let chat = &self.state.chat_service;
        let connection = self.connection;

        // 认证前只处理 authenticate，其余帧（包括格式错误的）一律静默丢弃
        if !ClientEvent::is_authenticate(frame)
            && chat.presence().username_of(connection).await.is_none()
        {
            tracing::debug!(connection_id = %connection, "未认证连接的事件，丢弃");
            return Ok(());
        }

        match ClientEvent::decode(frame)? {
            ClientEvent::Authenticate { token, username } => {
                let username = self.resolve_identity(token, username)?;
                chat.authenticate(connection, username).await?;
            }
            ClientEvent::SendCommon {
                kind,
                content,
                text,
            } => {
                let payload = outgoing_content(kind, content, text)?;
                chat.send_common(connection, payload).await?;
            }
            ClientEvent::SendPrivate {
                to,
                kind,
                content,
                text,
            } => {
                let payload = outgoing_content(kind, content, text)?;
                chat.send_private(connection, to, payload).await?;
            }
            ClientEvent::MarkSeen { peer } => {
                chat.mark_seen(connection, peer).await?;
            }
            ClientEvent::LoadHistory { peer } => {
                chat.load_history(connection, peer).await?;
            }
            ClientEvent::CallUser { to, offer } => chat.call_user(connection, to, offer).await,
            ClientEvent::AnswerCall { to, answer } => {
                chat.answer_call(connection, to, answer).await
            }
            ClientEvent::IceCandidate { to, candidate } => {
                chat.ice_candidate(connection, to, candidate).await
            }
            ClientEvent::EndCall { to } => chat.end_call(connection, to).await,
        }
        Ok(())
    }

    /// 令牌优先；只有在配置允许时才接受裸用户名
    fn resolve_identity(
        &self,
        token: Option<String>,
        username: Option<String>,
    ) -> Result<Username, ApiError> {
        match (token, username) {
            (Some(token), _) => self.state.jwt_service.verify_token(&token),
            (None, Some(username)) if self.state.allow_plain_username => Username::parse(username)
                .map_err(|err| ApiError::bad_request(err.to_string())),
            (None, Some(_)) => Err(ApiError::unauthorized(
                "plain username authentication is disabled",
            )),
            (None, None) => Err(ApiError::new(
                axum::http::StatusCode::BAD_REQUEST,
                "MALFORMED_PAYLOAD",
                "missing field `token`",
            )),
        }
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
