#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    ChatService, ChatServiceDependencies, PresenceRegistry, SystemClock, UserService,
    UserServiceDependencies,
};
use futures_util::{SinkExt, StreamExt};
use infrastructure::{Infrastructure, InfrastructureConfig};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use web_api::{router, AppState, JwtConfig, JwtService};

pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServerOptions {
    pub allow_plain_username: bool,
    pub ring_timeout: Option<Duration>,
}

/// 启动一个使用内存 SQLite 的服务，监听随机端口
pub async fn spawn_server(options: ServerOptions) -> TestServer {
    let infrastructure = Infrastructure::connect(InfrastructureConfig {
        bcrypt_cost: Some(4),
        ..InfrastructureConfig::default()
    })
    .await
    .expect("infrastructure");

    let user_service = UserService::new(UserServiceDependencies {
        user_repository: infrastructure.user_repository.clone(),
        password_hasher: infrastructure.password_hasher_trait(),
        clock: Arc::new(SystemClock),
    });
    let chat_service = ChatService::new(ChatServiceDependencies {
        presence: Arc::new(PresenceRegistry::new()),
        message_store: infrastructure.message_store.clone(),
        dispatcher: infrastructure.dispatcher(),
        clock: Arc::new(SystemClock),
        ring_timeout: options.ring_timeout,
    });
    let jwt_service = Arc::new(JwtService::new(JwtConfig {
        secret: "integration-test-secret-at-least-32-chars".to_string(),
        expiration_hours: 1,
    }));

    let state = AppState::new(
        Arc::new(user_service),
        Arc::new(chat_service),
        infrastructure.hub.clone(),
        jwt_service,
    )
    .with_plain_username(options.allow_plain_username);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = router(state);

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        addr,
        client: Client::new(),
        shutdown: Some(shutdown_tx),
    }
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn register(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.http("/api/register"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("register request")
    }

    pub async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.http("/api/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("login request")
    }

    /// 注册并登录，返回令牌
    pub async fn token_for(&self, username: &str) -> String {
        self.register(username, "secret").await;
        let body: Value = self
            .login(username, "secret")
            .await
            .json()
            .await
            .expect("login json");
        body["token"].as_str().expect("token").to_string()
    }

    pub async fn connect(&self) -> WsClient {
        let (stream, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("connect websocket");
        WsClient { stream }
    }

    /// 打开连接并用令牌认证，消费掉认证产生的在线列表与公共历史
    pub async fn connect_as(&self, username: &str) -> WsClient {
        let token = self.token_for(username).await;
        let mut client = self.connect().await;
        client
            .send(json!({ "type": "authenticate", "token": token }))
            .await;
        client.expect("commonHistory").await;
        client
    }
}

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn send(&mut self, event: Value) {
        self.stream
            .send(Message::Text(event.to_string().into()))
            .await
            .expect("send frame");
    }

    pub async fn send_raw(&mut self, frame: &str) {
        self.stream
            .send(Message::Text(frame.to_string().into()))
            .await
            .expect("send frame");
    }

    /// 读取下一个 JSON 事件，超时返回 `None`
    pub async fn next_event(&mut self, wait: Duration) -> Option<Value> {
        loop {
            let message = timeout(wait, self.stream.next()).await.ok()??.ok()?;
            if let Message::Text(text) = message {
                return serde_json::from_str(text.as_str()).ok();
            }
        }
    }

    /// 跳过其他事件，直到收到指定类型的事件
    pub async fn expect(&mut self, event_type: &str) -> Value {
        loop {
            let event = self
                .next_event(Duration::from_secs(5))
                .await
                .unwrap_or_else(|| panic!("timed out waiting for {event_type}"));
            if event["type"] == event_type {
                return event;
            }
        }
    }

    /// 在短时间内收集所有到达的事件
    pub async fn drain(&mut self) -> Vec<Value> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event(Duration::from_millis(300)).await {
            events.push(event);
        }
        events
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
