//! 通话信令中继
//!
//! 服务端只在两个用户之间转发不透明的协商负载，从不解析其内容。
//! 每个无序用户对至多一个会话：没有会话即 Idle，`callUser` 进入 Ringing，
//! `answerCall` 进入 Active，`endCall` 或任一方断开回到 Idle。
//! 非法的状态迁移一律静默丢弃。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use domain::{CallKey, CallPhase, CallSession, ConnectionId, Username};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    broadcaster::{fan_out, EventDispatcher},
    dto::ServerEvent,
    presence::PresenceRegistry,
};

type Sessions = Arc<Mutex<HashMap<CallKey, CallSession>>>;

pub struct CallRelay {
    presence: Arc<PresenceRegistry>,
    dispatcher: Arc<dyn EventDispatcher>,
    sessions: Sessions,
    generation: AtomicU64,
    ring_timeout: Option<Duration>,
}

impl CallRelay {
    pub fn new(
        presence: Arc<PresenceRegistry>,
        dispatcher: Arc<dyn EventDispatcher>,
        ring_timeout: Option<Duration>,
    ) -> Self {
        Self {
            presence,
            dispatcher,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            ring_timeout,
        }
    }

    /// 当前用户对的会话阶段，Idle 时为 `None`
    pub async fn phase(&self, a: &Username, b: &Username) -> Option<CallPhase> {
        self.sessions
            .lock()
            .await
            .get(&CallKey::new(a, b))
            .map(|session| session.phase)
    }

    pub async fn call_user(&self, connection: ConnectionId, callee: Username, offer: Value) {
        let Some(caller) = self.presence.username_of(connection).await else {
            debug!(%connection, "未认证连接发起呼叫，丢弃");
            return;
        };
        if caller == callee {
            debug!(%caller, "不能呼叫自己，丢弃");
            return;
        }

        let targets = self.presence.resolve(&callee).await;
        if targets.is_empty() {
            debug!(%caller, %callee, "被叫方离线，忽略呼叫");
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let session = CallSession::ring(generation, caller.clone(), connection, callee.clone());
        let key = session.key();

        let mut sessions = self.sessions.lock().await;
        if let Some(previous) = sessions.insert(key.clone(), session) {
            warn!(
                %caller,
                %callee,
                previous_phase = ?previous.phase,
                "用户对已有会话，以新的振铃会话替换"
            );
        }
        fan_out(
            self.dispatcher.as_ref(),
            targets,
            &ServerEvent::IncomingCall {
                from: caller.clone(),
                signal: offer,
            },
        );
        drop(sessions);
        info!(%caller, %callee, generation, "呼叫振铃中");

        if let Some(timeout) = self.ring_timeout {
            self.schedule_ring_timeout(key, generation, timeout);
        }
    }

    pub async fn answer_call(&self, connection: ConnectionId, caller: Username, answer: Value) {
        let Some(callee) = self.presence.username_of(connection).await else {
            debug!(%connection, "未认证连接接听呼叫，丢弃");
            return;
        };

        let mut sessions = self.sessions.lock().await;
        let accepted = match sessions.get_mut(&CallKey::new(&caller, &callee)) {
            Some(session) if session.caller == caller => session.accept(&callee, connection),
            _ => false,
        };
        if !accepted {
            debug!(%caller, %callee, "没有可接听的振铃会话，丢弃");
            return;
        }

        let targets = self.presence.resolve(&caller).await;
        fan_out(
            self.dispatcher.as_ref(),
            targets,
            &ServerEvent::CallAccepted {
                from: callee.clone(),
                signal: answer,
            },
        );
        drop(sessions);
        info!(%caller, %callee, "通话已接通");
    }

    pub async fn ice_candidate(&self, connection: ConnectionId, to: Username, candidate: Value) {
        let Some(from) = self.presence.username_of(connection).await else {
            debug!(%connection, "未认证连接发送 ICE 候选，丢弃");
            return;
        };

        let sessions = self.sessions.lock().await;
        if !sessions.contains_key(&CallKey::new(&from, &to)) {
            debug!(%from, %to, "没有进行中的会话，丢弃 ICE 候选");
            return;
        }

        let targets = self.presence.resolve(&to).await;
        fan_out(
            self.dispatcher.as_ref(),
            targets,
            &ServerEvent::IceCandidate { from, candidate },
        );
    }

    pub async fn end_call(&self, connection: ConnectionId, to: Username) {
        let Some(from) = self.presence.username_of(connection).await else {
            debug!(%connection, "未认证连接挂断，丢弃");
            return;
        };

        let mut sessions = self.sessions.lock().await;
        if sessions.remove(&CallKey::new(&from, &to)).is_none() {
            debug!(%from, %to, "没有进行中的会话，忽略挂断");
            return;
        }

        let targets = self.presence.resolve(&to).await;
        fan_out(
            self.dispatcher.as_ref(),
            targets,
            &ServerEvent::CallEnded { from: from.clone() },
        );
        drop(sessions);
        info!(%from, %to, "通话已结束");
    }

    /// 连接关闭时调用（应在注销在线状态之后）。
    ///
    /// 结束所有引用该连接的会话；另外，若被叫方已经没有任何在线连接，
    /// 其振铃中的会话也一并结束。对端会收到 `callEnded`。
    pub async fn connection_closed(&self, connection: ConnectionId, username: Option<&Username>) {
        let callee_offline = match username {
            Some(user) => self.presence.resolve(user).await.is_empty(),
            None => false,
        };

        let mut sessions = self.sessions.lock().await;
        let stale: Vec<CallKey> = sessions
            .iter()
            .filter(|(_, session)| {
                session.references(connection)
                    || (callee_offline
                        && session.phase == CallPhase::Ringing
                        && Some(&session.callee) == username)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in stale {
            let Some(session) = sessions.remove(&key) else {
                continue;
            };
            // 不是主叫连接时，离开的一定是被叫方
            let gone = if session.caller_connection == connection {
                &session.caller
            } else {
                &session.callee
            };
            let Some(peer) = session.peer_of(gone) else {
                continue;
            };
            let targets = self.presence.resolve(peer).await;
            fan_out(
                self.dispatcher.as_ref(),
                targets,
                &ServerEvent::CallEnded { from: gone.clone() },
            );
            info!(%connection, user = %gone, %peer, "连接断开，结束通话");
        }
    }

    fn schedule_ring_timeout(&self, key: CallKey, generation: u64, timeout: Duration) {
        let sessions = Arc::clone(&self.sessions);
        let presence = Arc::clone(&self.presence);
        let dispatcher = Arc::clone(&self.dispatcher);

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let mut sessions = sessions.lock().await;
            let expired = matches!(
                sessions.get(&key),
                Some(session) if session.generation == generation && session.phase == CallPhase::Ringing
            );
            if !expired {
                return;
            }
            let Some(session) = sessions.remove(&key) else {
                return;
            };

            let caller_targets = presence.resolve(&session.caller).await;
            fan_out(
                dispatcher.as_ref(),
                caller_targets,
                &ServerEvent::CallEnded {
                    from: session.callee.clone(),
                },
            );
            let callee_targets = presence.resolve(&session.callee).await;
            fan_out(
                dispatcher.as_ref(),
                callee_targets,
                &ServerEvent::CallEnded {
                    from: session.caller.clone(),
                },
            );
            info!(
                caller = %session.caller,
                callee = %session.callee,
                generation,
                "振铃超时，呼叫已结束"
            );
        });
    }
}
