//! 通话信令会话
//!
//! 会话只存在于内存中，按无序用户对索引。Idle 状态即"没有会话"。

use serde::{Deserialize, Serialize};

use crate::value_objects::{ConnectionId, Username};

/// 无序用户对，(a, b) 与 (b, a) 是同一个键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey(Username, Username);

impl CallKey {
    pub fn new(x: &Username, y: &Username) -> Self {
        if x <= y {
            Self(x.clone(), y.clone())
        } else {
            Self(y.clone(), x.clone())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallPhase {
    Ringing,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    /// 会话代号，用于区分同一用户对先后发起的不同会话
    pub generation: u64,
    pub caller: Username,
    pub callee: Username,
    /// 发起呼叫的连接
    pub caller_connection: ConnectionId,
    /// 接听的连接，振铃期间为空
    pub callee_connection: Option<ConnectionId>,
    pub phase: CallPhase,
}

impl CallSession {
    pub fn ring(
        generation: u64,
        caller: Username,
        caller_connection: ConnectionId,
        callee: Username,
    ) -> Self {
        Self {
            generation,
            caller,
            callee,
            caller_connection,
            callee_connection: None,
            phase: CallPhase::Ringing,
        }
    }

    pub fn key(&self) -> CallKey {
        CallKey::new(&self.caller, &self.callee)
    }

    /// 被叫方接听。只有振铃中的会话、且由被叫方接听时才会转为 Active。
    pub fn accept(&mut self, answerer: &Username, connection: ConnectionId) -> bool {
        if self.phase != CallPhase::Ringing || &self.callee != answerer {
            return false;
        }
        self.phase = CallPhase::Active;
        self.callee_connection = Some(connection);
        true
    }

    /// 返回对端用户名；`user` 不是参与方时返回 `None`
    pub fn peer_of(&self, user: &Username) -> Option<&Username> {
        if &self.caller == user {
            Some(&self.callee)
        } else if &self.callee == user {
            Some(&self.caller)
        } else {
            None
        }
    }

    pub fn references(&self, connection: ConnectionId) -> bool {
        self.caller_connection == connection || self.callee_connection == Some(connection)
    }
}
