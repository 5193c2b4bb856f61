//! # Quadpid Protocol
//!
//! 电机伺服的消息总线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 消息类型编号与哨兵值
//! - `messages`: 各类消息体（目标角、PID 增益、编码器状态、遥测）
//! - `codec`: 按行 JSON 编解码
//!
//! ## 线格式
//!
//! 每条消息是一行 JSON 对象，通过数字字段 `msg_type` 区分类型。
//! 数值 `999` 是保留的哨兵值：在增益字段中表示"不修改"，在目标角字段中表示"复位"。
//! 线格式与现有的生产者保持位兼容，所以哨兵约定在解码层被保留，
//! 并在 [`GainUpdate::effective`] / [`GoalUpdate::command`] 中转换为显式的 `Option` / 枚举。

pub mod codec;
pub mod constants;
pub mod messages;

pub use codec::{decode, encode};
pub use constants::*;
pub use messages::*;

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON 语法错误
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// 缺少必需字段
    #[error("Missing field: {field}")]
    MissingField { field: &'static str },

    /// 未知的消息类型
    #[error("Unknown message type: {msg_type}")]
    UnknownMessageType { msg_type: u64 },

    /// 消息体与 `msg_type` 不匹配
    #[error("Invalid payload for msg_type {msg_type}: {source}")]
    InvalidPayload {
        msg_type: u64,
        #[source]
        source: serde_json::Error,
    },
}

/// 判断一个数值是否为哨兵值（999）
///
/// 比较是精确相等：线上的 `999` 与 `999.0` 都会被解析成同一个 `f64`。
#[inline]
pub fn is_sentinel(value: f64) -> bool {
    value == SENTINEL
}
