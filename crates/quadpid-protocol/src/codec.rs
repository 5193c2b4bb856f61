//! 按行 JSON 编解码
//!
//! 解码分两步：先读取 `msg_type` 头，再按类型反序列化消息体。
//! 生产者附带的额外字段（如 `sequence`、字符串形式的 `timestamp`）会被忽略。

use crate::ProtocolError;
use crate::constants::*;
use crate::messages::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Deserialize)]
struct Header {
    msg_type: Option<u64>,
}

#[derive(Serialize)]
struct Tagged<'a, T: Serialize> {
    msg_type: u64,
    #[serde(flatten)]
    body: &'a T,
}

/// 解码一行 JSON 消息
///
/// # 错误
///
/// - `ProtocolError::Json`: JSON 语法错误，或 `msg_type` 不是非负整数
/// - `ProtocolError::MissingField`: 缺少 `msg_type`
/// - `ProtocolError::UnknownMessageType`: 未知的 `msg_type`
/// - `ProtocolError::InvalidPayload`: 消息体字段不符合类型
///
/// # 示例
///
/// ```
/// use quadpid_protocol::{decode, GoalCommand, Message};
///
/// let msg = decode(r#"{"msg_type": 2, "value": 999}"#).unwrap();
/// match msg {
///     Message::Goal(goal) => assert_eq!(goal.command(), GoalCommand::Reset),
///     _ => unreachable!(),
/// }
/// ```
pub fn decode(line: &str) -> Result<Message, ProtocolError> {
    let value: Value = serde_json::from_str(line.trim())?;
    let header = Header::deserialize(&value)?;
    let msg_type = header.msg_type.ok_or(ProtocolError::MissingField { field: "msg_type" })?;

    let invalid = |source| ProtocolError::InvalidPayload { msg_type, source };

    let message = match msg_type {
        MSG_TYPE_ENCODER_STATUS => {
            Message::EncoderStatus(serde_json::from_value(value).map_err(invalid)?)
        },
        MSG_TYPE_GOAL => Message::Goal(serde_json::from_value(value).map_err(invalid)?),
        MSG_TYPE_TELEMETRY => Message::Telemetry(serde_json::from_value(value).map_err(invalid)?),
        MSG_TYPE_GAINS => Message::Gains(serde_json::from_value(value).map_err(invalid)?),
        other => return Err(ProtocolError::UnknownMessageType { msg_type: other }),
    };

    Ok(message)
}

/// 编码为一行 JSON（不含换行符）
pub fn encode(message: &Message) -> Result<String, ProtocolError> {
    let msg_type = message.msg_type();
    let line = match message {
        Message::EncoderStatus(body) => serde_json::to_string(&Tagged { msg_type, body })?,
        Message::Goal(body) => serde_json::to_string(&Tagged { msg_type, body })?,
        Message::Telemetry(body) => serde_json::to_string(&Tagged { msg_type, body })?,
        Message::Gains(body) => serde_json::to_string(&Tagged { msg_type, body })?,
    };
    Ok(line)
}
