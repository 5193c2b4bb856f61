//! 消息体定义
//!
//! 所有消息体都不包含 `msg_type` 字段，由 [`Message`] 枚举和 [`codec`](crate::codec) 负责打标签。

use crate::constants::*;
use crate::is_sentinel;
use serde::{Deserialize, Serialize};

/// 编码器状态（msg_type 0）
///
/// 由只读编码器的进程周期性发布。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderStatus {
    /// 当前角度（度，[-180, 180)）
    pub value: f64,
    /// 读取线程的轮询计数
    pub counter: u64,
    /// 发布序号
    #[serde(default)]
    pub sequence: u64,
    /// UNIX 时间戳（微秒）
    #[serde(default)]
    pub timestamp_us: u64,
}

/// 目标角更新（msg_type 2）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalUpdate {
    /// 目标角（度）；`999` 表示复位
    pub value: f64,
}

/// 目标角更新的语义解释
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GoalCommand {
    /// 设置新的目标角（尚未钳位）
    Set(f64),
    /// 复位：停机、清零编码器、以当前角度作为新目标
    Reset,
}

impl GoalUpdate {
    pub fn new(value: f64) -> Self {
        Self { value }
    }

    /// 复位请求
    pub fn reset() -> Self {
        Self { value: SENTINEL }
    }

    /// 将哨兵值解释为复位请求
    pub fn command(&self) -> GoalCommand {
        if is_sentinel(self.value) {
            GoalCommand::Reset
        } else {
            GoalCommand::Set(self.value)
        }
    }
}

/// PID 增益更新（msg_type 4）
///
/// 每个字段都可以缺省；值为 `999` 时同样表示"不修改"。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GainUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<f64>,
}

impl GainUpdate {
    /// 构造线上兼容的增益消息：未提供的字段填入哨兵值
    ///
    /// 与旧的生产者一致，三个字段总是全部出现在 JSON 中。
    pub fn with_sentinels(p: Option<f64>, i: Option<f64>, d: Option<f64>) -> Self {
        Self {
            p: Some(p.unwrap_or(SENTINEL)),
            i: Some(i.unwrap_or(SENTINEL)),
            d: Some(d.unwrap_or(SENTINEL)),
        }
    }

    /// 去掉哨兵值后的有效更新
    ///
    /// 缺省字段与值为 `999` 的字段都映射为 `None`。
    pub fn effective(&self) -> Self {
        let strip = |v: Option<f64>| v.filter(|x| !is_sentinel(*x));
        Self {
            p: strip(self.p),
            i: strip(self.i),
            d: strip(self.d),
        }
    }

    /// 是否不包含任何有效字段
    pub fn is_noop(&self) -> bool {
        let eff = self.effective();
        eff.p.is_none() && eff.i.is_none() && eff.d.is_none()
    }
}

/// 电机/编码器遥测（msg_type 3）
///
/// 控制线程每若干个周期产生一条，投递是尽力而为的。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// 本周期第二次采样的角度（度）
    pub encoder: f64,
    /// PID 输出的原始速度（钳位与取整之前）
    pub motor: f64,
    /// 本周期使用的目标角（度）
    pub goal: f64,
    /// UNIX 时间戳（微秒）
    pub timestamp_us: u64,
    /// 第二次采样时的编码器轮询计数
    pub encoder_counter: u64,
    /// 控制循环迭代计数
    pub motor_counter: u64,
}

/// 总线上的所有消息
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    EncoderStatus(EncoderStatus),
    Goal(GoalUpdate),
    Telemetry(TelemetryRecord),
    Gains(GainUpdate),
}

impl Message {
    /// 线上的类型编号
    pub fn msg_type(&self) -> u64 {
        match self {
            Message::EncoderStatus(_) => MSG_TYPE_ENCODER_STATUS,
            Message::Goal(_) => MSG_TYPE_GOAL,
            Message::Telemetry(_) => MSG_TYPE_TELEMETRY,
            Message::Gains(_) => MSG_TYPE_GAINS,
        }
    }
}

impl From<GoalUpdate> for Message {
    fn from(value: GoalUpdate) -> Self {
        Message::Goal(value)
    }
}

impl From<GainUpdate> for Message {
    fn from(value: GainUpdate) -> Self {
        Message::Gains(value)
    }
}

impl From<TelemetryRecord> for Message {
    fn from(value: TelemetryRecord) -> Self {
        Message::Telemetry(value)
    }
}

impl From<EncoderStatus> for Message {
    fn from(value: EncoderStatus) -> Self {
        Message::EncoderStatus(value)
    }
}
