//! 协议常量定义
//!
//! 消息类型编号沿用现有流上的约定：
//!
//! | msg_type | 含义 |
//! |----------|------|
//! | 0 | 编码器状态 |
//! | 2 | 目标角 |
//! | 3 | 电机/编码器遥测 |
//! | 4 | PID 增益 |

/// 哨兵值：增益字段表示"不修改"，目标角字段表示"复位"
pub const SENTINEL: f64 = 999.0;

/// 编码器状态消息
pub const MSG_TYPE_ENCODER_STATUS: u64 = 0;

/// 目标角更新消息
pub const MSG_TYPE_GOAL: u64 = 2;

/// 电机/编码器遥测消息
pub const MSG_TYPE_TELEMETRY: u64 = 3;

/// PID 增益更新消息
pub const MSG_TYPE_GAINS: u64 = 4;

/// 目标角的合法范围（度）
pub const GOAL_MIN_DEG: f64 = -180.0;
pub const GOAL_MAX_DEG: f64 = 180.0;

/// 电机速度幅值上限（0-255）
pub const MAX_MOTOR_MAGNITUDE: u8 = 255;
