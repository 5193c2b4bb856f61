//! 伺服配置
//!
//! TOML 格式，所有字段都有默认值，缺省的段或字段按默认值补齐：
//!
//! ```toml
//! [encoder]
//! ticks_per_revolution = 500
//! clk_pin = 17
//! dt_pin = 18
//!
//! [controller]
//! period_us = 1000
//! min_sample_difference = 1
//! invert_motor = true
//! wait_strategy = "busy_wait"
//! reset_settle_ms = 100
//! telemetry_every = 1
//!
//! [gains]
//! p = 2.5
//! i = 0.0
//! d = 0.6
//!
//! [motor]
//! channel = 1
//! ```
//!
//! `clk_pin` / `dt_pin` / `channel` 描述接线，由具体的 [`EncoderInput`](crate::hal::EncoderInput) /
//! [`MotorDriver`](crate::hal::MotorDriver) 后端按配置打开硬件；核心控制逻辑只负责校验并记录它们。

use crate::error::DriverError;
use crate::pid::Gains;
use crate::timing::WaitStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// 驱动板上的电机通道数
pub const MOTOR_CHANNELS: u8 = 4;

/// 可用的最大 GPIO 编号（BCM）
pub const MAX_GPIO_PIN: u8 = 27;

/// 编码器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// 每圈 tick 数（角度周期）
    pub ticks_per_revolution: u32,
    /// clk 线的 GPIO 编号（BCM，0..=27），交给编码器后端
    pub clk_pin: u8,
    /// dt 线的 GPIO 编号（BCM，0..=27），不能与 `clk_pin` 相同
    pub dt_pin: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ticks_per_revolution: 500,
            clk_pin: 17,
            dt_pin: 18,
        }
    }
}

/// 控制循环配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// 控制周期（微秒）
    pub period_us: u64,
    /// 计算微分前两次采样之间至少经过的轮询次数
    pub min_sample_difference: u64,
    /// 反转电机方向（与物理接线相关）
    pub invert_motor: bool,
    pub wait_strategy: WaitStrategy,
    /// 复位序列中停机后的等待时间（毫秒）
    pub reset_settle_ms: u64,
    /// 每多少个周期发出一条遥测（0 表示关闭）
    pub telemetry_every: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            period_us: 1000,
            min_sample_difference: 1,
            invert_motor: true,
            wait_strategy: WaitStrategy::BusyWait,
            reset_settle_ms: 100,
            telemetry_every: 1,
        }
    }
}

impl ControllerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_micros(self.period_us)
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }
}

/// 电机配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// 驱动板通道（1..=4），交给电机驱动后端
    pub channel: u8,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self { channel: 1 }
    }
}

/// 完整的伺服配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    pub encoder: EncoderConfig,
    pub controller: ControllerConfig,
    pub gains: Gains,
    pub motor: MotorConfig,
}

impl ServoConfig {
    /// 解析 TOML 并校验
    pub fn from_toml_str(content: &str) -> Result<Self, DriverError> {
        let config: ServoConfig = toml::from_str(content)
            .map_err(|e| DriverError::Config(format!("invalid TOML: {}", e)))?;
        config.validate()
    }

    /// 从文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DriverError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String, DriverError> {
        toml::to_string_pretty(self)
            .map_err(|e| DriverError::Config(format!("failed to serialize config: {}", e)))
    }

    /// 校验配置
    ///
    /// `min_sample_difference == 0` 会被提升为 1（微分不能在零间隔上计算）。
    pub fn validate(mut self) -> Result<Self, DriverError> {
        if self.controller.period_us == 0 {
            return Err(DriverError::Config("controller.period_us must be > 0".into()));
        }
        if self.encoder.ticks_per_revolution == 0 {
            return Err(DriverError::Config(
                "encoder.ticks_per_revolution must be > 0".into(),
            ));
        }
        let encoder = &self.encoder;
        if encoder.clk_pin > MAX_GPIO_PIN || encoder.dt_pin > MAX_GPIO_PIN {
            return Err(DriverError::Config(format!(
                "encoder pins must be in 0..={}, got clk={} dt={}",
                MAX_GPIO_PIN, encoder.clk_pin, encoder.dt_pin
            )));
        }
        if encoder.clk_pin == encoder.dt_pin {
            return Err(DriverError::Config(format!(
                "encoder.clk_pin and encoder.dt_pin must differ, both are {}",
                encoder.clk_pin
            )));
        }
        if !(1..=MOTOR_CHANNELS).contains(&self.motor.channel) {
            return Err(DriverError::Config(format!(
                "motor.channel must be in 1..={}, got {}",
                MOTOR_CHANNELS, self.motor.channel
            )));
        }
        let gains = self.gains;
        if ![gains.p, gains.i, gains.d].iter().all(|g| g.is_finite()) {
            return Err(DriverError::Config("gains must be finite".into()));
        }
        if self.controller.min_sample_difference == 0 {
            warn!("controller.min_sample_difference = 0, raised to 1");
            self.controller.min_sample_difference = 1;
        }
        Ok(self)
    }
}
