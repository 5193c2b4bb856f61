//! Builder 模式实现
//!
//! 提供链式构造 [`Servo`] 实例的便捷方式。

use crate::config::ServoConfig;
use crate::controller::{ControlLoop, ControlParams};
use crate::error::DriverError;
use crate::hal::{EncoderInput, MotorDriver};
use crate::lifecycle::ShutdownToken;
use crate::metrics::ControllerMetrics;
use crate::mode::AtomicControllerMode;
use crate::pid::PidState;
use crate::servo::Servo;
use crate::telemetry::TelemetrySink;
use crate::tracker::PositionTracker;
use std::sync::Arc;
use tracing::info;

/// Servo Builder（链式构造）
///
/// # Example
///
/// ```
/// use quadpid_driver::{ServoBuilder, ServoConfig};
/// use quadpid_driver::sim::SimPlant;
///
/// let plant = SimPlant::default();
/// let mut servo = ServoBuilder::new()
///     .config(ServoConfig::default())
///     .encoder(plant.encoder())
///     .motor(plant.motor())
///     .build()
///     .unwrap();
///
/// servo.update_goal(45.0);
/// servo.stop().unwrap();
/// ```
pub struct ServoBuilder {
    config: ServoConfig,
    encoder: Option<Box<dyn EncoderInput>>,
    motor: Option<Box<dyn MotorDriver>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    initial_goal: Option<f64>,
}

impl ServoBuilder {
    pub fn new() -> Self {
        Self {
            config: ServoConfig::default(),
            encoder: None,
            motor: None,
            telemetry: None,
            initial_goal: None,
        }
    }

    /// 设置配置（可选，默认 [`ServoConfig::default`]）
    pub fn config(mut self, config: ServoConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置编码器输入（必需）
    pub fn encoder(mut self, input: impl EncoderInput + 'static) -> Self {
        self.encoder = Some(Box::new(input));
        self
    }

    /// 设置电机驱动（必需）
    pub fn motor(mut self, driver: impl MotorDriver + 'static) -> Self {
        self.motor = Some(Box::new(driver));
        self
    }

    /// 注册遥测接收者（可选）
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// 初始目标角（可选）
    ///
    /// 未设置时，控制线程启动时把目标设为当前角度。
    pub fn initial_goal(mut self, goal: f64) -> Self {
        self.initial_goal = Some(goal);
        self
    }

    /// 构建并启动
    ///
    /// 先启动读取线程，再启动控制线程。
    ///
    /// # 错误
    ///
    /// - `DriverError::Config`：配置无效，或缺少编码器/电机
    /// - `DriverError::ThreadPanicked`：无法创建线程
    pub fn build(self) -> Result<Servo, DriverError> {
        let config = self.config.validate()?;
        let encoder = self
            .encoder
            .ok_or_else(|| DriverError::Config("encoder input not set".into()))?;
        let motor = self
            .motor
            .ok_or_else(|| DriverError::Config("motor driver not set".into()))?;

        let token = ShutdownToken::new();
        let mut tracker = PositionTracker::new(config.encoder.ticks_per_revolution, token.clone());
        tracker.start(encoder)?;

        let pid = Arc::new(PidState::new(config.gains, self.initial_goal.unwrap_or(0.0)));
        let mode = Arc::new(AtomicControllerMode::default());
        let metrics = Arc::new(ControllerMetrics::new());

        let mut control = ControlLoop::new(
            tracker.handle(),
            motor,
            pid.clone(),
            ControlParams::from(&config.controller),
            token.clone(),
        )
        .with_mode(mode.clone())
        .with_metrics(metrics.clone())
        .rebase_on_start(self.initial_goal.is_none());
        if let Some(sink) = self.telemetry {
            control = control.with_telemetry(sink);
        }

        let controller = match std::thread::Builder::new()
            .name("quadpid-controller".into())
            .spawn(move || control.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                // 控制线程没起来：停止读取线程
                tracker.stop()?;
                return Err(DriverError::ThreadPanicked(format!(
                    "failed to spawn controller: {}",
                    e
                )));
            },
        };

        info!(
            "Servo started (motor channel {}, encoder clk={} dt={}, {} ticks/rev)",
            config.motor.channel,
            config.encoder.clk_pin,
            config.encoder.dt_pin,
            config.encoder.ticks_per_revolution
        );

        Ok(Servo::new(
            config,
            tracker,
            controller,
            pid,
            mode,
            metrics,
            token,
        ))
    }
}

impl Default for ServoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{RecordingMotor, ScriptedEncoder};

    #[test]
    fn test_missing_encoder_rejected() {
        let result = ServoBuilder::new().motor(RecordingMotor::new()).build();
        assert!(matches!(result, Err(DriverError::Config(msg)) if msg.contains("encoder")));
    }

    #[test]
    fn test_missing_motor_rejected() {
        let result = ServoBuilder::new().encoder(ScriptedEncoder::new(vec![])).build();
        assert!(matches!(result, Err(DriverError::Config(msg)) if msg.contains("motor")));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ServoConfig::default();
        config.motor.channel = 0;
        let result = ServoBuilder::new()
            .config(config)
            .encoder(ScriptedEncoder::new(vec![]))
            .motor(RecordingMotor::new())
            .build();
        assert!(matches!(result, Err(DriverError::Config(_))));
    }
}
