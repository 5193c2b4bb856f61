//! 伺服门面
//!
//! [`Servo`] 持有读取线程和控制线程，对外提供：
//!
//! - 消息处理侧的更新接口：[`update_goal`](Servo::update_goal)、
//!   [`update_gains`](Servo::update_gains)、[`apply`](Servo::apply)
//! - 观察接口：位置快照、PID 视图、控制器状态、指标、编码器状态消息
//! - 生命周期：[`stop`](Servo::stop)（幂等，`Drop` 时自动调用）
//!
//! 两个线程共享一个关停令牌：任何一方退出（包括读取故障）都会让另一方随之退出，
//! 控制线程在退出前释放电机。

use crate::config::ServoConfig;
use crate::error::DriverError;
use crate::lifecycle::ShutdownToken;
use crate::metrics::{ControllerMetrics, MetricsSnapshot};
use crate::mode::{AtomicControllerMode, ControllerMode};
use crate::pid::{GoalOutcome, PidSnapshot, PidState};
use crate::tracker::{PositionSample, PositionTracker, join_thread};
use quadpid_protocol::{EncoderStatus, GoalCommand, Message};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// [`Servo::apply`] 的处理结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Applied {
    Goal(GoalOutcome),
    /// 增益是否发生变化
    Gains(bool),
    /// 不是发给控制器的消息（编码器状态、遥测）
    Ignored,
}

/// 运行中的伺服
pub struct Servo {
    config: ServoConfig,
    tracker: PositionTracker,
    controller: Option<JoinHandle<Result<(), DriverError>>>,
    pid: Arc<PidState>,
    mode: Arc<AtomicControllerMode>,
    metrics: Arc<ControllerMetrics>,
    token: ShutdownToken,
}

impl Servo {
    pub(crate) fn new(
        config: ServoConfig,
        tracker: PositionTracker,
        controller: JoinHandle<Result<(), DriverError>>,
        pid: Arc<PidState>,
        mode: Arc<AtomicControllerMode>,
        metrics: Arc<ControllerMetrics>,
        token: ShutdownToken,
    ) -> Self {
        Self {
            config,
            tracker,
            controller: Some(controller),
            pid,
            mode,
            metrics,
            token,
        }
    }

    /// 更新目标角（999 = 复位请求）
    pub fn update_goal(&self, value: f64) -> GoalOutcome {
        self.pid.update_goal(value)
    }

    /// 更新增益（`None` 或 999 的字段保持不变）
    pub fn update_gains(&self, p: Option<f64>, i: Option<f64>, d: Option<f64>) -> bool {
        self.pid.update_gains(p, i, d)
    }

    /// 把一条解码后的总线消息路由到对应的更新接口
    pub fn apply(&self, message: &Message) -> Applied {
        match message {
            Message::Goal(goal) => Applied::Goal(match goal.command() {
                GoalCommand::Reset => self.pid.request_reset(),
                GoalCommand::Set(value) => self.update_goal(value),
            }),
            Message::Gains(gains) => {
                let gains = gains.effective();
                Applied::Gains(self.update_gains(gains.p, gains.i, gains.d))
            },
            Message::EncoderStatus(_) | Message::Telemetry(_) => {
                debug!("Ignoring msg_type {} on the control channel", message.msg_type());
                Applied::Ignored
            },
        }
    }

    /// 当前位置（角度 + 轮询计数）
    pub fn snapshot(&self) -> PositionSample {
        self.tracker.snapshot()
    }

    /// 当前增益和目标角
    pub fn pid(&self) -> PidSnapshot {
        self.pid.load()
    }

    pub fn mode(&self) -> ControllerMode {
        self.mode.get()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 指标的共享句柄（可以交给监控线程）
    pub fn metrics_handle(&self) -> Arc<ControllerMetrics> {
        self.metrics.clone()
    }

    /// 生成一条编码器状态消息（msg_type 0）
    pub fn encoder_status(&self) -> EncoderStatus {
        self.tracker.status()
    }

    pub fn config(&self) -> &ServoConfig {
        &self.config
    }

    /// 关停令牌（可以交给 Ctrl+C 处理函数）
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.token.clone()
    }

    /// 任一线程是否已经退出
    pub fn is_finished(&self) -> bool {
        self.token.is_stopped()
            || self.tracker.is_finished()
            || self.controller.as_ref().is_none_or(|t| t.is_finished())
    }

    /// 停止两个线程并等待退出
    ///
    /// 先等待控制线程（电机释放），再等待读取线程。返回第一个错误
    /// （例如读取故障）。重复调用返回 `Ok(())`。
    pub fn stop(&mut self) -> Result<(), DriverError> {
        if self.token.stop() {
            info!("Servo stopping");
        }

        let controller = match self.controller.take() {
            Some(handle) => join_thread(handle, "controller"),
            None => Ok(()),
        };
        let reader = self.tracker.stop();
        controller.and(reader)
    }
}

impl Drop for Servo {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Servo stopped with error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ServoBuilder;
    use crate::mock::{RecordingMotor, ScriptedEncoder};
    use quadpid_protocol::{GainUpdate, GoalUpdate, TelemetryRecord};

    fn servo() -> (Servo, crate::mock::MotorLog) {
        let motor = RecordingMotor::new();
        let log = motor.log();
        let servo = ServoBuilder::new()
            .encoder(ScriptedEncoder::new(vec![]))
            .motor(motor)
            .initial_goal(0.0)
            .build()
            .unwrap();
        (servo, log)
    }

    #[test]
    fn test_apply_routes_messages() {
        let (mut servo, _log) = servo();

        assert_eq!(
            servo.apply(&Message::Goal(GoalUpdate::new(250.0))),
            Applied::Goal(GoalOutcome::Set(180.0))
        );
        assert_eq!(servo.pid().goal, 180.0);

        let gains = GainUpdate::with_sentinels(Some(999.0), Some(2.0), Some(999.0));
        assert_eq!(servo.apply(&Message::Gains(gains)), Applied::Gains(true));
        assert_eq!(servo.pid().gains.i, 2.0);
        assert_eq!(servo.pid().gains.p, 2.5);

        let telemetry = TelemetryRecord {
            encoder: 0.0,
            motor: 0.0,
            goal: 0.0,
            timestamp_us: 0,
            encoder_counter: 0,
            motor_counter: 0,
        };
        assert_eq!(servo.apply(&Message::Telemetry(telemetry)), Applied::Ignored);

        assert_eq!(
            servo.apply(&Message::Goal(GoalUpdate::reset())),
            Applied::Goal(GoalOutcome::ResetRequested)
        );

        servo.stop().unwrap();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut servo, log) = servo();
        servo.stop().unwrap();
        servo.stop().unwrap();
        assert!(servo.is_finished());
        assert_eq!(servo.mode(), ControllerMode::Stopped);
        assert!(log.is_released());
    }

    #[test]
    fn test_drop_releases_motor() {
        let (servo, log) = servo();
        drop(servo);
        assert!(log.release_count() >= 1);
        assert!(log.is_released());
    }
}
