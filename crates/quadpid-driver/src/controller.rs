//! 电机控制器（控制线程）
//!
//! 每个迭代产生一次控制采样和一条电机命令：
//!
//! 1. 采样 1（角度、轮询计数、时刻）
//! 2. 按 [`WaitStrategy`] 等待一个控制周期
//! 3. 持续采样，直到轮询计数至少前进 `min_sample_difference`，得到采样 2
//! 4. 目标接近 ±180° 回绕点（`|goal| > 90`）时，把负角度加 360° 挪开回绕点
//! 5. `P * (angle2 - goal) + D * (angle2 - angle1) / dt`，积分项恒为 0
//! 6. 符号决定方向（可整体反转），幅值 `min(255, |speed|)` 截断为整数
//! 7. 与上一条命令不同时才写入驱动板
//!
//! 目标角哨兵触发的复位序列也在控制线程里执行，因为只有控制线程持有电机。

use crate::config::ControllerConfig;
use crate::error::DriverError;
use crate::hal::{Direction, MotorCommand, MotorDriver};
use crate::lifecycle::{MotorGuard, ShutdownToken, raise_thread_priority};
use crate::metrics::ControllerMetrics;
use crate::mode::{AtomicControllerMode, ControllerMode};
use crate::pid::{Gains, PidState};
use crate::telemetry::TelemetrySink;
use crate::timing::WaitStrategy;
use crate::tracker::{PositionSample, PositionSource};
use quadpid_protocol::TelemetryRecord;
use quadpid_protocol::constants::MAX_MOTOR_MAGNITUDE;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace, warn};

/// 触发回绕处理的目标角阈值（度）
pub const WRAP_GUARD_DEG: f64 = 90.0;

/// 复位序列中 "等待、清零、重新定基" 的执行次数
pub const RESET_PASSES: usize = 2;

/// 控制循环参数
#[derive(Debug, Clone, PartialEq)]
pub struct ControlParams {
    pub period: Duration,
    pub min_sample_difference: u64,
    pub invert_motor: bool,
    pub wait_strategy: WaitStrategy,
    pub reset_settle: Duration,
    pub telemetry_every: u64,
}

impl From<&ControllerConfig> for ControlParams {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            period: config.period(),
            min_sample_difference: config.min_sample_difference.max(1),
            invert_motor: config.invert_motor,
            wait_strategy: config.wait_strategy,
            reset_settle: config.reset_settle(),
            telemetry_every: config.telemetry_every,
        }
    }
}

impl Default for ControlParams {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

/// PID 三项
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlTerms {
    pub proportional: f64,
    pub derivative: f64,
    pub integral: f64,
}

impl ControlTerms {
    /// 原始速度（钳位和取整之前）
    pub fn raw_speed(&self) -> f64 {
        self.proportional + self.derivative + self.integral
    }
}

/// 回绕处理：目标在 `|goal| > 90` 时，负角度加 360°
///
/// 只影响本次迭代的计算。结果可能超出 `[-180, 180]`，不再钳位。
#[inline]
pub fn remap_near_wrap(angle_deg: f64, goal_deg: f64) -> f64 {
    if goal_deg.abs() > WRAP_GUARD_DEG && angle_deg < 0.0 {
        angle_deg + 360.0
    } else {
        angle_deg
    }
}

/// 控制律
///
/// `angle1` / `angle2` 是未经回绕处理的原始采样，`elapsed_s` 是两次采样之间的墙钟时间。
/// 积分项按 `0 * i` 计算，始终为 0。
pub fn compute_terms(
    gains: &Gains,
    goal: f64,
    angle1: f64,
    angle2: f64,
    elapsed_s: f64,
) -> ControlTerms {
    let angle1 = remap_near_wrap(angle1, goal);
    let angle2 = remap_near_wrap(angle2, goal);
    let derivative = if elapsed_s > 0.0 {
        gains.d * (angle2 - angle1) / elapsed_s
    } else {
        0.0
    };
    ControlTerms {
        proportional: gains.p * (angle2 - goal),
        derivative,
        integral: 0.0 * gains.i,
    }
}

/// 原始速度 → 电机命令
///
/// 先向零截断，再按符号选方向：负速度为 Backward，其余（包括 `(-1, 0)`）为 Forward；
/// `invert` 翻转方向。幅值为 `min(255, |speed|)`。
pub fn command_for(raw_speed: f64, invert: bool) -> MotorCommand {
    let speed = raw_speed.trunc();
    let backward = speed < 0.0;
    let direction = if backward == invert {
        Direction::Forward
    } else {
        Direction::Backward
    };
    let magnitude = speed.abs().min(f64::from(MAX_MOTOR_MAGNITUDE)) as u8;
    MotorCommand::new(direction, magnitude)
}

/// 采样间经过的轮询次数
///
/// 外部复位会让计数回到 0 附近，此时采样 2 的计数本身就是复位后经过的次数。
#[inline]
fn ticks_between(first: u64, second: u64) -> u64 {
    if second >= first { second - first } else { second }
}

/// 一次写入的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// 与上一条命令相同
    Skipped,
    Failed,
}

/// 带去重的电机输出
///
/// 写入失败时不回滚 "上一条命令"，所以下一次相同的命令会被跳过。
pub struct MotorOutput<D: MotorDriver> {
    guard: MotorGuard<D>,
    last: Option<MotorCommand>,
}

impl<D: MotorDriver> MotorOutput<D> {
    pub fn new(driver: D) -> Self {
        Self {
            guard: MotorGuard::new(driver),
            last: None,
        }
    }

    pub fn last_command(&self) -> Option<MotorCommand> {
        self.last
    }

    pub fn apply(&mut self, command: MotorCommand, metrics: &ControllerMetrics) -> WriteOutcome {
        if self.last == Some(command) {
            metrics.skipped_writes.fetch_add(1, Ordering::Relaxed);
            return WriteOutcome::Skipped;
        }
        self.last = Some(command);
        match self.guard.driver_mut().set_command(command) {
            Ok(()) => {
                metrics.motor_writes.fetch_add(1, Ordering::Relaxed);
                WriteOutcome::Written
            },
            Err(e) => {
                metrics.write_failures.fetch_add(1, Ordering::Relaxed);
                let err = DriverError::DriverWriteFault(e);
                warn!("{} ({:?}), continuing", err, command);
                WriteOutcome::Failed
            },
        }
    }

    /// 释放驱动板上的所有电机（可重复调用）
    pub fn release_all(&mut self) {
        self.guard.release();
        self.last = Some(MotorCommand::RELEASE);
    }
}

/// 一次迭代的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationReport {
    pub first: PositionSample,
    pub second: PositionSample,
    pub goal: f64,
    pub elapsed: Duration,
    pub terms: ControlTerms,
    pub command: MotorCommand,
}

/// 控制循环
pub struct ControlLoop<S: PositionSource, D: MotorDriver> {
    source: S,
    pid: Arc<PidState>,
    output: MotorOutput<D>,
    params: ControlParams,
    token: ShutdownToken,
    mode: Arc<AtomicControllerMode>,
    metrics: Arc<ControllerMetrics>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    rebase_on_start: bool,
    iteration: u64,
}

impl<S: PositionSource, D: MotorDriver> ControlLoop<S, D> {
    pub fn new(
        source: S,
        driver: D,
        pid: Arc<PidState>,
        params: ControlParams,
        token: ShutdownToken,
    ) -> Self {
        Self {
            source,
            pid,
            output: MotorOutput::new(driver),
            params,
            token,
            mode: Arc::new(AtomicControllerMode::default()),
            metrics: Arc::new(ControllerMetrics::new()),
            telemetry: None,
            rebase_on_start: false,
            iteration: 0,
        }
    }

    pub fn with_mode(mut self, mode: Arc<AtomicControllerMode>) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ControllerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// 启动时把目标设为当前角度
    pub fn rebase_on_start(mut self, enabled: bool) -> Self {
        self.rebase_on_start = enabled;
        self
    }

    pub fn metrics(&self) -> &Arc<ControllerMetrics> {
        &self.metrics
    }

    pub fn mode(&self) -> ControllerMode {
        self.mode.get()
    }

    pub fn last_command(&self) -> Option<MotorCommand> {
        self.output.last_command()
    }

    /// 控制线程主体
    ///
    /// 运行到关停令牌被触发为止，然后释放电机。panic 时由电机守卫释放电机，
    /// 并触发关停令牌让读取线程退出。
    pub fn run(mut self) -> Result<(), DriverError> {
        raise_thread_priority("Controller");
        let _stop = self.token.stop_on_drop();
        info!(
            "Controller thread started (period={:?}, min_sample_difference={}, invert={})",
            self.params.period, self.params.min_sample_difference, self.params.invert_motor
        );

        // 启动前已经收到数值目标时不覆盖
        if self.rebase_on_start {
            let angle = self.source.snapshot().angle_deg;
            if self.pid.rebase_goal(angle, 0) {
                debug!("Initial goal set to current angle {}", angle);
            }
        }

        while !self.token.is_stopped() {
            self.step();
        }

        self.shutdown();
        info!("Controller thread stopped after {} iterations", self.iteration);
        Ok(())
    }

    /// 执行一次迭代（复位请求优先）
    ///
    /// 在等待采样期间收到关停信号时返回 `None`，不写电机。
    pub fn step(&mut self) -> Option<IterationReport> {
        if let Some(generation) = self.pid.take_reset_request() {
            self.reset_sequence(generation);
        }

        let first = self.source.snapshot();
        let t1 = Instant::now();
        let deadline = t1 + self.params.period;
        self.params.wait_strategy.wait_until(deadline);

        let (second, t2) = self.sample_after(first)?;
        if t2 > deadline + self.params.period {
            let overruns = self.metrics.overruns.fetch_add(1, Ordering::Relaxed);
            if overruns % 1000 == 0 {
                warn!(
                    "Control loop overrun: sampling took {:?} (period {:?}), total overruns {}",
                    t2 - t1,
                    self.params.period,
                    overruns + 1
                );
            }
        }

        let pid = self.pid.load();
        let elapsed = t2 - t1;
        let terms = compute_terms(
            &pid.gains,
            pid.goal,
            first.angle_deg,
            second.angle_deg,
            elapsed.as_secs_f64(),
        );
        let raw_speed = terms.raw_speed();
        let command = command_for(raw_speed, self.params.invert_motor);
        self.output.apply(command, &self.metrics);

        self.iteration += 1;
        self.metrics.iterations.fetch_add(1, Ordering::Relaxed);
        trace!(
            "angle={} speed={} goal={} command={:?}",
            second.angle_deg, raw_speed, pid.goal, command
        );
        self.emit_telemetry(&second, raw_speed, pid.goal);

        Some(IterationReport {
            first,
            second,
            goal: pid.goal,
            elapsed,
            terms,
            command,
        })
    }

    /// 最小采样差门控
    fn sample_after(&self, first: PositionSample) -> Option<(PositionSample, Instant)> {
        loop {
            let sample = self.source.snapshot();
            let now = Instant::now();
            if ticks_between(first.tick_count, sample.tick_count)
                >= self.params.min_sample_difference
            {
                return Some((sample, now));
            }
            if self.token.is_stopped() {
                return None;
            }
            self.metrics.extra_samples.fetch_add(1, Ordering::Relaxed);
            std::hint::spin_loop();
        }
    }

    /// 复位序列
    ///
    /// 停机，然后执行两遍 "等待、清零编码器、以当前角度重新定基"。
    /// 请求之后到达的数值目标（代数大于 `generation`）不会被定基覆盖。
    fn reset_sequence(&mut self, generation: u64) {
        self.mode.transition(ControllerMode::Resetting);
        info!("Reset sequence started");

        self.output.apply(MotorCommand::RELEASE, &self.metrics);
        for _ in 0..RESET_PASSES {
            std::thread::sleep(self.params.reset_settle);
            self.source.reset();
            let angle = self.source.snapshot().angle_deg;
            self.pid.rebase_goal(angle, generation);
        }

        self.metrics.resets.fetch_add(1, Ordering::Relaxed);
        self.mode.transition(ControllerMode::Running);
        info!("Reset sequence finished, goal = {}", self.pid.load().goal);
    }

    fn emit_telemetry(&self, sample: &PositionSample, raw_speed: f64, goal: f64) {
        let Some(sink) = &self.telemetry else {
            return;
        };
        let every = self.params.telemetry_every;
        if every == 0 || self.iteration % every != 0 {
            return;
        }
        let record = TelemetryRecord {
            encoder: remap_near_wrap(sample.angle_deg, goal),
            motor: raw_speed,
            goal,
            timestamp_us: unix_micros(),
            encoder_counter: sample.tick_count,
            motor_counter: self.iteration,
        };
        if !sink.on_sample(&record) {
            self.metrics.telemetry_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn shutdown(&mut self) {
        self.mode.transition(ControllerMode::Stopped);
        self.output.release_all();
    }
}

fn unix_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
