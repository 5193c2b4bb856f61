//! 测试替身
//!
//! - [`ScriptedEncoder`]：按脚本回放电平序列，可以在第 N 次读取后注入故障
//! - [`RecordingMotor`]：把所有命令和释放记录到共享日志，可以注入写入失败
//!
//! 两者都可以被移动进后台线程，测试通过共享句柄（`Arc`）在外部观察。

use crate::error::HardwareError;
use crate::hal::{EncoderInput, LineLevels, MotorCommand, MotorDriver};
use crate::quadrature::gray_levels;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 回放电平序列的编码器输入
///
/// 脚本耗尽后保持最后一个电平（没有边沿）。可以通过 [`feeder`](ScriptedEncoder::feeder)
/// 句柄在运行中追加电平。
pub struct ScriptedEncoder {
    script: Arc<Mutex<VecDeque<LineLevels>>>,
    last: LineLevels,
    reads: usize,
    fail_after: Option<usize>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedEncoder {
    pub fn new(script: Vec<LineLevels>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            last: LineLevels::default(),
            reads: 0,
            fail_after: None,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 由一串净正转步数生成格雷码脚本
    ///
    /// 第一个电平是静止的 (LOW, LOW)，作为读取线程的基准采样；
    /// 之后每一步推进一个格雷码相位。每两个相位产生一个 clk 边沿，
    /// 所以 `steps` 个相位对应 `steps / 2` 个 tick。负数表示反转。
    pub fn from_phase_steps(steps: i64) -> Self {
        let mut script = vec![gray_levels(0)];
        script.extend(gray_sequence(0, steps));
        Self::new(script)
    }

    /// 在成功读取 `reads` 次之后返回 [`HardwareError::Read`]
    pub fn fail_after(mut self, reads: usize) -> Self {
        self.fail_after = Some(reads);
        self
    }

    /// 追加电平的共享句柄
    pub fn feeder(&self) -> EncoderFeeder {
        EncoderFeeder {
            script: self.script.clone(),
        }
    }

    /// `release()` 调用计数
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        self.releases.clone()
    }
}

impl EncoderInput for ScriptedEncoder {
    fn read_levels(&mut self) -> Result<LineLevels, HardwareError> {
        if let Some(limit) = self.fail_after {
            if self.reads >= limit {
                return Err(HardwareError::Read("scripted fault".to_string()));
            }
        }
        self.reads += 1;
        if let Some(levels) = self.script.lock().pop_front() {
            self.last = levels;
        }
        Ok(self.last)
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }
}

/// 运行中向 [`ScriptedEncoder`] 追加电平
#[derive(Clone)]
pub struct EncoderFeeder {
    script: Arc<Mutex<VecDeque<LineLevels>>>,
}

impl EncoderFeeder {
    pub fn push(&self, levels: LineLevels) {
        self.script.lock().push_back(levels);
    }

    /// 从相位 `start_phase` 开始追加 `steps` 个格雷码相位
    pub fn push_phase_steps(&self, start_phase: i64, steps: i64) {
        self.script.lock().extend(gray_sequence(start_phase, steps));
    }

    /// 尚未被读取的电平数
    pub fn pending(&self) -> usize {
        self.script.lock().len()
    }
}

fn gray_sequence(start_phase: i64, steps: i64) -> Vec<LineLevels> {
    let sign = steps.signum();
    (1..=steps.abs())
        .map(|k| gray_levels(start_phase + sign * k))
        .collect()
}

/// 电机日志中的一条记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorEvent {
    Command(MotorCommand),
    ReleaseAll,
}

/// [`RecordingMotor`] 的共享日志
#[derive(Debug, Clone, Default)]
pub struct MotorLog {
    events: Arc<Mutex<Vec<MotorEvent>>>,
}

impl MotorLog {
    pub fn events(&self) -> Vec<MotorEvent> {
        self.events.lock().clone()
    }

    /// 成功写入的命令（不含释放）
    pub fn commands(&self) -> Vec<MotorCommand> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                MotorEvent::Command(c) => Some(*c),
                MotorEvent::ReleaseAll => None,
            })
            .collect()
    }

    pub fn last_command(&self) -> Option<MotorCommand> {
        self.commands().last().copied()
    }

    pub fn release_count(&self) -> usize {
        self.events.lock().iter().filter(|e| **e == MotorEvent::ReleaseAll).count()
    }

    /// 最后一个事件是否让电机处于释放状态
    pub fn is_released(&self) -> bool {
        match self.events.lock().last() {
            Some(MotorEvent::ReleaseAll) => true,
            Some(MotorEvent::Command(c)) => c.is_release(),
            None => true,
        }
    }

    fn push(&self, event: MotorEvent) {
        self.events.lock().push(event);
    }
}

/// 记录所有命令的电机驱动
#[derive(Debug, Default)]
pub struct RecordingMotor {
    log: MotorLog,
    fail_writes: Arc<AtomicBool>,
    failed_writes: Arc<AtomicUsize>,
}

impl RecordingMotor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MotorLog {
        self.log.clone()
    }

    /// 写入失败开关（`true` 时 `set_command` 返回错误且不记录）
    pub fn write_fault_switch(&self) -> Arc<AtomicBool> {
        self.fail_writes.clone()
    }

    pub fn failed_writes(&self) -> Arc<AtomicUsize> {
        self.failed_writes.clone()
    }
}

impl MotorDriver for RecordingMotor {
    fn set_command(&mut self, command: MotorCommand) -> Result<(), HardwareError> {
        if self.fail_writes.load(Ordering::Acquire) {
            self.failed_writes.fetch_add(1, Ordering::Relaxed);
            return Err(HardwareError::Write("injected fault".to_string()));
        }
        self.log.push(MotorEvent::Command(command));
        Ok(())
    }

    fn release_all(&mut self) -> Result<(), HardwareError> {
        self.log.push(MotorEvent::ReleaseAll);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::Direction;
    use crate::quadrature::QuadratureDecoder;

    #[test]
    fn test_scripted_encoder_holds_last_level() {
        let mut encoder = ScriptedEncoder::new(vec![LineLevels::new(true, false)]);
        assert_eq!(encoder.read_levels().unwrap(), LineLevels::new(true, false));
        assert_eq!(encoder.read_levels().unwrap(), LineLevels::new(true, false));
    }

    #[test]
    fn test_scripted_encoder_fault() {
        let mut encoder = ScriptedEncoder::new(vec![]).fail_after(2);
        assert!(encoder.read_levels().is_ok());
        assert!(encoder.read_levels().is_ok());
        assert!(matches!(encoder.read_levels(), Err(HardwareError::Read(_))));
    }

    #[test]
    fn test_phase_steps_decode_to_ticks() {
        let mut encoder = ScriptedEncoder::from_phase_steps(100);
        let mut decoder = QuadratureDecoder::new(LineLevels::default());
        let mut position = 0;
        for _ in 0..101 {
            position += decoder.step(encoder.read_levels().unwrap());
        }
        assert_eq!(position, 50);

        let mut encoder = ScriptedEncoder::from_phase_steps(-20);
        let mut decoder = QuadratureDecoder::new(LineLevels::default());
        let mut position = 0;
        for _ in 0..21 {
            position += decoder.step(encoder.read_levels().unwrap());
        }
        assert_eq!(position, -10);
    }

    #[test]
    fn test_feeder_appends() {
        let encoder = ScriptedEncoder::new(vec![]);
        let feeder = encoder.feeder();
        feeder.push_phase_steps(0, 4);
        assert_eq!(feeder.pending(), 4);
    }

    #[test]
    fn test_recording_motor_log() {
        let mut motor = RecordingMotor::new();
        let log = motor.log();
        motor
            .set_command(MotorCommand::new(Direction::Forward, 10))
            .unwrap();
        assert!(!log.is_released());
        motor.release_all().unwrap();
        assert!(log.is_released());
        assert_eq!(log.commands().len(), 1);
        assert_eq!(log.release_count(), 1);
    }

    #[test]
    fn test_recording_motor_injected_fault() {
        let mut motor = RecordingMotor::new();
        let log = motor.log();
        motor.write_fault_switch().store(true, Ordering::Release);
        assert!(motor.set_command(MotorCommand::new(Direction::Backward, 5)).is_err());
        assert!(log.commands().is_empty());
        assert_eq!(motor.failed_writes().load(Ordering::Relaxed), 1);
    }
}
