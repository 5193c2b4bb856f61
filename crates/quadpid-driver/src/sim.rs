//! 仿真被控对象
//!
//! 一阶直流电机模型：速度以时间常数 `tau` 趋向 `命令幅值 / 255 * 最大速度`，
//! 位置（tick）对速度积分。模型由 [`SimMotor`]（[`MotorDriver`]）与
//! [`SimEncoder`]（[`EncoderInput`]）共享，用于在没有硬件的环境下闭环运行。
//!
//! `SimEncoder` 每次读取最多推进一个格雷码相位，所以轮询速率低于相位速率时
//! 编码器读数会滞后，但不会因为跳相而误判方向。

use crate::error::HardwareError;
use crate::hal::{Direction, EncoderInput, LineLevels, MotorCommand, MotorDriver};
use crate::quadrature::gray_levels;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// 模型参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantParams {
    /// 满幅值（255）时的稳态速度（tick/s）
    pub max_speed_tps: f64,
    /// 一阶时间常数（秒）
    pub time_constant_s: f64,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            max_speed_tps: 1500.0,
            time_constant_s: 0.05,
        }
    }
}

#[derive(Debug)]
struct PlantModel {
    params: PlantParams,
    /// 有符号命令 [-255, 255]，Release 为 0
    command: f64,
    velocity_tps: f64,
    position_ticks: f64,
    last_update: Option<Instant>,
}

impl PlantModel {
    fn advance(&mut self, dt_s: f64) {
        if dt_s <= 0.0 {
            return;
        }
        let target = self.command / 255.0 * self.params.max_speed_tps;
        let tau = self.params.time_constant_s.max(1e-6);
        // 一阶系统的精确离散化
        let alpha = 1.0 - (-dt_s / tau).exp();
        let v0 = self.velocity_tps;
        self.velocity_tps += (target - v0) * alpha;
        self.position_ticks += (v0 + self.velocity_tps) * 0.5 * dt_s;
    }

    fn advance_to(&mut self, now: Instant) {
        if let Some(last) = self.last_update {
            self.advance(now.saturating_duration_since(last).as_secs_f64());
        }
        self.last_update = Some(now);
    }
}

/// 共享的仿真电机
#[derive(Debug, Clone)]
pub struct SimPlant {
    model: Arc<Mutex<PlantModel>>,
}

impl SimPlant {
    pub fn new(params: PlantParams) -> Self {
        Self {
            model: Arc::new(Mutex::new(PlantModel {
                params,
                command: 0.0,
                velocity_tps: 0.0,
                position_ticks: 0.0,
                last_update: None,
            })),
        }
    }

    /// 电机驱动端
    pub fn motor(&self) -> SimMotor {
        SimMotor {
            plant: self.clone(),
        }
    }

    /// 编码器端
    pub fn encoder(&self) -> SimEncoder {
        SimEncoder {
            plant: self.clone(),
            emitted_phase: 0,
        }
    }

    /// 按固定步长推进模型（不依赖时钟）
    pub fn step(&self, dt_s: f64) {
        self.model.lock().advance(dt_s);
    }

    /// 模型的真实位置（tick）
    pub fn position_ticks(&self) -> f64 {
        self.model.lock().position_ticks
    }

    pub fn velocity_tps(&self) -> f64 {
        self.model.lock().velocity_tps
    }

    fn set_signed_command(&self, command: f64) {
        let mut model = self.model.lock();
        model.advance_to(Instant::now());
        model.command = command;
    }

    /// 目标相位：每个 tick 对应两个格雷码相位
    fn target_phase(&self) -> i64 {
        let mut model = self.model.lock();
        model.advance_to(Instant::now());
        (model.position_ticks * 2.0).floor() as i64
    }
}

impl Default for SimPlant {
    fn default() -> Self {
        Self::new(PlantParams::default())
    }
}

/// 仿真电机驱动
pub struct SimMotor {
    plant: SimPlant,
}

impl MotorDriver for SimMotor {
    fn set_command(&mut self, command: MotorCommand) -> Result<(), HardwareError> {
        let magnitude = f64::from(command.magnitude);
        let signed = match command.direction {
            Direction::Forward => magnitude,
            Direction::Backward => -magnitude,
            Direction::Release => 0.0,
        };
        self.plant.set_signed_command(signed);
        Ok(())
    }

    fn release_all(&mut self) -> Result<(), HardwareError> {
        self.plant.set_signed_command(0.0);
        Ok(())
    }
}

/// 仿真编码器
pub struct SimEncoder {
    plant: SimPlant,
    emitted_phase: i64,
}

impl EncoderInput for SimEncoder {
    fn read_levels(&mut self) -> Result<LineLevels, HardwareError> {
        let target = self.plant.target_phase();
        self.emitted_phase += (target - self.emitted_phase).signum();
        Ok(gray_levels(self.emitted_phase))
    }
}
