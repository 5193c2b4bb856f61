//! 硬件抽象层
//!
//! 核心控制逻辑只通过这里的两个 trait 接触硬件：
//!
//! ```text
//! EncoderInput (clk/dt 两根数字输入线)
//!     ↓ read_levels()
//! Position Tracker（读取线程）
//!     ↓ snapshot()
//! Motor Controller（控制线程）
//!     ↓ set_command()
//! MotorDriver (方向 + 0-255 幅值 + 释放)
//! ```
//!
//! 具体的 GPIO / I2C 驱动板实现由外部 crate 提供；
//! 本 crate 自带 [`mock`](crate::mock) 测试替身和 [`sim`](crate::sim) 仿真后端。

use crate::error::HardwareError;

/// 两根编码器输入线的一次采样
///
/// `true` 表示高电平。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineLevels {
    pub clk: bool,
    pub dt: bool,
}

impl LineLevels {
    pub const fn new(clk: bool, dt: bool) -> Self {
        Self { clk, dt }
    }
}

/// 编码器输入线
///
/// 读取被假定为全函数：如果底层 I/O 可能失败，失败会作为致命错误终止读取线程，
/// 而不是被静默跳过（跳过采样会破坏方向判定）。
pub trait EncoderInput: Send {
    /// 读取 clk 与 dt 的当前电平
    fn read_levels(&mut self) -> Result<LineLevels, HardwareError>;

    /// 释放输入线（GPIO cleanup）
    ///
    /// 必须是幂等的：正常退出路径和故障路径可能各调用一次。
    fn release(&mut self) {}
}

/// 电机转动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
    /// 释放（惰行，不施加驱动）
    Release,
}

/// 电机命令
///
/// 每个控制周期产生一次，立即交给驱动。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotorCommand {
    pub direction: Direction,
    /// 速度幅值（0-255）
    pub magnitude: u8,
}

impl MotorCommand {
    /// 释放命令
    pub const RELEASE: MotorCommand = MotorCommand {
        direction: Direction::Release,
        magnitude: 0,
    };

    pub const fn new(direction: Direction, magnitude: u8) -> Self {
        Self {
            direction,
            magnitude,
        }
    }

    pub fn is_release(&self) -> bool {
        self.direction == Direction::Release
    }
}

/// 电机驱动板
///
/// 驱动实现独占物理总线，并且必须按接收顺序应用命令。
/// 只有控制线程会持有并调用它。
pub trait MotorDriver: Send {
    /// 对被控电机应用方向与幅值
    fn set_command(&mut self, command: MotorCommand) -> Result<(), HardwareError>;

    /// 释放驱动板上的所有电机
    ///
    /// 必须是幂等的，调用两次不能出错。
    fn release_all(&mut self) -> Result<(), HardwareError>;
}

impl<T: EncoderInput + ?Sized> EncoderInput for Box<T> {
    fn read_levels(&mut self) -> Result<LineLevels, HardwareError> {
        (**self).read_levels()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

impl<T: MotorDriver + ?Sized> MotorDriver for Box<T> {
    fn set_command(&mut self, command: MotorCommand) -> Result<(), HardwareError> {
        (**self).set_command(command)
    }

    fn release_all(&mut self) -> Result<(), HardwareError> {
        (**self).release_all()
    }
}
