//! 驱动层模块
//!
//! 带正交编码器的直流电机位置闭环：
//! - 读取线程：以最高速率轮询编码器两根输入线，解码位置（互斥锁保护的一致快照）
//! - 控制线程：固定周期采样两次，计算 PID，向电机驱动板发出方向 + 幅值命令
//! - PID 状态：增益与目标角的写时复制发布（ArcSwap 无锁读取），哨兵 999 语义
//! - 生命周期：共享关停令牌，所有退出路径上释放电机
//!
//! # 使用场景
//!
//! 硬件通过 [`hal`] 中的两个 trait 接入；没有硬件时可以使用 [`sim`] 仿真对象，
//! 测试使用 [`mock`] 中的替身。大多数调用方只需要 [`ServoBuilder`] 和 [`Servo`]。

mod builder;
pub mod config;
pub mod controller;
mod error;
pub mod hal;
pub mod lifecycle;
pub mod metrics;
pub mod mock;
pub mod mode;
pub mod pid;
pub mod quadrature;
mod servo;
pub mod sim;
pub mod telemetry;
pub mod timing;
pub mod tracker;

pub use builder::ServoBuilder;
pub use config::{ControllerConfig, EncoderConfig, MotorConfig, ServoConfig};
pub use controller::{ControlLoop, ControlParams, ControlTerms, compute_terms, command_for};
pub use error::{DriverError, HardwareError};
pub use hal::{Direction, EncoderInput, LineLevels, MotorCommand, MotorDriver};
pub use lifecycle::ShutdownToken;
pub use metrics::{ControllerMetrics, MetricsSnapshot};
pub use mode::{AtomicControllerMode, ControllerMode};
pub use pid::{Gains, GoalOutcome, PidSnapshot, PidState};
pub use servo::{Applied, Servo};
pub use telemetry::{ChannelTelemetry, TelemetrySink};
pub use timing::WaitStrategy;
pub use tracker::{PositionHandle, PositionSample, PositionSource, PositionTracker};
