//! encoder 命令
//!
//! 只运行位置跟踪器，周期性输出编码器状态消息（msg_type 0）。
//! 仿真电机以固定的有符号幅值转动，用于观察解码结果。

use crate::commands::run::install_interrupt_handler;
use anyhow::{Context, Result};
use clap::Args;
use quadpid_driver::sim::SimPlant;
use quadpid_driver::{Direction, MotorCommand, MotorDriver, PositionTracker, ShutdownToken};
use quadpid_protocol::{Message, encode};
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Args, Debug)]
pub struct EncoderCommand {
    /// 编码器每圈 tick 数
    #[arg(long, default_value_t = 500)]
    pub ticks_per_revolution: u32,

    /// 输出间隔（毫秒）
    #[arg(long, default_value_t = 100)]
    pub period: u64,

    /// 仿真电机的有符号幅值（-255..=255）
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub drive: i16,

    /// 运行时长（秒），缺省时一直运行
    #[arg(long)]
    pub duration: Option<f64>,
}

impl EncoderCommand {
    pub fn execute(&self) -> Result<()> {
        let plant = SimPlant::default();
        let mut motor = plant.motor();
        motor
            .set_command(drive_command(self.drive))
            .context("failed to drive simulated motor")?;

        let token = ShutdownToken::new();
        install_interrupt_handler(token.clone())?;
        let mut tracker = PositionTracker::new(self.ticks_per_revolution, token.clone());
        tracker.start(plant.encoder())?;

        let period = Duration::from_millis(self.period.max(1));
        let deadline = self.duration.map(|s| Instant::now() + Duration::from_secs_f64(s.max(0.0)));
        let stdout = std::io::stdout();

        while !token.is_stopped() && !tracker.is_finished() {
            std::thread::sleep(period);
            let line = encode(&Message::EncoderStatus(tracker.status()))?;
            let mut out = stdout.lock();
            writeln!(out, "{}", line)?;
            out.flush()?;

            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
        }

        tracker.stop()?;
        motor.release_all().context("failed to release simulated motor")?;
        info!("Encoder monitor stopped");
        Ok(())
    }
}

fn drive_command(drive: i16) -> MotorCommand {
    let magnitude = drive.unsigned_abs().min(255) as u8;
    match drive {
        0 => MotorCommand::RELEASE,
        d if d > 0 => MotorCommand::new(Direction::Forward, magnitude),
        _ => MotorCommand::new(Direction::Backward, magnitude),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_command() {
        assert_eq!(drive_command(0), MotorCommand::RELEASE);
        assert_eq!(drive_command(120), MotorCommand::new(Direction::Forward, 120));
        assert_eq!(drive_command(-300), MotorCommand::new(Direction::Backward, 255));
    }
}
